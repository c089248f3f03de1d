use atelier_core::Aggregate;

/// Handle `command` and fold the resulting events into `aggregate`.
///
/// Returns the events so callers can persist them. Used by tests and by
/// in-process flows that do not go through a store.
pub fn execute<A: Aggregate>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error> {
    let events = aggregate.handle(command)?;
    for event in &events {
        aggregate.apply(event);
    }
    Ok(events)
}
