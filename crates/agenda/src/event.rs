use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::error::{optional_text, required_text};
use atelier_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use atelier_events::Event;
use atelier_parties::{ContactId, ThirdPartyId};

pub const AGENDA_EVENT_AGGREGATE: &str = "agenda.event";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgendaEventId(pub AggregateId);

impl AgendaEventId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AgendaEventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgendaEventKind {
    #[default]
    Meeting,
    Call,
    Task,
    Reminder,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgendaEventStatus {
    #[default]
    Planned,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendeeStatus {
    Invited,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub user_id: UserId,
    pub status: AttendeeStatus,
}

/// What the organizer edits: timing, wording and links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: AgendaEventKind,
    #[serde(default)]
    pub all_day: bool,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub third_party_id: Option<ThirdPartyId>,
    #[serde(default)]
    pub contact_id: Option<ContactId>,
}

impl EventDetails {
    fn normalized(&self) -> Result<Self, DomainError> {
        if self.end.is_some_and(|e| e < self.start) {
            return Err(DomainError::validation("end cannot precede start"));
        }
        Ok(Self {
            title: required_text(&self.title, "title")?,
            description: optional_text(self.description.as_deref()),
            location: optional_text(self.location.as_deref()),
            ..self.clone()
        })
    }
}

/// End of the window used by "upcoming": midnight closing the day `days` after `now`.
pub fn upcoming_until(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let last_day = now
        .date_naive()
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(now.date_naive());
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    last_day.and_time(end_of_day).and_utc()
}

/// Aggregate root: an agenda entry with its attendees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaEvent {
    id: AgendaEventId,
    tenant_id: Option<TenantId>,
    details: Option<EventDetails>,
    status: AgendaEventStatus,
    organizer: Option<UserId>,
    attendees: Vec<Attendee>,
    version: u64,
    created: bool,
}

impl AgendaEvent {
    pub fn empty(id: AgendaEventId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: None,
            status: AgendaEventStatus::Planned,
            organizer: None,
            attendees: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn details(&self) -> Option<&EventDetails> {
        self.details.as_ref()
    }

    pub fn status(&self) -> AgendaEventStatus {
        self.status
    }

    pub fn organizer(&self) -> Option<UserId> {
        self.organizer
    }

    pub fn attendees(&self) -> &[Attendee] {
        &self.attendees
    }
}

impl AggregateRoot for AgendaEvent {
    type Id = AgendaEventId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub organizer: UserId,
    pub details: EventDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub details: EventDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteAttendee {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondInvitation {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub user_id: UserId,
    pub accept: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgendaCommand {
    Schedule(ScheduleEvent),
    Update(UpdateEvent),
    Cancel(CloseEvent),
    Complete(CloseEvent),
    Invite(InviteAttendee),
    Respond(RespondInvitation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScheduled {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub organizer: UserId,
    pub details: EventDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdated {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub details: EventDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventClosed {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub status: AgendaEventStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeChanged {
    pub tenant_id: TenantId,
    pub event_id: AgendaEventId,
    pub attendee: Attendee,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgendaEventEvent {
    Scheduled(EventScheduled),
    Updated(EventUpdated),
    Cancelled(EventClosed),
    Completed(EventClosed),
    AttendeeInvited(AttendeeChanged),
    InvitationAnswered(AttendeeChanged),
}

impl Event for AgendaEventEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AgendaEventEvent::Scheduled(_) => "agenda.event.scheduled",
            AgendaEventEvent::Updated(_) => "agenda.event.updated",
            AgendaEventEvent::Cancelled(_) => "agenda.event.cancelled",
            AgendaEventEvent::Completed(_) => "agenda.event.completed",
            AgendaEventEvent::AttendeeInvited(_) => "agenda.event.attendee_invited",
            AgendaEventEvent::InvitationAnswered(_) => "agenda.event.invitation_answered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AgendaEventEvent::Scheduled(e) => e.occurred_at,
            AgendaEventEvent::Updated(e) => e.occurred_at,
            AgendaEventEvent::Cancelled(e) | AgendaEventEvent::Completed(e) => e.occurred_at,
            AgendaEventEvent::AttendeeInvited(e) | AgendaEventEvent::InvitationAnswered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for AgendaEvent {
    type Command = AgendaCommand;
    type Event = AgendaEventEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AgendaEventEvent::Scheduled(e) => {
                self.id = e.event_id;
                self.tenant_id = Some(e.tenant_id);
                self.organizer = Some(e.organizer);
                self.details = Some(e.details.clone());
                self.status = AgendaEventStatus::Planned;
                self.created = true;
            }
            AgendaEventEvent::Updated(e) => self.details = Some(e.details.clone()),
            AgendaEventEvent::Cancelled(e) | AgendaEventEvent::Completed(e) => self.status = e.status,
            AgendaEventEvent::AttendeeInvited(e) => self.attendees.push(e.attendee.clone()),
            AgendaEventEvent::InvitationAnswered(e) => {
                if let Some(a) = self.attendees.iter_mut().find(|a| a.user_id == e.attendee.user_id) {
                    a.status = e.attendee.status;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AgendaCommand::Schedule(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("agenda event already exists"));
                }
                Ok(vec![AgendaEventEvent::Scheduled(EventScheduled {
                    tenant_id: cmd.tenant_id,
                    event_id: cmd.event_id,
                    organizer: cmd.organizer,
                    details: cmd.details.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            AgendaCommand::Update(cmd) => {
                self.ensure_planned(cmd.tenant_id, cmd.event_id)?;
                Ok(vec![AgendaEventEvent::Updated(EventUpdated {
                    tenant_id: cmd.tenant_id,
                    event_id: cmd.event_id,
                    details: cmd.details.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            AgendaCommand::Cancel(cmd) => {
                self.ensure_planned(cmd.tenant_id, cmd.event_id)?;
                Ok(vec![AgendaEventEvent::Cancelled(self.closed(cmd, AgendaEventStatus::Cancelled))])
            }
            AgendaCommand::Complete(cmd) => {
                self.ensure_planned(cmd.tenant_id, cmd.event_id)?;
                Ok(vec![AgendaEventEvent::Completed(self.closed(cmd, AgendaEventStatus::Done))])
            }
            AgendaCommand::Invite(cmd) => {
                self.ensure_planned(cmd.tenant_id, cmd.event_id)?;
                if self.attendees.iter().any(|a| a.user_id == cmd.user_id) {
                    return Err(DomainError::conflict("user is already invited"));
                }
                Ok(vec![AgendaEventEvent::AttendeeInvited(AttendeeChanged {
                    tenant_id: cmd.tenant_id,
                    event_id: cmd.event_id,
                    attendee: Attendee {
                        user_id: cmd.user_id,
                        status: AttendeeStatus::Invited,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            AgendaCommand::Respond(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.event_id)?;
                if !self.attendees.iter().any(|a| a.user_id == cmd.user_id) {
                    return Err(DomainError::unauthorized());
                }
                Ok(vec![AgendaEventEvent::InvitationAnswered(AttendeeChanged {
                    tenant_id: cmd.tenant_id,
                    event_id: cmd.event_id,
                    attendee: Attendee {
                        user_id: cmd.user_id,
                        status: if cmd.accept {
                            AttendeeStatus::Accepted
                        } else {
                            AttendeeStatus::Declined
                        },
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AgendaEvent {
    fn ensure_existing(&self, tenant_id: TenantId, event_id: AgendaEventId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != event_id {
            return Err(DomainError::invariant("event_id mismatch"));
        }
        Ok(())
    }

    fn ensure_planned(&self, tenant_id: TenantId, event_id: AgendaEventId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, event_id)?;
        if self.status != AgendaEventStatus::Planned {
            return Err(DomainError::invariant("only planned events can be changed"));
        }
        Ok(())
    }

    fn closed(&self, cmd: &CloseEvent, status: AgendaEventStatus) -> EventClosed {
        EventClosed {
            tenant_id: cmd.tenant_id,
            event_id: cmd.event_id,
            status,
            occurred_at: cmd.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_events::execute;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, h, 0, 0).unwrap()
    }

    fn details(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> EventDetails {
        EventDetails {
            title: "  Quarterly review ".to_string(),
            description: None,
            kind: AgendaEventKind::default(),
            all_day: false,
            start,
            end,
            location: Some("".to_string()),
            third_party_id: None,
            contact_id: None,
        }
    }

    fn scheduled() -> (AgendaEvent, TenantId) {
        let tenant_id = TenantId::new();
        let id = AgendaEventId::new(AggregateId::new());
        let mut e = AgendaEvent::empty(id);
        execute(
            &mut e,
            &AgendaCommand::Schedule(ScheduleEvent {
                tenant_id,
                event_id: id,
                organizer: UserId::new(),
                details: details(at(10, 9), Some(at(10, 10))),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (e, tenant_id)
    }

    #[test]
    fn schedule_trims_and_defaults() {
        let (e, _) = scheduled();
        let d = e.details().unwrap();
        assert_eq!(d.title, "Quarterly review");
        assert_eq!(d.kind, AgendaEventKind::Meeting);
        assert_eq!(d.location, None);
        assert_eq!(e.status(), AgendaEventStatus::Planned);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let id = AgendaEventId::new(AggregateId::new());
        let err = AgendaEvent::empty(id)
            .handle(&AgendaCommand::Schedule(ScheduleEvent {
                tenant_id: TenantId::new(),
                event_id: id,
                organizer: UserId::new(),
                details: details(at(10, 9), Some(at(10, 8))),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn invitations_and_answers() {
        let (mut e, tenant_id) = scheduled();
        let guest = UserId::new();
        let invite = AgendaCommand::Invite(InviteAttendee {
            tenant_id,
            event_id: *e.id(),
            user_id: guest,
            occurred_at: Utc::now(),
        });
        execute(&mut e, &invite).unwrap();
        assert!(matches!(e.handle(&invite), Err(DomainError::Conflict(_))));

        let answer = |user_id| {
            AgendaCommand::Respond(RespondInvitation {
                tenant_id,
                event_id: AgendaEventId::new(AggregateId::nil()),
                user_id,
                accept: true,
                occurred_at: Utc::now(),
            })
        };
        // Wrong event id is caught before attendee lookup.
        assert!(matches!(e.handle(&answer(guest)), Err(DomainError::InvariantViolation(_))));

        let respond = |user_id| {
            AgendaCommand::Respond(RespondInvitation {
                tenant_id,
                event_id: *e.id(),
                user_id,
                accept: true,
                occurred_at: Utc::now(),
            })
        };
        assert_eq!(e.handle(&respond(UserId::new())).unwrap_err(), DomainError::Unauthorized);
        let accepted = respond(guest);
        execute(&mut e, &accepted).unwrap();
        assert_eq!(e.attendees()[0].status, AttendeeStatus::Accepted);
    }

    #[test]
    fn cancelled_event_is_frozen() {
        let (mut e, tenant_id) = scheduled();
        let cancel = AgendaCommand::Cancel(CloseEvent {
            tenant_id,
            event_id: *e.id(),
            occurred_at: Utc::now(),
        });
        execute(&mut e, &cancel).unwrap();
        assert_eq!(e.status(), AgendaEventStatus::Cancelled);
        assert!(matches!(e.handle(&cancel), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn upcoming_window_ends_at_midnight() {
        let until = upcoming_until(at(10, 15), 2);
        assert_eq!(until.date_naive(), at(12, 0).date_naive());
        assert!(until > at(12, 23));
        assert!(until < at(13, 0));
    }
}
