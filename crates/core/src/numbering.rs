//! Sequential document references (`INV-00042`).

/// Next reference for `prefix`: highest existing `<prefix>-<n>` plus one,
/// zero-padded to five digits. References with another prefix or a
/// non-numeric suffix are ignored. The counter stops at `u64::MAX`.
pub fn next_reference<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let max = existing
        .into_iter()
        .filter_map(|r| r.strip_prefix(prefix)?.strip_prefix('-')?.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}-{:05}", max.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continues_after_highest_number() {
        let refs = ["INV-00001", "INV-00007", "BIL-00099", "INV-draft"];
        assert_eq!(next_reference("INV", refs), "INV-00008");
        assert_eq!(next_reference("BIL", refs), "BIL-00100");
        assert_eq!(next_reference("PRO", refs), "PRO-00001");
    }

    #[test]
    fn grows_past_five_digits() {
        assert_eq!(next_reference("TCK", ["TCK-99999"]), "TCK-100000");
    }

    #[test]
    fn largest_counter_does_not_overflow() {
        let last = format!("INV-{}", u64::MAX);
        assert_eq!(next_reference("INV", [last.as_str()]), last);
        assert_eq!(next_reference("INV", ["INV-18446744073709551614"]), last);
    }
}
