/// Utility functions for rounding, timestamps and address handling
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Round a physical value to one decimal place
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Current UTC time truncated to whole seconds
///
/// Every device recorded in a scan window is stamped with this, so the
/// timestamps posted to the inventory never carry a fractional part.
pub fn capture_timestamp() -> OffsetDateTime {
    truncate_to_seconds(OffsetDateTime::now_utc())
}

pub fn truncate_to_seconds(dt: OffsetDateTime) -> OffsetDateTime {
    dt.replace_nanosecond(0).unwrap_or(dt)
}

/// Format a timestamp as ISO-8601, e.g. `2024-03-01T12:30:05Z`
///
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string())
}

/// Canonical form of a hardware address: trimmed and uppercased
pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase()
}

/// Check whether an address belongs to one of the vendor prefixes
///
/// Prefixes are compared case-insensitively and may be given with or
/// without a trailing colon.
pub fn has_vendor_prefix(address: &str, prefixes: &[String]) -> bool {
    let address = normalize_address(address);
    prefixes.iter().any(|prefix| {
        let prefix = normalize_address(prefix);
        let prefix = prefix.trim_end_matches(':');
        !prefix.is_empty()
            && address
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}
