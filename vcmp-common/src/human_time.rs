//! Human-readable track durations
//!
//! Durations are shown the way chat clients display them: `M:SS` below one
//! hour and `H:MM:SS` from one hour up.

const SECONDS_PER_HOUR: u64 = 3600;

/// Format seconds as a clock string.
///
/// # Examples
///
/// ```
/// use vcmp_common::human_time::format_clock;
///
/// assert_eq!(format_clock(0), "0:00");
/// assert_eq!(format_clock(205), "3:25");
/// assert_eq!(format_clock(3661), "1:01:01");
/// ```
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / SECONDS_PER_HOUR;
    let mins = (seconds % SECONDS_PER_HOUR) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Parse a clock string (`SS`, `M:SS` or `H:MM:SS`) back into seconds.
///
/// Returns None for anything that is not a plain clock value, such as
/// `Live` or `Unknown`.
///
/// # Examples
///
/// ```
/// use vcmp_common::human_time::parse_clock;
///
/// assert_eq!(parse_clock("3:25"), Some(205));
/// assert_eq!(parse_clock("1:01:01"), Some(3661));
/// assert_eq!(parse_clock("Live"), None);
/// ```
pub fn parse_clock(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total = 0u64;
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part.parse().ok()?;
        // Only the leading field may exceed 59
        if i > 0 && value >= 60 {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}
