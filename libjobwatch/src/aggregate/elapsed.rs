use time::OffsetDateTime;

pub const ZERO_ELAPSED: &str = "00:00:00";

/// Whole seconds between `start` and `end`, formatted `HH:MM:SS`. Hours grow
/// past two digits rather than wrapping. A zero or negative span is
/// `00:00:00`.
pub fn get_elapsed(start: OffsetDateTime, end: OffsetDateTime) -> String {
    let millis = (end - start).whole_milliseconds();
    if millis <= 0 {
        return ZERO_ELAPSED.to_string();
    }
    let secs = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
