use chrono::DateTime;
use chrono_tz::Tz;

/// Renders unix timestamps for display in one fixed timezone, e.g.
/// `Nov 14, 2023, 5:13 PM`.
#[derive(Debug, Clone, Copy)]
pub struct TimeFormatter {
    tz: Tz,
}

impl TimeFormatter {
    const FORMAT: &'static str = "%b %-d, %Y, %-I:%M %p";

    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Empty string for timestamps chrono cannot represent.
    pub fn format_unix(&self, seconds: u64) -> String {
        i64::try_from(seconds)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .map(|utc| utc.with_timezone(&self.tz).format(Self::FORMAT).to_string())
            .unwrap_or_default()
    }
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self::new(chrono_tz::America::Toronto)
    }
}
