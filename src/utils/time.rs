use chrono::{DateTime, Utc};

pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

/// Convert an optional UTC timestamp into milliseconds, `0` when absent.
pub fn to_millis(time: Option<DateTime<Utc>>) -> i64 {
    time.map(|t| t.timestamp_millis()).unwrap_or_default()
}

/// Convert milliseconds back into a UTC timestamp, `None` for `0`.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}
