use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike};

/// Parse a time-of-day in HH:MM or HH:MM:SS format
pub fn parse_time(time_str: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    let hour = parts[0].parse::<u32>().ok()?;
    let minute = parts[1].parse::<u32>().ok()?;
    let second = match parts.get(2) {
        Some(s) => s.parse::<u32>().ok()?,
        None => 0,
    };
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Parse a calendar date in strict YYYY-MM-DD format
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    let date_str = date_str.trim();
    // chrono's %Y also takes signed and five-plus digit years
    let bytes = date_str.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return None;
    }
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
}

/// Format a time-of-day as HH:MM, keeping seconds only when they are set
pub fn format_time(time: &NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

/// Long human date used in extraction prompts, e.g. "Saturday, March 1, 2025"
pub fn long_date<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%A, %B %-d, %Y").to_string()
}

/// Serde adapter for `HH:MM` times
pub mod hhmm {
    use super::{format_time, parse_time};
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_time(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_time(&raw).ok_or_else(|| de::Error::custom(format!("invalid time of day: {raw}")))
    }
}

/// Serde adapter for optional `HH:MM` times
pub mod hhmm_option {
    use super::{format_time, parse_time};
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.serialize_str(&format_time(time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse_time(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time of day: {raw}"))),
        }
    }
}
