use super::models::{CalendarEventRequest, EventDateTime};
use crate::error::{google_calendar_error, AppResult};
use crate::models::EventPayload;
use chrono::{Duration, NaiveDateTime};

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Start and end of an event in the calendar's local time.
///
/// Without an end time the event lasts one hour. An end that does not fall
/// after the start is taken to be on the following day.
pub fn event_window(payload: &EventPayload) -> AppResult<(NaiveDateTime, NaiveDateTime)> {
    let out_of_range =
        || google_calendar_error(&format!("Event date {} is out of range", payload.date));

    let start = payload.date.and_time(payload.start_time);
    let end = match payload.end_time {
        Some(end_time) => payload.date.and_time(end_time),
        None => start
            .checked_add_signed(Duration::hours(1))
            .ok_or_else(out_of_range)?,
    };

    if end <= start {
        let next_day = end
            .checked_add_signed(Duration::days(1))
            .ok_or_else(out_of_range)?;
        return Ok((start, next_day));
    }

    Ok((start, end))
}

/// Build the `events.insert` body for `payload` in `timezone`
pub fn build_event_request(
    payload: &EventPayload,
    timezone: &str,
) -> AppResult<CalendarEventRequest> {
    let (start, end) = event_window(payload)?;

    Ok(CalendarEventRequest {
        summary: payload.title.clone(),
        location: non_empty(&payload.location),
        description: non_empty(&payload.description),
        start: EventDateTime {
            date_time: start.format(DATE_TIME_FORMAT).to_string(),
            time_zone: timezone.to_string(),
        },
        end: EventDateTime {
            date_time: end.format(DATE_TIME_FORMAT).to_string(),
            time_zone: timezone.to_string(),
        },
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
