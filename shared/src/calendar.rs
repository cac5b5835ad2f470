//! Event calendar: date parsing, day filtering and calendar marks.
//!
//! Days are compared as whole UTC calendar days.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::value::{Fields, Value};

const FALLBACK_EVENT_LABEL: &str = "Event";

/// Reads a stored date. Accepts RFC 3339 and `YYYY-MM-DD[THH:MM[:SS]]`
/// text, epoch milliseconds, and `{seconds, nanoseconds}` timestamp objects.
/// Falsy values have no date.
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    if !value.is_truthy() {
        return None;
    }
    match value {
        Value::String(s) => parse_date_text(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::Object(fields) => {
            let int = |keys: [&str; 2]| {
                keys.iter()
                    .find_map(|k| fields.get(*k))
                    .and_then(|v| match v {
                        Value::Number(n) => n.as_i64(),
                        _ => None,
                    })
            };
            let seconds = int(["seconds", "_seconds"])?;
            let nanos = int(["nanoseconds", "_nanoseconds"]).unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Epoch milliseconds of a stored date, 0 when there is none. Used as a
/// sort key.
pub fn ms_from(value: &Value) -> i64 {
    as_date(value).map_or(0, |dt| dt.timestamp_millis())
}

fn field_date(event: &Fields, key: &str) -> Option<DateTime<Utc>> {
    event.get(key).and_then(as_date)
}

/// Whether `day` falls on the event. With a `dateEnd` the range is inclusive
/// of both ends; without one the event covers only its start day.
pub fn in_day_range(event: &Fields, day: NaiveDate) -> bool {
    let Some(start) = field_date(event, "date") else {
        return false;
    };
    let start = start.date_naive();

    match field_date(event, "dateEnd") {
        Some(end) => day >= start && day <= end.date_naive(),
        None => day == start,
    }
}

/// Events covering `day`, or all of them when no day is selected.
pub fn by_selected_date<'a>(events: &'a [(String, Fields)], day: Option<NaiveDate>) -> Vec<&'a (String, Fields)> {
    events
        .iter()
        .filter(|(_, event)| day.map_or(true, |d| in_day_range(event, d)))
        .collect()
}

/// The day picked on the calendar. Picking the same day again clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySelection {
    selected: Option<NaiveDate>,
}

impl DaySelection {
    pub fn selected(&self) -> Option<NaiveDate> {
        self.selected
    }

    pub fn toggle(&mut self, day: NaiveDate) {
        self.selected = match self.selected {
            Some(current) if current == day => None,
            _ => Some(day),
        };
    }

    pub fn apply<'a>(&self, events: &'a [(String, Fields)]) -> Vec<&'a (String, Fields)> {
        by_selected_date(events, self.selected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkKind {
    /// Highlighted span for an event that ends after it starts.
    Range,
    Dot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarMark {
    pub key: String,
    pub kind: MarkKind,
    pub label: String,
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// One mark per dated event, in list order. Undated events are skipped.
pub fn calendar_marks(events: &[(String, Fields)]) -> Vec<CalendarMark> {
    events
        .iter()
        .filter_map(|(id, event)| {
            let start = field_date(event, "date")?;
            let label = event
                .get("title")
                .filter(|t| t.is_truthy())
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_EVENT_LABEL)
                .to_string();

            let mark = match field_date(event, "dateEnd").filter(|end| *end > start) {
                Some(end) => CalendarMark {
                    key: format!("range-{}", id),
                    kind: MarkKind::Range,
                    label,
                    start: start.to_rfc3339(),
                    end: Some(end.to_rfc3339()),
                },
                None => CalendarMark {
                    key: format!("dot-{}-{}", id, start.timestamp_millis()),
                    kind: MarkKind::Dot,
                    label,
                    start: start.to_rfc3339(),
                    end: None,
                },
            };
            Some(mark)
        })
        .collect()
}
