//! Timestamped, leveled console records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::MaterializedValue;

/// One console call, fully materialized.
///
/// Created once per runtime notification and consumed once by a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    /// Console method (`log`, `warn`, ...).
    pub level: String,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    /// Materialized arguments, in call order.
    pub fields: Vec<MaterializedValue>,
}

impl LogEvent {
    /// Stamp an event with the current wall-clock time.
    #[must_use]
    pub fn now(level: impl Into<String>, fields: Vec<MaterializedValue>) -> Self {
        Self::at(level, Utc::now(), fields)
    }

    /// Stamp an event with an explicit time.
    #[must_use]
    pub fn at(
        level: impl Into<String>,
        time: DateTime<Utc>,
        fields: Vec<MaterializedValue>,
    ) -> Self {
        Self {
            level: level.into(),
            timestamp: format_timestamp(time),
            fields,
        }
    }

    /// Space-joined field renderings, escaped to a single line.
    #[must_use]
    pub fn message(&self) -> String {
        let joined = self
            .fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        escape_line_breaks(&joined)
    }

    /// The newline-terminated output record.
    #[must_use]
    pub fn to_record(&self) -> String {
        format!("[{}] {} {}\n", self.level, self.timestamp, self.message())
    }
}

/// Sortable textual timestamp, e.g. `2024-05-01T12:00:00.000Z`.
#[must_use]
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn escape_line_breaks(s: &str) -> String {
    if !s.contains(['\n', '\r']) {
        return s.to_string();
    }
    s.replace('\r', "\\r").replace('\n', "\\n")
}
