//! Timestamp mapping between chrono and SQLite TEXT columns.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

/// Format a timestamp for storage.
pub(crate) fn to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored timestamp, reporting the column index on failure.
pub(crate) fn from_sql(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}
