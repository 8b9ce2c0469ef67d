//! Row-to-model conversion helpers shared by the table modules.
//!
//! Every helper maps its failure into `rusqlite::Error::FromSqlConversionFailure`
//! so the table modules can use them inside `query_map` closures.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

fn conv_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn tag_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conv_err(idx, e))
}

pub(crate) fn parse_opt_uuid(idx: usize, s: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    s.map(|v| parse_uuid(idx, &v)).transpose()
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conv_err(idx, e))
}

pub(crate) fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|v| parse_ts(idx, &v)).transpose()
}

/// Parse a stored enum tag through the given `from_str`, failing loudly on
/// unknown tags instead of defaulting.
pub(crate) fn parse_tag<T>(
    idx: usize,
    s: &str,
    from_str: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    from_str(s).ok_or_else(|| tag_err(idx, format!("unknown tag: {s}")))
}
