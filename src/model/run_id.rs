//! Run identifiers. A run id of 13 or more ASCII digits is an epoch
//! millisecond timestamp; anything else is an opaque token.

use chrono::{DateTime, Utc};

pub const TIMESTAMP_MIN_DIGITS: usize = 13;

pub fn is_timestamp(run_id: &str) -> bool {
    run_id.len() >= TIMESTAMP_MIN_DIGITS && run_id.bytes().all(|b| b.is_ascii_digit())
}

/// The instant a timestamp-shaped run id encodes, if it is representable.
pub fn timestamp(run_id: &str) -> Option<DateTime<Utc>> {
    if !is_timestamp(run_id) {
        return None;
    }
    run_id
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// A fresh timestamp-shaped run id, as reporters mint them.
pub fn from_instant(now: DateTime<Utc>) -> String {
    now.timestamp_millis().to_string()
}

/// Sort keys that order timestamp ids numerically and everything else as
/// plain strings.
///
/// Timestamp ids are zero-padded to a common width so that a single string
/// comparison is a total order over the whole set. When every timestamp id
/// has the same digit count, which holds for real epoch-ms ids, this is
/// exactly "numeric when both are timestamps, lexical otherwise".
#[derive(Debug, Clone, Copy)]
pub struct SortKeys {
    width: usize,
}

impl SortKeys {
    pub fn for_ids<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let width = ids
            .into_iter()
            .filter(|id| is_timestamp(id))
            .map(|id| id.trim_start_matches('0').len())
            .max()
            .unwrap_or(0);
        Self { width }
    }

    pub fn key(&self, id: &str) -> String {
        if is_timestamp(id) {
            format!("{:0>width$}", id.trim_start_matches('0'), width = self.width)
        } else {
            id.to_string()
        }
    }
}
