//! Human-readable labels and time buckets derived from run ids.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::model::run_id;

const DAY_FORMAT: &str = "%d/%m/%Y";
const RUN_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Trend bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketMode {
    #[default]
    #[serde(alias = "date")]
    Daily,
    Weekly,
}

impl fmt::Display for BucketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketMode::Daily => write!(f, "daily"),
            BucketMode::Weekly => write!(f, "weekly"),
        }
    }
}

impl FromStr for BucketMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "date" | "day" => Ok(BucketMode::Daily),
            "weekly" | "week" => Ok(BucketMode::Weekly),
            other => Err(format!("unknown trend mode '{other}' (expected daily or weekly)")),
        }
    }
}

/// Formats run ids in a fixed display offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labeler {
    offset: FixedOffset,
}

impl Default for Labeler {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl Labeler {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// `None` when the offset is a day or more.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Wall-clock time of a timestamp id in the display offset. `None` for
    /// opaque ids and for instants the offset pushes past the calendar range.
    fn local_time(&self, run_id: &str) -> Option<NaiveDateTime> {
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        run_id::timestamp(run_id).and_then(|ts| ts.naive_utc().checked_add_signed(shift))
    }

    /// `dd-mm-yyyy HH:MM:SS` for timestamp ids, the raw id otherwise.
    pub fn run_label(&self, run_id: &str) -> String {
        match self.local_time(run_id) {
            Some(local) => local.format(RUN_FORMAT).to_string(),
            None => run_id.to_string(),
        }
    }

    /// Calendar date of a timestamp id in the display offset.
    pub fn run_date(&self, run_id: &str) -> Option<NaiveDate> {
        self.local_time(run_id).map(|local| local.date())
    }

    /// The bucket a run falls into. Opaque ids are their own bucket, as are
    /// dates whose week runs off the end of the calendar.
    pub fn bucket_key(&self, run_id: &str, mode: BucketMode) -> String {
        let label = match (self.run_date(run_id), mode) {
            (None, _) => None,
            (Some(date), BucketMode::Daily) => Some(day_label(date)),
            (Some(date), BucketMode::Weekly) => week_label(date),
        };
        label.unwrap_or_else(|| run_id.to_string())
    }
}

pub fn day_label(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Monday-to-Friday span of the week containing `date`. Weekend days belong
/// to the week that started on the preceding Monday. `None` when either end
/// falls outside the representable calendar.
pub fn week_label(date: NaiveDate) -> Option<String> {
    let since_monday = Days::new(u64::from(date.weekday().num_days_from_monday()));
    let monday = date.checked_sub_days(since_monday)?;
    let friday = monday.checked_add_days(Days::new(4))?;
    Some(format!("{} - {}", day_label(monday), day_label(friday)))
}

/// Date a bucket label starts on; `None` for labels that are not dates.
pub fn parse_bucket_date(label: &str) -> Option<NaiveDate> {
    let head = label.split(' ').next()?;
    NaiveDate::parse_from_str(head, DAY_FORMAT).ok()
}

/// Ascending by parsed date, unparsable labels last in string order.
pub fn compare_bucket_labels(a: &str, b: &str) -> Ordering {
    match (parse_bucket_date(a), parse_bucket_date(b)) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
