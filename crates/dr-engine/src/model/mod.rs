//! Domain types shared by the repositories, pipelines and services.

mod job;
mod object;
mod query;
mod reconcile;
mod schedule;

pub use job::{
    ExecutionOptions, Job, JobId, JobSpecification, JobSpecificationRequest, JobStatus,
};
pub use object::{DiscoveredObject, Filter, FilterStatus, NewDiscoveredObject, NewFilter, ObjectStatus};
pub use query::{JobQuery, ObjectQuery, ObjectSort, Page};
pub use reconcile::{ReconcileObject, ReconcileRequest};
pub use schedule::{CreateJobSchedule, JobSchedule};

use chrono::{DateTime, SecondsFormat, Utc};

/// JSON property map of a fetched or persisted record.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// Formats a timestamp the way it is stored: fixed-width RFC 3339 in UTC,
/// so that text comparison in SQL matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp, falling back to the epoch for unreadable values.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_timestamp(&ts), "2026-03-04T05:06:07.000000Z");
        assert_eq!(parse_timestamp(&format_timestamp(&ts)), ts);
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 9, 23, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 10, 1, 0, 0).unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        assert_eq!(parse_timestamp("not a date").timestamp(), 0);
    }
}
