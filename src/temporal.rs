//! Trailing-window filtering for incident records.
//!
//! Runs before normalization so the batch scaling statistics only reflect
//! records that are still in the window.

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::{RawRecord, RecordDetails};

/// Keep incident records whose active interval touches the trailing window.
///
/// A record is kept iff `end_time >= now - window` or
/// `start_time >= now - window`. Missing timestamps default to the Unix
/// epoch, so a record with neither timestamp is excluded. Records without
/// incident details pass through unchanged.
pub fn filter_recent(
    records: Vec<RawRecord>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<RawRecord> {
    let cutoff = now - window;
    let before = records.len();

    let kept: Vec<RawRecord> = records
        .into_iter()
        .filter(|record| match &record.details {
            RecordDetails::Incident(info) => {
                let start = info.start_time.unwrap_or(DateTime::UNIX_EPOCH);
                let end = info.end_time.unwrap_or(DateTime::UNIX_EPOCH);
                end >= cutoff || start >= cutoff
            }
            RecordDetails::Flow(_) => true,
        })
        .collect();

    debug!(
        "temporal filter kept {}/{} records (cutoff {})",
        kept.len(),
        before,
        cutoff
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Criticality, GeoPoint, IncidentInfo};
    use chrono::TimeZone;

    fn incident(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> RawRecord {
        RawRecord {
            description: "lane blocked".to_string(),
            position: GeoPoint::new(52.5, 13.4),
            details: RecordDetails::Incident(IncidentInfo {
                criticality: Some(Criticality::Minor),
                incident_type: "construction".to_string(),
                start_time: start,
                end_time: end,
                road_closed: false,
            }),
            source_updated: None,
        }
    }

    fn reference_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_stale_incident_excluded() {
        let now = reference_now();
        let record = incident(
            Some(now - Duration::hours(30)),
            Some(now - Duration::hours(25)),
        );
        let kept = filter_recent(vec![record], now, Duration::hours(24));
        assert!(kept.is_empty());
    }

    #[test]
    fn test_recent_end_included() {
        let now = reference_now();
        let record = incident(
            Some(now - Duration::hours(30)),
            Some(now - Duration::hours(1)),
        );
        let kept = filter_recent(vec![record], now, Duration::hours(24));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_recent_start_included() {
        let now = reference_now();
        let record = incident(Some(now - Duration::hours(2)), None);
        let kept = filter_recent(vec![record], now, Duration::hours(24));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_window_boundary_included() {
        let now = reference_now();
        let record = incident(None, Some(now - Duration::hours(24)));
        let kept = filter_recent(vec![record], now, Duration::hours(24));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_missing_timestamps_excluded() {
        let now = reference_now();
        let kept = filter_recent(vec![incident(None, None)], now, Duration::hours(24));
        assert!(kept.is_empty());
    }

    #[test]
    fn test_flow_records_pass_through() {
        use crate::FlowConditions;
        let now = reference_now();
        let flow = RawRecord {
            description: "A10".to_string(),
            position: GeoPoint::new(52.5, 13.4),
            details: RecordDetails::Flow(FlowConditions {
                speed: 80.0,
                free_flow_speed: 100.0,
                jam_factor: 1.0,
            }),
            source_updated: None,
        };
        let kept = filter_recent(vec![flow], now, Duration::hours(24));
        assert_eq!(kept.len(), 1);
    }
}
