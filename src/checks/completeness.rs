use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::checks::resolved;
use crate::config::FeedConfig;
use crate::dst::DayInfoMap;
use crate::types::{CANONICAL_TOTAL_ZONE, CompletenessMetrics, Issue, Observation, Severity};

const CHECK: &str = "completeness";

/// Below this completeness ratio missing hours are reported as HIGH.
const HIGH_SEVERITY_RATIO: f64 = 0.98;

/// Compares observed rows against the civil-hour count of every date and zone.
///
/// Expected rows per date come from [`DayInfoMap`] (23, 24 or 25 hours), so
/// DST days are neither over- nor under-counted. Returns `None` metrics when
/// no observation has a resolved timestamp.
#[tracing::instrument(skip_all, fields(observations = observations.len()))]
pub fn check_completeness(
    observations: &[Observation],
    cfg: &FeedConfig,
    day_info: &DayInfoMap,
) -> (Vec<Issue>, Option<CompletenessMetrics>) {
    let mut issues = Vec::new();

    let expected_zones: Vec<&str> = cfg
        .component_zones()
        .chain(std::iter::once(CANONICAL_TOTAL_ZONE))
        .collect();
    let zone_count = expected_zones.len();

    let valid: Vec<&Observation> = resolved(observations).collect();
    if valid.is_empty() {
        issues.push(Issue::high(
            CHECK,
            "No valid timestamps available to assess completeness.",
            "Resolve timestamp parsing or DST localization errors.",
        ));
        return (issues, None);
    }

    let mut seen: HashMap<(NaiveDate, &str), HashSet<DateTime<Utc>>> = HashMap::new();
    let mut zones_per_ts: HashMap<DateTime<Utc>, HashSet<&str>> = HashMap::new();
    for o in &valid {
        let (Some(date), Some(utc)) = (o.local_date(), o.timestamp_utc) else {
            continue;
        };
        seen.entry((date, o.zone.as_str())).or_default().insert(utc);
        zones_per_ts.entry(utc).or_default().insert(o.zone.as_str());
    }

    let mut expected_rows = 0usize;
    let mut missing_hours_total = 0usize;
    let mut missing_by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

    for (date, info) in day_info {
        let expected_hours = info.expected_hours as usize;
        expected_rows += expected_hours * zone_count;
        for zone in &expected_zones {
            let actual = seen.get(&(*date, *zone)).map_or(0, HashSet::len);
            let missing = expected_hours.saturating_sub(actual);
            if missing > 0 {
                *missing_by_day.entry(*date).or_default() += missing;
                missing_hours_total += missing;
            }
        }
    }

    let actual_rows = valid.len();
    let completeness_pct = if expected_rows == 0 {
        0.0
    } else {
        actual_rows as f64 / expected_rows as f64
    };

    let missing_zones_per_hour: usize = zones_per_ts
        .values()
        .map(|zones| zone_count.saturating_sub(zones.len()))
        .sum();

    debug!(
        expected_rows,
        actual_rows,
        missing_hours_total,
        missing_zones_per_hour,
        "Completeness computed"
    );

    if missing_hours_total > 0 {
        let severity = if completeness_pct < HIGH_SEVERITY_RATIO {
            Severity::High
        } else {
            Severity::Medium
        };
        issues.push(Issue::new(
            severity,
            CHECK,
            format!(
                "Missing {missing_hours_total} hourly observations across zones. Completeness {:.2}%.",
                completeness_pct * 100.0
            ),
            "Identify gaps by date/zone and reconcile missing hours with the source files.",
        ));
    }

    if missing_zones_per_hour > 0 {
        issues.push(Issue::high(
            CHECK,
            format!("{missing_zones_per_hour} zone observations missing within hourly timestamps."),
            "Ensure all expected zones are present for every hour before downstream use.",
        ));
    }

    let metrics = CompletenessMetrics {
        expected_rows,
        actual_rows,
        completeness_pct,
        missing_hours_total,
        missing_zones_per_hour,
        missing_by_day,
    };

    (issues, Some(metrics))
}
