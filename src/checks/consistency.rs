use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::checks::resolved;
use crate::checks::utility::mean;
use crate::config::FeedConfig;
use crate::types::{ConsistencyMetrics, Issue, Observation};

const CHECK: &str = "consistency";

/// Compares the sum of component zones against the total zone per timestamp.
///
/// A timestamp violates when the absolute error exceeds `consistency_abs` or
/// the error relative to `|total|` exceeds `consistency_pct`. The relative
/// error is undefined for a zero total and never triggers on its own.
#[tracing::instrument(skip_all, fields(observations = observations.len()))]
pub fn check_consistency(
    observations: &[Observation],
    cfg: &FeedConfig,
) -> (Vec<Issue>, Option<ConsistencyMetrics>) {
    let mut issues = Vec::new();

    let mut sum_by_ts: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    let mut totals_by_ts: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    let mut any_valid = false;
    let mut any_total = false;

    for o in resolved(observations) {
        any_valid = true;
        let Some(ts) = o.timestamp_utc else { continue };
        if o.is_total() {
            any_total = true;
            let entry = totals_by_ts.entry(ts).or_default();
            if let Some(v) = o.value {
                entry.push(v);
            }
        } else {
            *sum_by_ts.entry(ts).or_default() += o.value.unwrap_or(0.0);
        }
    }

    if !any_valid {
        return (issues, None);
    }

    if !any_total {
        issues.push(Issue::high(
            CHECK,
            format!(
                "No {} total observations found to validate internal consistency.",
                cfg.iso
            ),
            "Ensure the total zone column is included in the source feed.",
        ));
        return (issues, None);
    }

    let mut abs_errors = Vec::new();
    let mut pct_errors = Vec::new();
    let mut violation_count = 0usize;
    let abs_thresh = cfg.thresholds.consistency_abs;
    let pct_thresh = cfg.thresholds.consistency_pct;

    for (ts, totals) in &totals_by_ts {
        let (Some(sum), false) = (sum_by_ts.get(ts), totals.is_empty()) else {
            continue;
        };
        let total = mean(totals);
        let abs_error = (total - sum).abs();
        let pct_error = (total != 0.0).then(|| abs_error / total.abs());

        if abs_error > abs_thresh || pct_error.is_some_and(|p| p > pct_thresh) {
            violation_count += 1;
        }
        abs_errors.push(abs_error);
        if let Some(p) = pct_error {
            pct_errors.push(p);
        }
    }

    if abs_errors.is_empty() {
        issues.push(Issue::high(
            CHECK,
            "Unable to compute consistency; total or component zones missing per hour.",
            "Verify that zonal data and total data share the same timestamps.",
        ));
        return (issues, None);
    }

    debug!(compared = abs_errors.len(), violation_count, "Consistency computed");

    if violation_count > 0 {
        issues.push(Issue::high(
            CHECK,
            format!(
                "{violation_count} hours exceed consistency thresholds (abs>{abs_thresh} or pct>{:.2}%).",
                pct_thresh * 100.0
            ),
            "Investigate mismatched totals or zonal corrections in the source feed.",
        ));
    }

    let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let metrics = ConsistencyMetrics {
        violation_count,
        max_abs_error: max(&abs_errors),
        mean_abs_error: mean(&abs_errors),
        max_pct_error: (!pct_errors.is_empty()).then(|| max(&pct_errors)),
        mean_pct_error: (!pct_errors.is_empty()).then(|| mean(&pct_errors)),
    };

    (issues, Some(metrics))
}
