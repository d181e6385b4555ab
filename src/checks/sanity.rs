use std::collections::BTreeMap;
use tracing::debug;

use crate::checks::resolved;
use crate::checks::utility::sample_stddev;
use crate::config::{FeedConfig, Thresholds};
use crate::types::{Issue, Observation, SanityMetrics};

const CHECK: &str = "sanity";

/// Hour-over-hour changes above either spike threshold. Gaps in the value
/// series never count as a spike.
fn count_spikes(values: &[Option<f64>], thresholds: &Thresholds) -> usize {
    values
        .windows(2)
        .filter(|pair| {
            let (Some(prev), Some(cur)) = (pair[0], pair[1]) else {
                return false;
            };
            let diff = (cur - prev).abs();
            let pct = (prev != 0.0).then(|| diff / prev.abs());
            diff > thresholds.spike_abs || pct.is_some_and(|p| p > thresholds.spike_pct)
        })
        .count()
}

/// Rolling windows whose standard deviation is exactly zero.
fn count_flatlines(values: &[Option<f64>], window: usize) -> usize {
    if window == 0 {
        return 0;
    }
    values
        .windows(window)
        .filter(|w| {
            let filled: Option<Vec<f64>> = w.iter().copied().collect();
            filled.is_some_and(|w| sample_stddev(&w) == Some(0.0))
        })
        .count()
}

/// Per-zone statistical sanity: negative values, spikes and flatlines.
///
/// All three counts are always present in the metrics, zero when nothing
/// was found.
#[tracing::instrument(skip_all, fields(observations = observations.len()))]
pub fn check_value_sanity(
    observations: &[Observation],
    cfg: &FeedConfig,
) -> (Vec<Issue>, SanityMetrics) {
    let mut issues = Vec::new();
    let mut metrics = SanityMetrics::default();

    let mut by_zone: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for o in resolved(observations) {
        by_zone.entry(o.zone.as_str()).or_default().push(o);
    }

    for (zone, mut rows) in by_zone {
        rows.sort_by_key(|o| o.timestamp_utc);
        let values: Vec<Option<f64>> = rows.iter().map(|o| o.value).collect();

        let negatives = values.iter().flatten().filter(|v| **v < 0.0).count();
        let spikes = count_spikes(&values, &cfg.thresholds);
        let flatlines = count_flatlines(&values, cfg.thresholds.flatline_window_hours);
        debug!(zone, negatives, spikes, flatlines, "Zone sanity computed");

        metrics.negative_count += negatives;
        metrics.spike_count += spikes;
        metrics.flatline_count += flatlines;
    }

    if metrics.negative_count > 0 {
        issues.push(Issue::high(
            CHECK,
            format!("{} observations have negative load values.", metrics.negative_count),
            "Confirm source data corrections or filter negative values before use.",
        ));
    }

    if metrics.spike_count > 0 {
        issues.push(Issue::medium(
            CHECK,
            format!("{} hourly changes exceed spike thresholds.", metrics.spike_count),
            "Review sudden load jumps and verify they align with operator event notes.",
        ));
    }

    if metrics.flatline_count > 0 {
        issues.push(Issue::medium(
            CHECK,
            format!("{} flatline windows detected across zones.", metrics.flatline_count),
            "Investigate upstream data freezes or missing updates.",
        ));
    }

    (issues, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::series;
    use crate::config::test_config;
    use crate::types::Severity;

    fn cfg() -> FeedConfig {
        test_config(&["PGE", "TOTAL"], "TOTAL")
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1000.0 + i as f64 * 10.0).collect()
    }

    #[test]
    fn test_clean_series() {
        let obs = series("PGE", "2024-07-01 00:00", &ramp(24));
        let (issues, metrics) = check_value_sanity(&obs, &cfg());

        assert!(issues.is_empty());
        assert_eq!(metrics, SanityMetrics::default());
    }

    #[test]
    fn test_negative_values_are_high() {
        let mut values = ramp(5);
        values[2] = -5.0;
        let mut c = cfg();
        c.thresholds.spike_pct = 10.0;
        let obs = series("PGE", "2024-07-01 00:00", &values);
        let (issues, metrics) = check_value_sanity(&obs, &c);

        assert_eq!(metrics.negative_count, 1);
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn test_spike_by_percentage_and_absolute() {
        let t = Thresholds::default();
        // +50% jump, then +3000 absolute on a large base
        let values = vec![Some(1000.0), Some(1500.0), None, Some(100_000.0), Some(103_000.0)];
        assert_eq!(count_spikes(&values, &t), 2);
    }

    #[test]
    fn test_spike_ignores_zero_previous_for_percentage() {
        let t = Thresholds::default();
        assert_eq!(count_spikes(&[Some(0.0), Some(5.0)], &t), 0);
    }

    #[test]
    fn test_flatline_windows() {
        let values: Vec<Option<f64>> = [1.0, 2.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 4.0]
            .into_iter()
            .map(Some)
            .collect();
        // seven identical values produce two full windows of six
        assert_eq!(count_flatlines(&values, 6), 2);

        let mut gappy = values.clone();
        gappy[5] = None;
        assert_eq!(count_flatlines(&gappy, 6), 0);
    }

    #[test]
    fn test_sanity_sums_across_zones_and_reports_once() {
        let mut obs = series("PGE", "2024-07-01 00:00", &[500.0; 8]);
        obs.extend(series("SCE", "2024-07-01 00:00", &[700.0; 7]));
        let (issues, metrics) = check_value_sanity(&obs, &cfg());

        assert_eq!(metrics.flatline_count, 3 + 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Medium);
    }

    #[test]
    fn test_sorts_by_timestamp_before_differencing() {
        let mut obs = series("PGE", "2024-07-01 00:00", &ramp(6));
        obs.reverse();
        let (_, metrics) = check_value_sanity(&obs, &cfg());
        assert_eq!(metrics.spike_count, 0);
    }
}
