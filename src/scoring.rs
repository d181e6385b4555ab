//! Trust score: 100 minus weighted penalties for each defect category.

use serde::Serialize;

use crate::config::Penalties;
use crate::types::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    High,
    Degraded,
    DoNotUse,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::High => "HIGH",
            TrustLevel::Degraded => "DEGRADED",
            TrustLevel::DoNotUse => "DO_NOT_USE",
        }
    }
}

/// Converts a score (0–100) into a trust level.
///
/// | Range  | Level      |
/// |--------|------------|
/// | >= 90  | HIGH       |
/// | >= 70  | DEGRADED   |
/// | < 70   | DO_NOT_USE |
pub fn trust_level(score: f64) -> TrustLevel {
    match score {
        s if s >= 90.0 => TrustLevel::High,
        s if s >= 70.0 => TrustLevel::Degraded,
        _ => TrustLevel::DoNotUse,
    }
}

/// Raw counts behind each penalty category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub missing_hours: usize,
    pub missing_zones: usize,
    pub dst_days: usize,
    pub consistency_violations: usize,
    pub anomaly_events: usize,
}

impl ScoreBreakdown {
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let (missing_hours, missing_zones) = metrics
            .completeness
            .as_ref()
            .map_or((0, 0), |c| (c.missing_hours_total, c.missing_zones_per_hour));
        let sanity = &metrics.sanity;

        Self {
            missing_hours,
            missing_zones,
            dst_days: metrics.dst.dst_days,
            consistency_violations: metrics
                .consistency
                .as_ref()
                .map_or(0, |c| c.violation_count),
            anomaly_events: sanity.negative_count + sanity.spike_count + sanity.flatline_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustScore {
    pub score: f64,
    pub level: TrustLevel,
    pub breakdown: ScoreBreakdown,
}

/// Scores merged metrics against `penalties`. Clamped at 0.0 and rounded to
/// two decimals.
pub fn compute_trust_score(metrics: &Metrics, penalties: &Penalties) -> TrustScore {
    let b = ScoreBreakdown::from_metrics(metrics);

    let mut score = 100.0;
    score -= b.missing_hours as f64 * penalties.missing_hour;
    score -= b.missing_zones as f64 * penalties.missing_zone;
    score -= b.dst_days as f64 * penalties.dst_day;
    score -= b.consistency_violations as f64 * penalties.consistency_violation;
    score -= b.anomaly_events as f64 * penalties.anomaly;

    let score = (score.max(0.0) * 100.0).round() / 100.0;

    TrustScore {
        score,
        level: trust_level(score),
        breakdown: b,
    }
}
