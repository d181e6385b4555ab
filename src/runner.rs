//! End-to-end validation: normalize, run every check, merge, score.

use tracing::info;

use crate::checks::{check_completeness, check_consistency, check_value_sanity};
use crate::config::FeedConfig;
use crate::dst::{DayInfoMap, dst_metrics};
use crate::error::Result;
use crate::ingest::RawTable;
use crate::normalize::normalize_feed;
use crate::scoring::{TrustScore, compute_trust_score};
use crate::types::{Issue, Metrics, Observation, sort_issues};

/// Everything a run produces, handed to the report builder.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub observations: Vec<Observation>,
    pub day_info: DayInfoMap,
    /// Sorted HIGH -> MEDIUM -> LOW, stable within a severity.
    pub issues: Vec<Issue>,
    pub metrics: Metrics,
    pub trust: TrustScore,
}

/// Runs the full pipeline over an already-loaded table.
///
/// Only structural failures from normalization are returned as errors.
#[tracing::instrument(skip_all, fields(iso = %cfg.iso))]
pub fn validate(table: &RawTable, cfg: &FeedConfig) -> Result<ValidationOutcome> {
    cfg.validate()?;
    let normalized = normalize_feed(table, cfg)?;
    let observations = normalized.observations;
    let day_info = normalized.day_info;

    let (completeness_issues, completeness) = check_completeness(&observations, cfg, &day_info);
    let (consistency_issues, consistency) = check_consistency(&observations, cfg);
    let (sanity_issues, sanity) = check_value_sanity(&observations, cfg);

    let mut issues = normalized.issues;
    issues.extend(completeness_issues);
    issues.extend(consistency_issues);
    issues.extend(sanity_issues);
    sort_issues(&mut issues);

    let metrics = Metrics {
        rows: observations.len(),
        completeness,
        consistency,
        sanity,
        dst: dst_metrics(&day_info),
    };

    let trust = compute_trust_score(&metrics, &cfg.penalties);
    info!(
        score = trust.score,
        level = ?trust.level,
        issues = issues.len(),
        "Validation complete"
    );

    Ok(ValidationOutcome {
        observations,
        day_info,
        issues,
        metrics,
        trust,
    })
}
