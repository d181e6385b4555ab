//! Data types shared by the normalizer, the checks and the scorer.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reserved zone identifier every source-specific total column is mapped to.
pub const CANONICAL_TOTAL_ZONE: &str = "ISO_TOTAL";

/// Issue severity. Declaration order is report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

/// A single quality finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub check: String,
    pub message: String,
    pub hint: String,
}

impl Issue {
    pub fn new(
        severity: Severity,
        check: &str,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            check: check.to_string(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn high(check: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(Severity::High, check, message, hint)
    }

    pub fn medium(check: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(Severity::Medium, check, message, hint)
    }
}

/// Sorts issues HIGH -> MEDIUM -> LOW, keeping insertion order within a severity.
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by_key(|i| i.severity);
}

/// Diagnostic code attached to an observation at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flag {
    InvalidHour,
    DstFallBackDuplicate,
    DstFallBackAmbiguous,
    DstSpringForwardNonexistent,
    DstLocalizeFailed,
    SourceNote,
    NonNumericValue,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::InvalidHour => "INVALID_HOUR",
            Flag::DstFallBackDuplicate => "DST_FALL_BACK_DUPLICATE",
            Flag::DstFallBackAmbiguous => "DST_FALL_BACK_AMBIGUOUS",
            Flag::DstSpringForwardNonexistent => "DST_SPRING_FORWARD_NONEXISTENT",
            Flag::DstLocalizeFailed => "DST_LOCALIZE_FAILED",
            Flag::SourceNote => "SOURCE_NOTE",
            Flag::NonNumericValue => "NON_NUMERIC_VALUE",
        }
    }
}

pub type Flags = BTreeSet<Flag>;

/// One canonical row per (timestamp, zone).
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub timestamp_local: Option<DateTime<Tz>>,
    pub timestamp_utc: Option<DateTime<Utc>>,
    pub iso: String,
    pub zone: String,
    pub value: Option<f64>,
    pub source_file: String,
    pub flags: Flags,
}

impl Observation {
    pub fn is_total(&self) -> bool {
        self.zone == CANONICAL_TOTAL_ZONE
    }

    /// Local calendar date of the resolved timestamp.
    pub fn local_date(&self) -> Option<NaiveDate> {
        self.timestamp_local.map(|ts| ts.date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessMetrics {
    pub expected_rows: usize,
    pub actual_rows: usize,
    pub completeness_pct: f64,
    pub missing_hours_total: usize,
    pub missing_zones_per_hour: usize,
    pub missing_by_day: BTreeMap<NaiveDate, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyMetrics {
    pub violation_count: usize,
    pub max_abs_error: f64,
    pub mean_abs_error: f64,
    /// `None` when every compared total was zero.
    pub max_pct_error: Option<f64>,
    pub mean_pct_error: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanityMetrics {
    pub negative_count: usize,
    pub spike_count: usize,
    pub flatline_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DstMetrics {
    pub total_days: usize,
    pub normal_days: usize,
    pub spring_forward_days: usize,
    pub fall_back_days: usize,
    pub dst_days: usize,
}

/// Merged metrics from every check. A `None` sub-record means the check could
/// not compute anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub rows: usize,
    pub completeness: Option<CompletenessMetrics>,
    pub consistency: Option<ConsistencyMetrics>,
    pub sanity: SanityMetrics,
    pub dst: DstMetrics,
}
