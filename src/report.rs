//! Report building and persistence.
//!
//! Writes a JSON health report (optionally gzip-compressed), a Markdown
//! summary, and the canonical observations as CSV.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::runner::ValidationOutcome;
use crate::scoring::TrustScore;
use crate::types::{Issue, Metrics, Observation, Severity};

pub const JSON_REPORT: &str = "partner_health.json";
pub const MARKDOWN_REPORT: &str = "partner_health_report.md";
pub const OBSERVATIONS_CSV: &str = "canonical_observations.csv";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueCounts {
    #[serde(rename = "HIGH")]
    pub high: usize,
    #[serde(rename = "MEDIUM")]
    pub medium: usize,
    #[serde(rename = "LOW")]
    pub low: usize,
}

impl IssueCounts {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let count = |s: Severity| issues.iter().filter(|i| i.severity == s).count();
        Self {
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at_utc: DateTime<Utc>,
    pub iso: String,
    pub input_files: Vec<String>,
    pub issue_counts: IssueCounts,
    pub issues: Vec<Issue>,
    pub metrics: Metrics,
    pub trust: TrustScore,
}

/// Flat CSV row for one canonical observation. Flags are `;`-joined.
#[derive(Debug, Serialize)]
struct ObservationRecord<'a> {
    timestamp_local: Option<String>,
    timestamp_utc: Option<String>,
    iso: &'a str,
    zone: &'a str,
    value: Option<f64>,
    source_file: &'a str,
    flags: String,
}

impl<'a> From<&'a Observation> for ObservationRecord<'a> {
    fn from(o: &'a Observation) -> Self {
        Self {
            timestamp_local: o.timestamp_local.map(|t| t.to_rfc3339()),
            timestamp_utc: o.timestamp_utc.map(|t| t.to_rfc3339()),
            iso: &o.iso,
            zone: &o.zone,
            value: o.value,
            source_file: &o.source_file,
            flags: o
                .flags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

pub fn build_report(cfg: &FeedConfig, outcome: &ValidationOutcome, input_files: &[String]) -> Report {
    Report {
        generated_at_utc: Utc::now(),
        iso: cfg.iso.clone(),
        input_files: input_files.to_vec(),
        issue_counts: IssueCounts::from_issues(&outcome.issues),
        issues: outcome.issues.clone(),
        metrics: outcome.metrics.clone(),
        trust: outcome.trust.clone(),
    }
}

/// Unique hints of HIGH issues, falling back to the first issue's hint.
pub fn recommendations(issues: &[Issue]) -> Vec<String> {
    if issues.is_empty() {
        return vec!["No action required. Data meets integrity expectations.".to_string()];
    }

    let mut recs: Vec<String> = Vec::new();
    for issue in issues.iter().filter(|i| i.severity == Severity::High) {
        if !recs.contains(&issue.hint) {
            recs.push(issue.hint.clone());
        }
    }
    if recs.is_empty() {
        recs.push(issues[0].hint.clone());
    }
    recs
}

pub fn render_markdown(report: &Report) -> String {
    let mut md = String::new();
    let trust = &report.trust;
    let metrics = &report.metrics;
    let counts = &report.issue_counts;

    let _ = writeln!(md, "# Load Integrity & Trust Report: {}\n", report.iso);
    let _ = writeln!(md, "## Executive Summary\n");
    let _ = writeln!(md, "- Generated (UTC): {}", report.generated_at_utc.to_rfc3339());
    let _ = writeln!(md, "- Trust Score: {} ({})", trust.score, trust.level.as_str());
    let _ = writeln!(
        md,
        "- Issues: HIGH={}, MEDIUM={}, LOW={}\n",
        counts.high, counts.medium, counts.low
    );

    let _ = writeln!(md, "## Coverage & Completeness\n");
    match &metrics.completeness {
        Some(c) => {
            let _ = writeln!(
                md,
                "- Completeness: {:.2}% ({}/{} rows)",
                c.completeness_pct * 100.0,
                c.actual_rows,
                c.expected_rows
            );
            let _ = writeln!(md, "- Missing hours across zones: {}", c.missing_hours_total);
            let _ = writeln!(md, "- Missing zones per hour: {}\n", c.missing_zones_per_hour);
        }
        None => {
            let _ = writeln!(md, "- Completeness could not be computed.\n");
        }
    }

    let dst = &metrics.dst;
    let _ = writeln!(md, "## DST Handling Summary\n");
    let _ = writeln!(md, "- Total days analyzed: {}", dst.total_days);
    let _ = writeln!(
        md,
        "- NORMAL: {}, SPRING_FORWARD: {}, FALL_BACK: {}\n",
        dst.normal_days, dst.spring_forward_days, dst.fall_back_days
    );

    let _ = writeln!(md, "## Internal Consistency\n");
    match &metrics.consistency {
        Some(c) => {
            let _ = writeln!(md, "- Consistency violations: {}", c.violation_count);
            let _ = writeln!(md, "- Max abs error: {:.2}", c.max_abs_error);
            let _ = writeln!(
                md,
                "- Max pct error: {:.2}%\n",
                c.max_pct_error.unwrap_or(0.0) * 100.0
            );
        }
        None => {
            let _ = writeln!(md, "- Consistency could not be computed.\n");
        }
    }

    let _ = writeln!(md, "## Top Issues\n");
    if report.issues.is_empty() {
        let _ = writeln!(md, "No issues detected.\n");
    } else {
        for (idx, issue) in report.issues.iter().enumerate() {
            let _ = writeln!(
                md,
                "### {}. [{}] {}",
                idx + 1,
                issue.severity.as_str(),
                issue.check
            );
            let _ = writeln!(md, "- {}", issue.message);
            let _ = writeln!(md, "- Hint: {}\n", issue.hint);
        }
    }

    let _ = writeln!(md, "## Recommended Actions\n");
    for rec in recommendations(&report.issues) {
        let _ = writeln!(md, "- {rec}");
    }

    md
}

/// Writes canonical observations as CSV with a header row.
pub fn write_observations_csv(path: &Path, observations: &[Observation]) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for o in observations {
        writer.serialize(ObservationRecord::from(o))?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = observations.len(), "Observations written");
    Ok(())
}

/// Writes the JSON report, Markdown report and observation CSV into `outdir`.
/// Returns the written paths.
pub fn write_report_files(
    report: &Report,
    observations: &[Observation],
    outdir: &Path,
    gzip: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(outdir)?;

    let json = serde_json::to_vec_pretty(report)?;
    let json_path = if gzip {
        let path = outdir.join(format!("{JSON_REPORT}.gz"));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        fs::write(&path, encoder.finish()?)?;
        path
    } else {
        let path = outdir.join(JSON_REPORT);
        fs::write(&path, json)?;
        path
    };

    let md_path = outdir.join(MARKDOWN_REPORT);
    fs::write(&md_path, render_markdown(report))?;

    let csv_path = outdir.join(OBSERVATIONS_CSV);
    write_observations_csv(&csv_path, observations)?;

    info!(outdir = %outdir.display(), gzip, "Report files written");
    Ok(vec![json_path, md_path, csv_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Penalties;
    use crate::scoring::compute_trust_score;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn report(issues: Vec<Issue>) -> Report {
        let metrics = Metrics::default();
        Report {
            generated_at_utc: Utc::now(),
            iso: "CAISO".into(),
            input_files: vec!["load.csv".into()],
            issue_counts: IssueCounts::from_issues(&issues),
            issues,
            trust: compute_trust_score(&metrics, &Penalties::default()),
            metrics,
        }
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(
            recommendations(&[]),
            vec!["No action required. Data meets integrity expectations."]
        );

        let issues = vec![
            Issue::high("a", "m", "fix totals"),
            Issue::high("b", "m", "fix totals"),
            Issue::high("c", "m", "fix gaps"),
            Issue::medium("d", "m", "check spikes"),
        ];
        assert_eq!(recommendations(&issues), vec!["fix totals", "fix gaps"]);
        assert_eq!(
            recommendations(&[Issue::medium("d", "m", "check spikes")]),
            vec!["check spikes"]
        );
    }

    #[test]
    fn test_issue_counts_serialize_upper_case() {
        let counts = IssueCounts::from_issues(&[Issue::high("a", "m", "h")]);
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["HIGH"], 1);
        assert_eq!(json["MEDIUM"], 0);
    }

    #[test]
    fn test_render_markdown_sections() {
        let md = render_markdown(&report(vec![Issue::high("consistency", "bad totals", "fix totals")]));

        assert!(md.starts_with("# Load Integrity & Trust Report: CAISO"));
        assert!(md.contains("## DST Handling Summary"));
        assert!(md.contains("### 1. [HIGH] consistency"));
        assert!(md.contains("- Hint: fix totals"));
        assert!(md.contains("Completeness could not be computed."));
    }

    #[test]
    fn test_write_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_report_files(&report(vec![]), &[], dir.path(), false).unwrap();

        assert_eq!(paths.len(), 3);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(JSON_REPORT)).unwrap()).unwrap();
        assert_eq!(json["trust"]["score"], 100.0);
        assert_eq!(json["trust"]["level"], "HIGH");
        assert!(dir.path().join(MARKDOWN_REPORT).exists());
    }

    #[test]
    fn test_write_report_files_gzip() {
        let dir = tempfile::tempdir().unwrap();
        write_report_files(&report(vec![]), &[], dir.path(), true).unwrap();

        let bytes = fs::read(dir.path().join(format!("{JSON_REPORT}.gz"))).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut decoded).unwrap();
        assert!(decoded.contains("\"iso\": \"CAISO\""));
    }
}
