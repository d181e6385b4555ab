//! CLI entry point for the ISO load rater.
//!
//! Provides subcommands for validating a single feed and for running a batch
//! of independent feed validations concurrently.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iso_load_rater::ingest::read_inputs;
use iso_load_rater::report::{build_report, write_report_files};
use iso_load_rater::scoring::TrustScore;
use iso_load_rater::{FeedConfig, validate};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "iso_load_rater")]
#[command(about = "Validate and score hourly ISO load data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and score one feed
    Validate {
        /// Input CSV files
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Path to the JSON feed config
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for report files
        #[arg(short, long, default_value = "out")]
        outdir: PathBuf,

        /// Gzip compress the JSON report
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Run every job in a manifest, each independently
    Batch {
        /// JSON manifest: a list of {config, inputs, outdir, gzip?} jobs
        #[arg(short, long)]
        manifest: PathBuf,

        /// Maximum number of jobs running at once
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct BatchJob {
    config: PathBuf,
    inputs: Vec<PathBuf>,
    outdir: PathBuf,
    #[serde(default)]
    gzip: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/iso_load_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("iso_load_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            input,
            config,
            outdir,
            gzip,
        } => {
            let job = BatchJob {
                config,
                inputs: input,
                outdir,
                gzip,
            };
            let trust = tokio::task::spawn_blocking(move || run_job(&job)).await??;
            info!(score = trust.score, level = trust.level.as_str(), "Feed validated");
        }
        Commands::Batch {
            manifest,
            concurrency,
        } => {
            run_batch(&manifest, concurrency).await?;
        }
    }

    Ok(())
}

/// Loads config and inputs, validates, and writes the report files.
#[tracing::instrument(skip_all, fields(config = %job.config.display(), outdir = %job.outdir.display()))]
fn run_job(job: &BatchJob) -> Result<TrustScore> {
    let cfg = FeedConfig::load(&job.config)
        .with_context(|| format!("loading config {}", job.config.display()))?;
    let table = read_inputs(&job.inputs)?;
    let outcome = validate(&table, &cfg)?;

    let input_files: Vec<String> = job
        .inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let report = build_report(&cfg, &outcome, &input_files);
    let written = write_report_files(&report, &outcome.observations, &job.outdir, job.gzip)?;
    for path in &written {
        info!(path = %path.display(), "Wrote");
    }

    if outcome.issues.is_empty() {
        info!("No issues detected");
    } else {
        for issue in &outcome.issues {
            warn!(
                severity = issue.severity.as_str(),
                check = %issue.check,
                message = %issue.message,
                "Issue"
            );
        }
    }

    Ok(outcome.trust)
}

/// Runs every manifest job on the blocking pool with bounded concurrency. A
/// failed job is logged and does not stop the others.
#[tracing::instrument(skip_all, fields(manifest = %manifest.display(), concurrency = concurrency))]
async fn run_batch(manifest: &Path, concurrency: usize) -> Result<()> {
    let content = tokio::fs::read_to_string(manifest).await?;
    let jobs: Vec<BatchJob> = serde_json::from_str(&content)?;
    info!(job_count = jobs.len(), "Batch manifest loaded");

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = vec![];

    for job in jobs {
        let sem = semaphore.clone();
        let job_span = tracing::info_span!("batch_job", config = %job.config.display());

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                let config = job.config.clone();
                let result = tokio::task::spawn_blocking(move || run_job(&job)).await?;
                match &result {
                    Ok(trust) => info!(score = trust.score, level = trust.level.as_str(), "Job finished"),
                    Err(e) => error!(config = %config.display(), error = %e, "Job failed"),
                }
                result
            }
            .instrument(job_span),
        );

        tasks.push(task);
    }

    let mut failed = 0usize;
    let total = tasks.len();
    for task in tasks {
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => failed += 1,
            Err(e) => {
                error!(error = %e, "Job task panicked");
                failed += 1;
            }
        }
    }

    info!(total, failed, "Batch complete");
    if failed > 0 {
        anyhow::bail!("{failed} of {total} batch jobs failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "iso": "CAISO",
        "timezone": "America/Los_Angeles",
        "date_col": "Date",
        "hour_col": "HR",
        "hour_convention": "HR",
        "zones": ["PGE", "TOTAL"],
        "total_zone": "TOTAL"
    }"#;

    fn write_manifest(dir: &Path, jobs: serde_json::Value) -> PathBuf {
        let path = dir.join("manifest.json");
        std::fs::write(&path, jobs.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_batch_succeeds_when_every_job_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("caiso.json");
        let input = dir.path().join("load.csv");
        std::fs::write(&config, CONFIG).unwrap();
        std::fs::write(&input, "Date,HR,PGE,TOTAL\n2024-07-01,1,100,100\n").unwrap();

        let manifest = write_manifest(
            dir.path(),
            serde_json::json!([
                { "config": config, "inputs": [input], "outdir": dir.path().join("out") }
            ]),
        );

        assert!(run_batch(&manifest, 2).await.is_ok());
        assert!(dir.path().join("out").join("partner_health.json").exists());
    }

    #[tokio::test]
    async fn test_run_batch_fails_when_a_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("caiso.json");
        let input = dir.path().join("load.csv");
        std::fs::write(&config, CONFIG).unwrap();
        std::fs::write(&input, "Date,HR,PGE,TOTAL\n2024-07-01,1,100,100\n").unwrap();

        let manifest = write_manifest(
            dir.path(),
            serde_json::json!([
                { "config": config, "inputs": [input], "outdir": dir.path().join("ok") },
                { "config": dir.path().join("missing.json"), "inputs": [input], "outdir": dir.path().join("bad") }
            ]),
        );

        let err = run_batch(&manifest, 2).await.unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 batch jobs failed");
        // the failing job does not stop the other
        assert!(dir.path().join("ok").join("partner_health.json").exists());
    }
}
