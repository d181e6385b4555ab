//! Wide-to-long normalization of zone-per-column load tables.
//!
//! Hour-ending (HE) hour `h` is the interval ending at local hour `h`, so the
//! local timestamp is `date + h` hours. Hour-number (HR) hour `h` is the
//! interval beginning at `h - 1`, so the timestamp is `date + (h - 1)` hours.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::num::ParseFloatError;
use tracing::{debug, info, warn};

use crate::config::{DuplicateScope, FeedConfig, HourConvention};
use crate::dst::{DayInfoMap, build_day_info, localize_with_dst_scoped};
use crate::error::{RaterError, Result};
use crate::ingest::RawTable;
use crate::types::{CANONICAL_TOTAL_ZONE, Flag, Issue, Observation};

const CHECK: &str = "normalize";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m/%d/%y", "%d-%b-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Output of [`normalize_feed`].
#[derive(Debug, Clone)]
pub struct Normalized {
    pub observations: Vec<Observation>,
    pub issues: Vec<Issue>,
    pub day_info: DayInfoMap,
}

/// Parses a date cell, discarding any time-of-day part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
}

pub fn parse_hour(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|h| h.is_finite())
}

/// Parses a load cell. Blank cells are `Ok(None)`; anything else that is not
/// a number is an error so the caller can report it.
fn parse_value(raw: &str) -> std::result::Result<Option<f64>, ParseFloatError> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned.parse::<f64>().map(|v| Some(v).filter(|v| !v.is_nan()))
}

/// Naive local timestamp for a date and hour label under `convention`.
pub fn naive_timestamp(
    date: NaiveDate,
    hour: f64,
    convention: HourConvention,
) -> Option<NaiveDateTime> {
    let offset = convention.offset_hours(hour);
    if offset.abs() > 1.0e6 {
        return None;
    }
    let seconds = (offset * 3600.0).round() as i64;
    date.and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

fn resolve_hour_column(
    table: &RawTable,
    cfg: &FeedConfig,
    issues: &mut Vec<Issue>,
) -> Option<(usize, HourConvention)> {
    if let Some(idx) = table.column_index(&cfg.hour_col) {
        return Some((idx, cfg.hour_convention));
    }

    for (label, convention) in [
        ("HE", HourConvention::HourEnding),
        ("HR", HourConvention::HourNumber),
    ] {
        if let Some(found) = table.find_column_ci(label) {
            warn!(configured = %cfg.hour_col, detected = found, "Hour column auto-detected");
            issues.push(Issue::medium(
                CHECK,
                format!("Configured hour column missing; auto-detected {label} column."),
                format!("Confirm whether the {} file uses HE or HR semantics.", cfg.iso),
            ));
            return table.column_index(found).map(|idx| (idx, convention));
        }
    }

    None
}

fn resolve_total_column(
    table: &RawTable,
    cfg: &FeedConfig,
    issues: &mut Vec<Issue>,
) -> Option<usize> {
    if let Some(idx) = table.column_index(&cfg.total_zone) {
        return Some(idx);
    }

    let candidates = [
        format!("{} total", cfg.iso),
        cfg.iso.clone(),
        "total".to_string(),
    ];
    for candidate in &candidates {
        if let Some(found) = table.find_column_ci(candidate) {
            warn!(configured = %cfg.total_zone, detected = found, "Total column auto-detected");
            issues.push(Issue::medium(
                CHECK,
                format!(
                    "Configured total zone '{}' missing; auto-mapped '{}' as the total.",
                    cfg.total_zone, found
                ),
                format!("Verify which column carries the {} system total.", cfg.iso),
            ));
            return table.column_index(found);
        }
    }

    warn!(configured = %cfg.total_zone, "Total column not found");
    issues.push(Issue::high(
        CHECK,
        format!("Total zone column '{}' not found in source.", cfg.total_zone),
        "Ensure the total zone column is included in the source feed.",
    ));
    None
}

fn resolve_note_column(table: &RawTable, cfg: &FeedConfig) -> Option<usize> {
    if let Some(idx) = cfg.note_col.as_deref().and_then(|c| table.column_index(c)) {
        return Some(idx);
    }
    table.columns.iter().position(|c| {
        let lower = c.to_lowercase();
        lower.starts_with("note") || lower.starts_with("unnamed")
    })
}

struct ParsedRow {
    row: usize,
    date: NaiveDate,
    hour: f64,
}

/// Reshapes the raw wide table into canonical observations.
///
/// Unresolvable required columns (date, hour, component zones) and empty
/// tables are hard failures. Everything else degrades into issues and flags.
#[tracing::instrument(skip_all, fields(iso = %cfg.iso, rows = table.rows.len()))]
pub fn normalize_feed(table: &RawTable, cfg: &FeedConfig) -> Result<Normalized> {
    if table.rows.is_empty() {
        return Err(RaterError::EmptyTable);
    }
    let tz = cfg.tz()?;
    let mut issues = Vec::new();

    let hour = resolve_hour_column(table, cfg, &mut issues);
    let total_idx = resolve_total_column(table, cfg, &mut issues);
    let date_idx = table.column_index(&cfg.date_col);

    let mut missing = Vec::new();
    if date_idx.is_none() {
        missing.push(cfg.date_col.clone());
    }
    if hour.is_none() {
        missing.push(cfg.hour_col.clone());
    }
    let mut zone_columns: Vec<(String, usize)> = Vec::new();
    for zone in &cfg.zones {
        if *zone == cfg.total_zone {
            if let Some(idx) = total_idx {
                zone_columns.push((CANONICAL_TOTAL_ZONE.to_string(), idx));
            }
            continue;
        }
        match table.column_index(zone) {
            Some(idx) => zone_columns.push((zone.clone(), idx)),
            None => missing.push(zone.clone()),
        }
    }

    let (Some(date_idx), Some((hour_idx, convention)), true) = (date_idx, hour, missing.is_empty())
    else {
        return Err(RaterError::MissingColumns(missing));
    };
    let hour_col = &table.columns[hour_idx];
    let note_idx = resolve_note_column(table, cfg);

    let mut invalid_date = 0usize;
    let mut invalid_hour = 0usize;
    let mut parsed = Vec::with_capacity(table.rows.len());
    for row in 0..table.rows.len() {
        let date = parse_date(table.cell(row, date_idx));
        let hour = parse_hour(table.cell(row, hour_idx));
        if date.is_none() {
            invalid_date += 1;
        }
        if hour.is_none() {
            invalid_hour += 1;
        }
        if let (Some(date), Some(hour)) = (date, hour) {
            parsed.push(ParsedRow { row, date, hour });
        }
    }

    if invalid_date > 0 {
        issues.push(Issue::high(
            CHECK,
            format!("{invalid_date} rows have unparseable dates in '{}'.", cfg.date_col),
            "Verify date format or normalize upstream before ingestion.",
        ));
    }
    if invalid_hour > 0 {
        issues.push(Issue::high(
            CHECK,
            format!("{invalid_hour} rows have invalid hours in '{hour_col}'."),
            "Ensure hour column is numeric and within 1-24.",
        ));
    }
    debug!(
        retained = parsed.len(),
        dropped = table.rows.len() - parsed.len(),
        "Rows parsed"
    );

    let day_info = build_day_info(parsed.iter().map(|p| p.date), &tz);

    let capacity = parsed.len() * zone_columns.len();
    let mut naive_ts = Vec::with_capacity(capacity);
    let mut scopes = Vec::with_capacity(capacity);
    let mut cells = Vec::with_capacity(capacity);
    for p in &parsed {
        let ts = naive_timestamp(p.date, p.hour, convention);
        for (zone, col) in &zone_columns {
            naive_ts.push(ts);
            scopes.push(zone.clone());
            cells.push((p, *col));
        }
    }

    let scope_keys = match cfg.duplicate_scope {
        DuplicateScope::Feed => None,
        DuplicateScope::Zone => Some(scopes.as_slice()),
    };
    let localized = localize_with_dst_scoped(&naive_ts, scope_keys, &tz, &day_info);

    let mut non_numeric = 0usize;
    let observations: Vec<Observation> = localized
        .into_iter()
        .zip(scopes.iter())
        .zip(cells)
        .map(|((loc, zone), (p, col))| {
            let mut flags = loc.flags;
            if !(1.0..=24.0).contains(&p.hour) {
                flags.insert(Flag::InvalidHour);
            }
            if note_idx.is_some_and(|n| !table.cell(p.row, n).trim().is_empty()) {
                flags.insert(Flag::SourceNote);
            }
            let value = parse_value(table.cell(p.row, col)).unwrap_or_else(|_| {
                non_numeric += 1;
                flags.insert(Flag::NonNumericValue);
                None
            });
            Observation {
                timestamp_local: loc.local,
                timestamp_utc: loc.utc,
                iso: cfg.iso.clone(),
                zone: zone.clone(),
                value,
                source_file: table.rows[p.row].source_file.clone(),
                flags,
            }
        })
        .collect();

    if non_numeric > 0 {
        issues.push(Issue::medium(
            CHECK,
            format!("{non_numeric} values in zone columns could not be coerced to numeric."),
            "Ensure missing values are empty/null and not strings like 'N/A'.",
        ));
    }

    let unresolved = observations
        .iter()
        .filter(|o| o.timestamp_local.is_none())
        .count();
    info!(
        observations = observations.len(),
        unresolved,
        days = day_info.len(),
        "Feed normalized"
    );

    Ok(Normalized {
        observations,
        issues,
        day_info,
    })
}
