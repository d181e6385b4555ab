//! Feed configuration: column layout, timezone, check thresholds and scoring
//! penalties.
//!
//! Stored as a JSON object on disk:
//! ```json
//! {
//!   "iso": "CAISO",
//!   "timezone": "America/Los_Angeles",
//!   "date_col": "Date",
//!   "hour_col": "HE",
//!   "hour_convention": "HE",
//!   "zones": ["PGE", "SCE", "SDGE", "CAISO Total"],
//!   "total_zone": "CAISO Total",
//!   "thresholds": { "consistency_abs": 250.0 },
//!   "penalties": { "dst_day": 2.0 }
//! }
//! ```
//! Omitted `thresholds` and `penalties` keys fall back to their defaults.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RaterError, Result};

/// Which clock hour an "hour h" label denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HourConvention {
    /// Hour h is the interval ending at local hour h.
    #[serde(rename = "HE", alias = "hour-ending", alias = "he")]
    HourEnding,
    /// Hour h is the interval beginning at local hour h-1.
    #[serde(rename = "HR", alias = "hour-number", alias = "hr")]
    HourNumber,
}

impl HourConvention {
    /// Offset in hours from local midnight for a given hour label.
    pub fn offset_hours(self, hour: f64) -> f64 {
        match self {
            HourConvention::HourEnding => hour,
            HourConvention::HourNumber => hour - 1.0,
        }
    }
}

/// How rows are grouped when looking for repeated fall-back hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateScope {
    /// Duplicates are counted across the whole long-format feed, all zones
    /// together.
    #[default]
    Feed,
    /// Duplicates are counted within each zone.
    Zone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub consistency_abs: f64,
    pub consistency_pct: f64,
    pub spike_abs: f64,
    pub spike_pct: f64,
    pub flatline_window_hours: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            consistency_abs: 250.0,
            consistency_pct: 0.01,
            spike_abs: 2500.0,
            spike_pct: 0.08,
            flatline_window_hours: 6,
        }
    }
}

/// Points subtracted from the trust score per counted defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Penalties {
    pub missing_hour: f64,
    pub missing_zone: f64,
    pub dst_day: f64,
    pub consistency_violation: f64,
    pub anomaly: f64,
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            missing_hour: 0.75,
            missing_zone: 0.5,
            dst_day: 2.0,
            consistency_violation: 1.5,
            anomaly: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub iso: String,
    pub timezone: String,
    pub date_col: String,
    pub hour_col: String,
    pub hour_convention: HourConvention,
    pub zones: Vec<String>,
    pub total_zone: String,
    #[serde(default)]
    pub note_col: Option<String>,
    #[serde(default)]
    pub duplicate_scope: DuplicateScope,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub penalties: Penalties,
}

impl FeedConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: FeedConfig = serde_json::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(RaterError::Config(
                "zones must include at least one zone".into(),
            ));
        }
        if !self.zones.contains(&self.total_zone) {
            return Err(RaterError::Config(format!(
                "total_zone '{}' must be present in zones",
                self.total_zone
            )));
        }
        if self.thresholds.flatline_window_hours < 2 {
            return Err(RaterError::Config(
                "flatline_window_hours must be at least 2".into(),
            ));
        }
        self.tz()?;
        Ok(())
    }

    /// Resolves the configured IANA timezone name.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| RaterError::UnknownTimezone(self.timezone.clone()))
    }

    /// Zones that carry component load, i.e. everything except the total.
    pub fn component_zones(&self) -> impl Iterator<Item = &str> {
        self.zones
            .iter()
            .filter(move |z| **z != self.total_zone)
            .map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) fn test_config(zones: &[&str], total: &str) -> FeedConfig {
    FeedConfig {
        iso: "CAISO".into(),
        timezone: "America/Los_Angeles".into(),
        date_col: "Date".into(),
        hour_col: "HR".into(),
        hour_convention: HourConvention::HourNumber,
        zones: zones.iter().map(|z| z.to_string()).collect(),
        total_zone: total.into(),
        note_col: None,
        duplicate_scope: DuplicateScope::Feed,
        thresholds: Thresholds::default(),
        penalties: Penalties::default(),
    }
}
