//! Hourly load feed normalization, DST-aware localization, quality checks
//! and trust scoring for grid operator zone-per-column load tables.

pub mod checks;
pub mod config;
pub mod dst;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod report;
pub mod runner;
pub mod scoring;
pub mod types;

pub use config::FeedConfig;
pub use error::{RaterError, Result};
pub use runner::{ValidationOutcome, validate};
