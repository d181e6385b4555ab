//! Data-quality checks over canonical observations.
//!
//! Each check is a pure function over the same read-only observation slice
//! and returns its own issues plus a metrics record. None of them depends on
//! another's output.

pub mod completeness;
pub mod consistency;
pub mod sanity;
pub mod utility;

pub use completeness::check_completeness;
pub use consistency::check_consistency;
pub use sanity::check_value_sanity;

use crate::types::Observation;

/// Observations whose local timestamp was resolved.
pub(crate) fn resolved(observations: &[Observation]) -> impl Iterator<Item = &Observation> {
    observations.iter().filter(|o| o.timestamp_local.is_some())
}
