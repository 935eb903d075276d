//! Scoring modules and their combination
//!
//! Functions compute raw scores, [`ScheduledModule`] adds schedule, weight and
//! caching, and a [`ScoringCombiner`] per side merges the modules into the
//! matrix the membership update consumes.

pub mod combiner;
pub mod functions;
pub mod module;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use combiner::ScoringCombiner;
pub use module::ScheduledModule;
pub use traits::{MotifSearcher, ScoringError, ScoringFunction, ScoringInput};
pub use types::{ModuleConfig, Scaling, Schedule, ScoreSide, ScoringDegradation, ScoringKind};
