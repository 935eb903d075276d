//! Run status inference
//!
//! A run does not report its own death. Whether it is still alive is inferred
//! from the metadata it leaves behind: a run with a start time, no finish
//! time and no progress for longer than `stale_after` is considered stalled.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::traits::RunMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    NotStarted,
    Running { last_iteration: Option<u32> },
    Finished { last_iteration: Option<u32> },
    Stalled { last_iteration: Option<u32>, idle_seconds: i64 },
}

impl RunStatus {
    pub fn infer(metadata: &RunMetadata, now: DateTime<Utc>, stale_after: Duration) -> Self {
        let last_iteration = metadata.last_iteration;
        if metadata.start_time.is_none() {
            return RunStatus::NotStarted;
        }
        if metadata.finish_time.is_some() {
            return RunStatus::Finished { last_iteration };
        }

        let last_seen = metadata.last_progress.or(metadata.start_time).unwrap_or(now);
        let idle = now.signed_duration_since(last_seen);
        if idle > stale_after {
            RunStatus::Stalled {
                last_iteration,
                idle_seconds: idle.num_seconds(),
            }
        } else {
            RunStatus::Running { last_iteration }
        }
    }

    /// Resuming only makes sense for stalled runs
    pub fn is_resumable(&self) -> bool {
        matches!(self, RunStatus::Stalled { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iteration = |it: &Option<u32>| it.map_or_else(|| "none".to_string(), |i| i.to_string());
        match self {
            RunStatus::NotStarted => write!(f, "not started"),
            RunStatus::Running { last_iteration } => {
                write!(f, "running (last completed iteration {})", iteration(last_iteration))
            }
            RunStatus::Finished { last_iteration } => {
                write!(f, "finished (last iteration {})", iteration(last_iteration))
            }
            RunStatus::Stalled {
                last_iteration,
                idle_seconds,
            } => write!(
                f,
                "stalled: no progress for {idle_seconds}s (last completed iteration {})",
                iteration(last_iteration)
            ),
        }
    }
}
