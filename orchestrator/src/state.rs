//! Run phase state machine
//!
//! Pure state tracking for the orchestrator's lifecycle that can be tested
//! independently of storage and scoring.

use serde::Serialize;
use std::fmt;

use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Running,
    Checkpointing,
    PostAdjusting,
    Finished,
    Failed,
}

impl RunPhase {
    fn can_move_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Running, Checkpointing)
                | (Checkpointing, Running)
                | (Running, PostAdjusting)
                | (Running, Finished)
                | (PostAdjusting, Finished)
        ) || (next == Failed && !self.is_terminal())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Finished | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::NotStarted => "not started",
            RunPhase::Running => "running",
            RunPhase::Checkpointing => "checkpointing",
            RunPhase::PostAdjusting => "post-adjusting",
            RunPhase::Finished => "finished",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current phase plus the iteration being worked on
#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
    current_iteration: Option<u32>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::NotStarted,
            current_iteration: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn current_iteration(&self) -> Option<u32> {
        self.current_iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.current_iteration = Some(iteration);
    }

    pub fn transition(&mut self, next: RunPhase) -> OrchestratorResult<()> {
        if !self.phase.can_move_to(next) {
            return Err(OrchestratorError::state(format!("cannot move from {} to {}", self.phase, next)));
        }
        self.phase = next;
        Ok(())
    }

    /// Mark the run failed; a run that already ended keeps its phase
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Failed;
        }
    }
}
