//! Core types used throughout the cluster orchestration workspace

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{SharedError, SharedResult};

pub mod matrix;

pub use matrix::Matrix;

/// Unique identifier for a single optimisation run
///
/// Carried through every log line and persisted with run metadata and
/// checkpoints so that a resumed run keeps its identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> SharedResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidUuid { input: s.to_string() })
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        let full = self.0.to_string();
        write!(f, "run_{}", &full[..8])
    }
}

/// 1-based cluster identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(u32);

impl ClusterId {
    /// Create a cluster id, rejecting zero
    pub fn new(value: u32) -> SharedResult<Self> {
        if value == 0 {
            return Err(SharedError::InvalidClusterId { value });
        }
        Ok(Self(value))
    }

    /// Cluster id for a zero-based cluster index
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-based index into per-cluster tables
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Iterate over all cluster ids `1..=num_clusters`
    pub fn all(num_clusters: usize) -> impl Iterator<Item = ClusterId> {
        (0..num_clusters).map(ClusterId::from_index)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
