//! Scoring-related types and data structures
//!
//! Schedules decide on which iterations a module recomputes, scaling
//! functions decide how much its scores weigh on a given iteration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The closed set of scoring module kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringKind {
    /// Intrinsic fit of a row to a cluster's submatrix
    Row,
    /// Fit of a column to a cluster's rows
    Column,
    /// Graph neighbourhood of a row inside a cluster
    Network,
    /// External sequence motif search per cluster
    Motif,
}

impl ScoringKind {
    /// Which side of the matrix this kind scores
    pub fn side(self) -> ScoreSide {
        match self {
            ScoringKind::Column => ScoreSide::Columns,
            ScoringKind::Row | ScoringKind::Network | ScoringKind::Motif => ScoreSide::Rows,
        }
    }
}

impl fmt::Display for ScoringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringKind::Row => write!(f, "row"),
            ScoringKind::Column => write!(f, "column"),
            ScoringKind::Network => write!(f, "network"),
            ScoringKind::Motif => write!(f, "motif"),
        }
    }
}

/// Matrix axis a score matrix refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSide {
    Rows,
    Columns,
}

/// Set of iterations on which a module is recomputed
///
/// Written as `start,interval` segments joined by `:`; a bare `start` matches
/// exactly that iteration. `1,1` (or `all`) means every iteration, `1,5:100,1`
/// means every fifth iteration and every iteration from 100 on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    segments: Vec<ScheduleSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduleSegment {
    start: u32,
    /// Zero means the segment matches only `start`
    interval: u32,
}

impl Schedule {
    pub fn always() -> Self {
        Self {
            segments: vec![ScheduleSegment { start: 1, interval: 1 }],
        }
    }

    pub fn every(start: u32, interval: u32) -> Self {
        Self {
            segments: vec![ScheduleSegment { start, interval }],
        }
    }

    pub fn contains(&self, iteration: u32) -> bool {
        self.segments.iter().any(|seg| {
            if iteration < seg.start {
                false
            } else if seg.interval == 0 {
                iteration == seg.start
            } else {
                (iteration - seg.start) % seg.interval == 0
            }
        })
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|seg| {
                if seg.interval == 0 {
                    seg.start.to_string()
                } else {
                    format!("{},{}", seg.start, seg.interval)
                }
            })
            .collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::always());
        }

        let mut segments = Vec::new();
        for part in s.split(':') {
            let numbers: Vec<&str> = part.split(',').map(str::trim).collect();
            let parse = |v: &str| v.parse::<u32>().map_err(|_| format!("invalid schedule segment '{part}'"));
            let segment = match numbers.as_slice() {
                [start] => ScheduleSegment {
                    start: parse(start)?,
                    interval: 0,
                },
                [start, interval] => ScheduleSegment {
                    start: parse(start)?,
                    interval: parse(interval)?,
                },
                _ => return Err(format!("invalid schedule segment '{part}'")),
            };
            if segment.start == 0 {
                return Err(format!("schedule segment '{part}' starts before iteration 1"));
            }
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err("empty schedule".to_string());
        }
        Ok(Self { segments })
    }
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Weight of a module as a function of the iteration number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    Constant(f64),
    /// Ramps linearly from `from` to `to` over the first
    /// `ramp_fraction * num_iterations` iterations, then holds `to`
    Linear { from: f64, to: f64, ramp_fraction: f64 },
}

impl Scaling {
    pub fn weight(&self, iteration: u32, num_iterations: u32) -> f64 {
        match *self {
            Scaling::Constant(w) => w,
            Scaling::Linear { from, to, ramp_fraction } => {
                let ramp_len = (num_iterations as f64 * ramp_fraction).round().max(1.0);
                let progress = (iteration as f64 / ramp_len).min(1.0);
                from + (to - from) * progress
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            Scaling::Constant(w) => w.is_finite() && w >= 0.0,
            Scaling::Linear { from, to, ramp_fraction } => {
                from.is_finite() && to.is_finite() && from >= 0.0 && to >= 0.0 && ramp_fraction > 0.0
            }
        }
    }
}

impl Default for Scaling {
    fn default() -> Self {
        Scaling::Constant(1.0)
    }
}

/// Configuration of one scoring module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub kind: ScoringKind,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub scaling: Scaling,
    /// Network edge file for `network`, search command for `motif`
    #[serde(default)]
    pub source: Option<String>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, kind: ScoringKind) -> Self {
        Self {
            name: name.into(),
            kind,
            schedule: Schedule::always(),
            scaling: Scaling::default(),
            source: None,
        }
    }
}

/// A scoring module could not compute on some iteration
///
/// Recorded in the iteration stats; the module's previous (or a neutral)
/// score matrix was used instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringDegradation {
    pub iteration: u32,
    pub module: String,
    pub reason: String,
}
