//! Built-in scoring functions and their construction from configuration

pub mod column;
pub mod motif;
pub mod network;
pub mod row;

use std::path::Path;

pub use column::ColumnScoring;
pub use motif::MotifScoring;
pub use network::{Network, NetworkScoring};
pub use row::RowScoring;

use super::traits::ScoringFunction;
use super::types::{ModuleConfig, ScoringKind};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::motif_runner::ExternalMotifSearcher;

/// Instantiate the function a module configuration describes
///
/// Network files are read here, so a missing or malformed file fails the
/// run before the first iteration.
pub fn build_function(config: &ModuleConfig) -> OrchestratorResult<Box<dyn ScoringFunction>> {
    let source = || {
        config
            .source
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OrchestratorError::config_keys([format!("{}.source", config.name)]))
    };

    Ok(match config.kind {
        ScoringKind::Row => Box::new(RowScoring::new(&config.name)),
        ScoringKind::Column => Box::new(ColumnScoring::new(&config.name)),
        ScoringKind::Network => {
            let network = Network::load(Path::new(source()?))?;
            Box::new(NetworkScoring::new(&config.name, network))
        }
        ScoringKind::Motif => {
            let searcher = ExternalMotifSearcher::from_command_line(source()?)?;
            Box::new(MotifScoring::new(&config.name, Box::new(searcher)))
        }
    })
}
