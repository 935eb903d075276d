//! External motif search tool runner
//!
//! The tool is started once per cluster. It receives
//! `{"cluster": 3, "rows": ["g1", "g7"]}` on stdin and must print
//! `{"pvalues": {"g1": 0.001, "g7": 0.2}}` on stdout, exiting with status 0.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use shared::ClusterId;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::scoring::traits::{MotifSearcher, ScoringError};

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    cluster: u32,
    rows: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    pvalues: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct ExternalMotifSearcher {
    program: String,
    args: Vec<String>,
}

impl ExternalMotifSearcher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace separated command line into program and arguments
    pub fn from_command_line(command: &str) -> OrchestratorResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OrchestratorError::config_keys(["motif.source"]))?;
        Ok(Self::new(program, parts.collect()))
    }

    fn external_error(&self, message: impl Into<String>) -> ScoringError {
        ScoringError::External {
            command: self.program.clone(),
            message: message.into(),
        }
    }
}

impl MotifSearcher for ExternalMotifSearcher {
    fn search(&self, cluster: ClusterId, rows: &[String]) -> Result<BTreeMap<String, f64>, ScoringError> {
        let request = serde_json::to_vec(&SearchRequest {
            cluster: cluster.get(),
            rows,
        })
        .map_err(|e| self.external_error(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.external_error(format!("spawn: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request)
                .map_err(|e| self.external_error(format!("stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| self.external_error(format!("wait: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.external_error(format!("exited with {}: {}", output.status, stderr.trim())));
        }

        let response: SearchResponse =
            serde_json::from_slice(&output.stdout).map_err(|e| self.external_error(format!("bad output: {e}")))?;
        Ok(response.pvalues)
    }
}
