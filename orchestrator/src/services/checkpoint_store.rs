//! File-backed checkpoint store
//!
//! Checkpoints live in `checkpoints/checkpoint-{iteration:06}.bin`. Each is
//! written to a temporary file, synced and renamed into place, so a crash
//! mid-write never leaves a truncated checkpoint under a valid name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shared::run_debug;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{Checkpoint, CheckpointStore};

const CHECKPOINT_DIR: &str = "checkpoints";
const PREFIX: &str = "checkpoint-";
const SUFFIX: &str = ".bin";

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store checkpoints under `base_dir/checkpoints`
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: base_dir.as_ref().join(CHECKPOINT_DIR),
        }
    }

    pub fn path_for(&self, iteration: u32) -> PathBuf {
        self.dir.join(format!("{PREFIX}{iteration:06}{SUFFIX}"))
    }

    fn parse_iteration(name: &str) -> Option<u32> {
        name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?.parse().ok()
    }

    async fn saved_iterations(&self) -> OrchestratorResult<Vec<u32>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OrchestratorError::storage("list", &self.dir, e)),
        };

        let mut iterations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrchestratorError::storage("list", &self.dir, e))?
        {
            if let Some(iteration) = entry.file_name().to_str().and_then(Self::parse_iteration) {
                iterations.push(iteration);
            }
        }
        iterations.sort_unstable();
        Ok(iterations)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| OrchestratorError::storage("create directory", &self.dir, e))?;

        let bytes = checkpoint.to_bytes()?;
        let path = self.path_for(checkpoint.iteration);
        let tmp = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| OrchestratorError::storage("create", &tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| OrchestratorError::storage("write", &tmp, e))?;
        file.sync_all().await.map_err(|e| OrchestratorError::storage("sync", &tmp, e))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| OrchestratorError::storage("rename", &path, e))?;

        run_debug!(
            checkpoint.run_id,
            "Checkpoint for iteration {} written to {} ({} bytes)",
            checkpoint.iteration,
            path.display(),
            bytes.len()
        );
        Ok(())
    }

    async fn load(&self, iteration: u32) -> OrchestratorResult<Checkpoint> {
        let path = self.path_for(iteration);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrchestratorError::checkpoint(format!("no checkpoint for iteration {iteration}")))
            }
            Err(e) => return Err(OrchestratorError::storage("read", &path, e)),
        };
        let checkpoint = Checkpoint::from_bytes(&bytes)?;
        if checkpoint.iteration != iteration {
            return Err(OrchestratorError::checkpoint(format!(
                "{} holds iteration {}",
                path.display(),
                checkpoint.iteration
            )));
        }
        Ok(checkpoint)
    }

    async fn latest(&self) -> OrchestratorResult<Option<u32>> {
        Ok(self.saved_iterations().await?.last().copied())
    }

    async fn clear(&self) -> OrchestratorResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrchestratorError::storage("remove", &self.dir, e)),
        }
    }
}
