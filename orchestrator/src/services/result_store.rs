//! File-backed persistence store
//!
//! One directory per run:
//! - `run_info.json`: run metadata, replaced atomically on every update
//! - `cluster_results.jsonl`: one [`ClusterResult`] per line
//! - `iteration_stats.jsonl`: one [`IterationStats`] per line
//!
//! Appends are flushed and synced before the call returns.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core::iteration::{ClusterResult, IterationStats};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{PersistenceStore, RunMetadata, RunMetadataUpdate};

const RUN_INFO_FILE: &str = "run_info.json";
const RESULTS_FILE: &str = "cluster_results.jsonl";
const STATS_FILE: &str = "iteration_stats.jsonl";

pub struct FileResultStore {
    base_dir: PathBuf,
    /// Serialises read-modify-write cycles on the metadata file
    metadata_lock: Mutex<()>,
}

impl FileResultStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            metadata_lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.base_dir.join(file)
    }

    async fn append_lines<T: Serialize>(&self, file: &str, records: &[T]) -> OrchestratorResult<()> {
        let path = self.path(file);
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let mut handle = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| OrchestratorError::storage("open", &path, e))?;
        handle
            .write_all(buffer.as_bytes())
            .await
            .map_err(|e| OrchestratorError::storage("append", &path, e))?;
        handle.flush().await.map_err(|e| OrchestratorError::storage("flush", &path, e))?;
        handle.sync_all().await.map_err(|e| OrchestratorError::storage("sync", &path, e))?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(&self, file: &str) -> OrchestratorResult<Vec<T>> {
        let path = self.path(file);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OrchestratorError::storage("read", &path, e)),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    /// Replace `file` with `contents` via a synced temporary file and a rename
    async fn replace_file(&self, file: &str, contents: &[u8]) -> OrchestratorResult<()> {
        let path = self.path(file);
        let tmp = self.path(&format!("{file}.tmp"));

        let mut handle = fs::File::create(&tmp)
            .await
            .map_err(|e| OrchestratorError::storage("create", &tmp, e))?;
        handle
            .write_all(contents)
            .await
            .map_err(|e| OrchestratorError::storage("write", &tmp, e))?;
        handle.sync_all().await.map_err(|e| OrchestratorError::storage("sync", &tmp, e))?;
        drop(handle);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| OrchestratorError::storage("rename", &path, e))
    }

    async fn rewrite_lines<T: Serialize>(&self, file: &str, records: &[T]) -> OrchestratorResult<()> {
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }
        self.replace_file(file, buffer.as_bytes()).await
    }

    async fn load_metadata(&self) -> OrchestratorResult<RunMetadata> {
        let path = self.path(RUN_INFO_FILE);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RunMetadata::default()),
            Err(e) => Err(OrchestratorError::storage("read", &path, e)),
        }
    }

    async fn store_metadata(&self, metadata: &RunMetadata) -> OrchestratorResult<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        self.replace_file(RUN_INFO_FILE, json.as_bytes()).await
    }
}

#[async_trait]
impl PersistenceStore for FileResultStore {
    async fn create_schema(&self) -> OrchestratorResult<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| OrchestratorError::storage("create directory", &self.base_dir, e))?;

        let _guard = self.metadata_lock.lock().await;
        for file in [RESULTS_FILE, STATS_FILE] {
            self.replace_file(file, b"").await?;
        }
        self.store_metadata(&RunMetadata::default()).await
    }

    async fn write_results(&self, _iteration: u32, results: &[ClusterResult]) -> OrchestratorResult<()> {
        self.append_lines(RESULTS_FILE, results).await
    }

    async fn write_stats(&self, stats: &IterationStats) -> OrchestratorResult<()> {
        self.append_lines(STATS_FILE, std::slice::from_ref(stats)).await
    }

    async fn write_run_metadata(&self, update: RunMetadataUpdate) -> OrchestratorResult<()> {
        let _guard = self.metadata_lock.lock().await;
        let mut metadata = self.load_metadata().await?;
        metadata.apply(update, Utc::now());
        self.store_metadata(&metadata).await
    }

    async fn read_run_metadata(&self) -> OrchestratorResult<RunMetadata> {
        self.load_metadata().await
    }

    async fn read_stats(&self) -> OrchestratorResult<Vec<IterationStats>> {
        self.read_lines(STATS_FILE).await
    }

    async fn read_results(&self, iteration: Option<u32>) -> OrchestratorResult<Vec<ClusterResult>> {
        let all: Vec<ClusterResult> = self.read_lines(RESULTS_FILE).await?;
        Ok(match iteration {
            Some(it) => all.into_iter().filter(|r| r.iteration == it).collect(),
            None => all,
        })
    }

    async fn truncate_after(&self, iteration: u32) -> OrchestratorResult<()> {
        let results: Vec<ClusterResult> = self.read_lines(RESULTS_FILE).await?;
        let kept: Vec<&ClusterResult> = results.iter().filter(|r| r.iteration <= iteration).collect();
        self.rewrite_lines(RESULTS_FILE, &kept).await?;

        let stats: Vec<IterationStats> = self.read_lines(STATS_FILE).await?;
        let kept: Vec<&IterationStats> = stats.iter().filter(|s| s.iteration <= iteration).collect();
        self.rewrite_lines(STATS_FILE, &kept).await?;

        let _guard = self.metadata_lock.lock().await;
        let mut metadata = self.load_metadata().await?;
        metadata.last_iteration = metadata.last_iteration.map(|last| last.min(iteration));
        self.store_metadata(&metadata).await
    }
}
