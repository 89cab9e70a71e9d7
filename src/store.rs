//! Job persistence.
//!
//! The orchestrator writes every status transition through a [`JobStore`].
//! Writes for a given job come from a single task, so stores need no
//! cross-job coordination beyond keeping their map consistent.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::state_machine::Job;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid job id: {0}")]
    InvalidId(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read/write access to job records keyed by id.
pub trait JobStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Insert or replace the record with `job.id`.
    fn put(&self, job: &Job) -> Result<(), StoreError>;

    /// Every stored job, oldest first.
    fn list(&self) -> Result<Vec<Job>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(id).cloned())
    }

    fn put(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        Ok(all)
    }
}

/// One pretty-printed JSON file per job under a directory.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl JobStore for FileJobStore {
    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        // An id that cannot name a file cannot name a stored job either.
        let Ok(path) = self.path_for(id) else {
            return Ok(None);
        };
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.path_for(&job.id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(job)?)?;
        // Rename is atomic on the same filesystem; readers never see a torn file.
        fs::rename(&tmp, &path)?;
        debug!(job_id = %job.id, status = %job.status, "job persisted");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            all.push(serde_json::from_str::<Job>(&contents)?);
        }
        all.sort_by_key(|j| j.created_at);
        Ok(all)
    }
}
