//! Job state persistence and the per-job serialization lock that gives every tool call within
//! a job a consistent view of `job.json` (I4). The source deployment uses a single process-wide
//! `threading.RLock()`; since jobs here run one-per-worker-process there is no cross-process
//! contention, but a per-job `Mutex` still protects against the controller and an in-process
//! caller (e.g. a status-polling thread) reading mid-write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use review_core::JobId;

use crate::atomic::{read_json, write_json_atomic};
use crate::error::StoreError;
use crate::paths::{job_dir, jobs_root, state_path};

fn lock_registry() -> &'static Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn job_lock(job_dir: &Path) -> Arc<Mutex<()>> {
    let mut registry = lock_registry().lock().unwrap_or_else(|e| e.into_inner());
    registry
        .entry(job_dir.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

pub struct JobStore {
    data_dir: PathBuf,
}

impl JobStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        JobStore { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        let dir = job_dir(&self.data_dir, job_id);
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    pub fn ensure_jobs_root(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(jobs_root(&self.data_dir))?;
        Ok(())
    }

    pub fn save(&self, record: &review_core::JobRecord) -> Result<(), StoreError> {
        let dir = self.job_dir(record.id);
        let lock = job_lock(&dir);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        write_json_atomic(&state_path(&dir), record)
    }

    pub fn load(&self, job_id: JobId) -> Result<Option<review_core::JobRecord>, StoreError> {
        let dir = self.job_dir(job_id);
        let lock = job_lock(&dir);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = state_path(&dir);
        if !path.exists() {
            return Ok(None);
        }
        let mut record: review_core::JobRecord = read_json(&path)?;
        record.usage.paper_search.restore_signatures(
            record.usage.paper_search.signatures().clone(),
        );
        Ok(Some(record))
    }

    /// Load-mutate-save under the job's lock, so two in-process writers (e.g. the controller
    /// and a tool handler) never interleave (I4).
    pub fn mutate<F>(&self, job_id: JobId, f: F) -> Result<review_core::JobRecord, StoreError>
    where
        F: FnOnce(&mut review_core::JobRecord),
    {
        let dir = self.job_dir(job_id);
        let lock = job_lock(&dir);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = state_path(&dir);
        let mut record: review_core::JobRecord = read_json(&path)?;
        f(&mut record);
        write_json_atomic(&path, &record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_core::JobRecord;

    fn temp_store() -> (JobStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("review_store_state_test_{}", JobId::new()));
        (JobStore::new(dir.clone()), dir)
    }

    #[test]
    fn save_then_load_round_trips() {
        let (store, dir) = temp_store();
        let job = JobRecord::new(JobId::new(), "Title".to_string(), "p.pdf".to_string(), "now");
        store.save(&job).unwrap();
        let loaded = store.load(job.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Title");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mutate_persists_changes() {
        let (store, dir) = temp_store();
        let job = JobRecord::new(JobId::new(), "Title".to_string(), "p.pdf".to_string(), "now");
        store.save(&job).unwrap();

        store
            .mutate(job.id, |record| {
                record.message = "updated".to_string();
            })
            .unwrap();

        let loaded = store.load(job.id).unwrap().unwrap();
        assert_eq!(loaded.message, "updated");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_job_loads_as_none() {
        let (store, dir) = temp_store();
        let _ = std::fs::create_dir_all(&dir);
        assert!(store.load(JobId::new()).unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
