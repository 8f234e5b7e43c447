//! JSON-file backed service.
//!
//! Same server semantics as [`MemoryService`], with the tables persisted to
//! a single JSON file after every accepted mutation. Writes go to a temp file
//! that is then renamed over the original. A mutation whose write fails is
//! undone in memory as well, so the tables never run ahead of the file.

use std::fs::{self, File};
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::fields::EntityKind;
use crate::memory::{MemoryService, ServerState};
use crate::remote::{Envelope, RemoteService, UserData};

#[derive(Debug)]
pub struct JsonFileService {
    inner: MemoryService,
    path: PathBuf,
    writes: Mutex<()>,
}

impl JsonFileService {
    /// Open the data file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_state(&path)?;
        Ok(JsonFileService { inner: MemoryService::with_state(state), path, writes: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current tables to disk.
    pub fn save(&self) -> Result<()> {
        save_state(&self.inner.state(), &self.path)
    }

    /// Run one mutation and write the result; roll the tables back if the
    /// write fails.
    async fn persist(&self, call: impl Future<Output = Result<Envelope<Value>>>) -> Result<Envelope<Value>> {
        let _write = self.writes.lock().await;
        let before = self.inner.state();
        let env = call.await?;
        if env.success {
            if let Err(err) = self.save() {
                warn!("could not write {}, undoing change: {err}", self.path.display());
                self.inner.restore(before);
                return Err(err);
            }
        }
        Ok(env)
    }
}

/// Load server tables from a JSON file; a missing file is an empty dataset.
pub fn load_state(path: &Path) -> Result<ServerState> {
    if !path.exists() {
        return Ok(ServerState::default());
    }
    let mut buf = String::new();
    File::open(path)?.read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Ok(ServerState::default());
    }
    Ok(serde_json::from_str(&buf)?)
}

/// Save server tables using atomic write (temp file + rename).
pub fn save_state(state: &ServerState, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = File::create(&tmp)?;
    let data = serde_json::to_string_pretty(state)?;
    f.write_all(data.as_bytes())?;
    f.flush()?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[async_trait]
impl RemoteService for JsonFileService {
    async fn fetch_all_user_data(&self) -> Result<Envelope<UserData>> {
        self.inner.fetch_all_user_data().await
    }

    async fn create(&self, kind: EntityKind, payload: Value) -> Result<Envelope<Value>> {
        self.persist(self.inner.create(kind, payload)).await
    }

    async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<Envelope<Value>> {
        self.persist(self.inner.update(kind, id, patch)).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<Envelope<Value>> {
        self.persist(self.inner.delete(kind, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn accepted_mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        let svc = JsonFileService::open(&path).unwrap();
        let created = svc.create(EntityKind::Project, json!({"name": "Alpha"})).await.unwrap();
        assert!(created.success);
        let rejected = svc.create(EntityKind::Board, json!({"name": "B", "projectId": "nope"})).await.unwrap();
        assert!(!rejected.success);

        let reopened = JsonFileService::open(&path).unwrap();
        let data = reopened.fetch_all_user_data().await.unwrap().data.unwrap();
        assert_eq!(data.projects.len(), 1);
        assert!(data.boards.is_empty());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_tables_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let svc = JsonFileService::open(blocker.join("data.json")).unwrap();
        assert!(svc.create(EntityKind::Project, json!({"name": "Alpha"})).await.is_err());
        assert!(svc.inner.state().projects.is_empty());
        assert!(svc.create(EntityKind::Project, json!({"name": "Alpha"})).await.is_err());
        assert!(svc.inner.state().projects.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileService::open(&path).is_err());
    }
}
