//! Bulk load of the full dataset at startup.
//!
//! Runs at most once per session. Calls made while a load is in flight or
//! after one succeeded return immediately without touching the service; a
//! failed load leaves the tables alone and can be retried.

use chrono::Utc;
use log::{debug, error};
use serde_json::Value;

use crate::db::Counts;
use crate::engine::Cache;
use crate::error::{Error, Result};
use crate::normalize::{hint_key, normalize_board, normalize_project, normalize_task, LabelHints};
use crate::remote::UserData;

/// Session load state. `epoch` changes on reset so a load started before it
/// cannot commit after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LoadFlags {
    pub initialized: bool,
    pub loading: bool,
    pub epoch: u64,
}

/// What a call to [`Cache::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fetched and committed this many rows.
    Loaded(Counts),
    AlreadyLoaded,
    /// Another call is fetching, or a reset overtook this one; nothing was
    /// committed.
    InFlight,
}

/// Clears `loading` when a load ends, including when its future is dropped.
struct Loading<'a> {
    cache: &'a Cache,
    epoch: u64,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        let mut flags = self.cache.load_flags();
        if flags.epoch == self.epoch {
            flags.loading = false;
        }
    }
}

/// Colors carried by structured labels in the payload, first one per name.
fn payload_hints(tasks: &[Value]) -> LabelHints {
    let mut hints = LabelHints::new();
    let labels = tasks
        .iter()
        .filter_map(|t| t.get("labels").and_then(Value::as_array))
        .flatten();
    for label in labels {
        let name = label.get("name").and_then(Value::as_str);
        let color = label.get("color").and_then(Value::as_str);
        if let (Some(name), Some(color)) = (name, color) {
            if !name.trim().is_empty() && !color.is_empty() {
                hints.entry(hint_key(name)).or_insert_with(|| color.to_string());
            }
        }
    }
    hints
}

impl Cache {
    /// Fetch every project, board and task and replace the tables with them.
    pub async fn load(&self) -> Result<LoadOutcome> {
        let epoch = {
            let mut flags = self.load_flags();
            if flags.initialized {
                return Ok(LoadOutcome::AlreadyLoaded);
            }
            if flags.loading {
                debug!("load already in flight");
                return Ok(LoadOutcome::InFlight);
            }
            flags.loading = true;
            flags.epoch
        };
        let _loading = Loading { cache: self, epoch };

        let data = match self.fetch().await {
            Ok(data) => data,
            Err(err) => {
                error!("bulk load failed: {err}");
                return Err(err);
            }
        };

        let now = Utc::now();
        let hints = payload_hints(&data.tasks);
        let projects = data.projects.iter().map(|p| normalize_project(p, now)).collect();
        let boards = data.boards.iter().map(|b| normalize_board(b, now)).collect();
        let tasks = data.tasks.iter().map(|t| normalize_task(t, &hints, now)).collect();

        let mut flags = self.load_flags();
        if flags.epoch != epoch {
            debug!("cache was reset during load, dropping result");
            return Ok(LoadOutcome::InFlight);
        }
        let counts = self
            .transition(|db| {
                db.replace_all(projects, boards, tasks);
                Some(db.counts())
            })
            .unwrap_or_default();
        flags.initialized = true;
        debug!("loaded {} projects, {} boards, {} tasks", counts.projects, counts.boards, counts.tasks);
        Ok(LoadOutcome::Loaded(counts))
    }

    pub fn is_initialized(&self) -> bool {
        self.load_flags().initialized
    }

    pub fn is_loading(&self) -> bool {
        self.load_flags().loading
    }

    async fn fetch(&self) -> Result<UserData> {
        self.dispatch(self.service().fetch_all_user_data())
            .await?
            .ok_or(Error::MissingData("dataset"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::memory::{Fault, MemoryService, Op, ServerState};
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> Arc<MemoryService> {
        Arc::new(MemoryService::with_state(ServerState {
            projects: vec![json!({"id": "p1", "name": "Alpha"})],
            boards: vec![json!({"id": "b1", "name": "Main", "projectId": "p1"})],
            tasks: vec![
                json!({"id": "t1", "boardId": "b1", "projectId": "p1", "labels": [{"name": "Ops", "color": "bg-lime-400"}]}),
                json!({"id": "t2", "boardId": "b1", "projectId": "p1", "labels": ["ops"], "dueDate": "2026-11-01"}),
            ],
            seq: 0,
        }))
    }

    #[tokio::test]
    async fn load_normalizes_and_commits_once() {
        let svc = service();
        let cache = Cache::new(svc.clone(), CacheConfig::default());
        let rev = cache.revision();

        let outcome = cache.load().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded(Counts { projects: 1, boards: 1, tasks: 2 }));
        assert_eq!(cache.revision(), rev + 1);
        assert_eq!(cache.load().await.unwrap(), LoadOutcome::AlreadyLoaded);
        assert_eq!(svc.calls(Op::FetchAll), 1);

        // A bare label picks up the color a structured one carried.
        let t2 = cache.task("t2").unwrap();
        assert_eq!(t2.labels[0].color, "bg-lime-400");
        assert!(t2.due_date.is_some());
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let svc = service();
        let cache = Cache::new(svc.clone(), CacheConfig::default());
        svc.fail_next(Fault::Transport("offline".into()));

        assert!(cache.load().await.is_err());
        assert!(!cache.is_initialized());
        assert!(!cache.is_loading());
        assert_eq!(cache.counts(), Counts::default());

        assert!(matches!(cache.load().await.unwrap(), LoadOutcome::Loaded(_)));
        assert!(cache.is_initialized());
    }

    #[test]
    fn payload_hints_ignore_bare_and_blank_labels() {
        let hints = payload_hints(&[json!({"labels": ["Bug", {"name": " ", "color": "x"}, {"name": "UI", "color": "bg-a"}]})]);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints.get("ui").map(String::as_str), Some("bg-a"));
    }
}
