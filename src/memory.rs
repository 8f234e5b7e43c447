//! In-memory implementation of the remote service.
//!
//! Behaves like the real backend closely enough to exercise the cache: it
//! assigns identifiers, validates foreign keys, merges partial updates,
//! cascades deletes, and answers in the loose shapes the backend uses (labels
//! as bare names, dates as strings). Tests can inject failures, hold calls
//! at a gate and count outbound requests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::error::{Error, Result};
use crate::fields::EntityKind;
use crate::normalize::wire_date;
use crate::remote::{Envelope, RemoteService, UserData, ValidationDetail};

/// Raw server-side tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    #[serde(default)]
    pub projects: Vec<Value>,
    #[serde(default)]
    pub boards: Vec<Value>,
    #[serde(default)]
    pub tasks: Vec<Value>,
    /// Sequence for server-assigned identifiers.
    #[serde(default)]
    pub seq: u64,
}

/// A failure to hand back on a future call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Answer `{success: false, error, details}`.
    Reject { error: String, details: Vec<ValidationDetail> },
    /// Fail the call itself.
    Transport(String),
    /// Never answer.
    Hang,
}

impl Fault {
    pub fn reject(error: impl Into<String>) -> Self {
        Fault::Reject { error: error.into(), details: Vec::new() }
    }
}

/// Which service operation a call counter refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchAll,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
pub struct MemoryService {
    state: Mutex<ServerState>,
    faults: Mutex<VecDeque<Fault>>,
    calls: Mutex<HashMap<Op, usize>>,
    gate: Arc<RwLock<()>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ServerState) -> Self {
        MemoryService { state: Mutex::new(state), ..Default::default() }
    }

    /// Copy of the server-side tables.
    pub fn state(&self) -> ServerState {
        lock(&self.state).clone()
    }

    /// Replace the server-side tables wholesale.
    pub fn restore(&self, state: ServerState) {
        *lock(&self.state) = state;
    }

    /// Queue a failure for the next call, whatever it is.
    pub fn fail_next(&self, fault: Fault) {
        lock(&self.faults).push_back(fault);
    }

    /// Number of calls made for `op`.
    pub fn calls(&self, op: Op) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    /// Hold every call at the gate until the returned guard is dropped.
    pub async fn pause(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.clone().write_owned().await
    }

    /// Count the call, wait at the gate, then play any queued fault.
    async fn enter<T>(&self, op: Op) -> Result<Option<Envelope<T>>> {
        *lock(&self.calls).entry(op).or_default() += 1;
        let fault = lock(&self.faults).pop_front();
        drop(self.gate.read().await);
        match fault {
            None => Ok(None),
            Some(Fault::Reject { error, details }) => Ok(Some(Envelope::invalid(error, details))),
            Some(Fault::Transport(msg)) => Err(Error::Transport(msg)),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl RemoteService for MemoryService {
    async fn fetch_all_user_data(&self) -> Result<Envelope<UserData>> {
        if let Some(env) = self.enter(Op::FetchAll).await? {
            return Ok(env);
        }
        let state = lock(&self.state);
        Ok(Envelope::ok(UserData {
            projects: state.projects.clone(),
            boards: state.boards.clone(),
            tasks: state.tasks.clone(),
        }))
    }

    async fn create(&self, kind: EntityKind, payload: Value) -> Result<Envelope<Value>> {
        if let Some(env) = self.enter(Op::Create).await? {
            return Ok(env);
        }
        Ok(lock(&self.state).create(kind, payload))
    }

    async fn update(&self, kind: EntityKind, id: &str, patch: Value) -> Result<Envelope<Value>> {
        if let Some(env) = self.enter(Op::Update).await? {
            return Ok(env);
        }
        Ok(lock(&self.state).update(kind, id, patch))
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<Envelope<Value>> {
        if let Some(env) = self.enter(Op::Delete).await? {
            return Ok(env);
        }
        Ok(lock(&self.state).delete(kind, id))
    }
}

fn id_of(record: &Value) -> &str {
    record.get("id").and_then(Value::as_str).unwrap_or_default()
}

fn str_of<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn detail(field: &str, message: &str) -> ValidationDetail {
    ValidationDetail { field: Some(field.to_string()), message: message.to_string() }
}

impl ServerState {
    fn table(&self, kind: EntityKind) -> &Vec<Value> {
        match kind {
            EntityKind::Project => &self.projects,
            EntityKind::Board => &self.boards,
            EntityKind::Task => &self.tasks,
        }
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut Vec<Value> {
        match kind {
            EntityKind::Project => &mut self.projects,
            EntityKind::Board => &mut self.boards,
            EntityKind::Task => &mut self.tasks,
        }
    }

    fn find(&self, kind: EntityKind, id: &str) -> Option<&Value> {
        self.table(kind).iter().find(|r| id_of(r) == id)
    }

    fn validate(&self, kind: EntityKind, record: &Map<String, Value>) -> Vec<ValidationDetail> {
        let mut problems = Vec::new();
        let get = |key: &str| record.get(key).and_then(Value::as_str).unwrap_or_default();
        if get("name").trim().is_empty() {
            problems.push(detail("name", "is required"));
        }
        match kind {
            EntityKind::Project => {}
            EntityKind::Board => {
                if self.find(EntityKind::Project, get("projectId")).is_none() {
                    problems.push(detail("projectId", "does not reference a project"));
                }
            }
            EntityKind::Task => match self.find(EntityKind::Board, get("boardId")) {
                None => problems.push(detail("boardId", "does not reference a board")),
                Some(board) if str_of(board, "projectId") != get("projectId") => {
                    problems.push(detail("projectId", "does not match the board's project"))
                }
                Some(_) => {}
            },
        }
        problems
    }

    fn create(&mut self, kind: EntityKind, payload: Value) -> Envelope<Value> {
        let Value::Object(mut record) = payload else {
            return Envelope::fail("payload must be an object");
        };
        let problems = self.validate(kind, &record);
        if !problems.is_empty() {
            return Envelope::invalid("Validation failed", problems);
        }
        self.seq += 1;
        let now = wire_date(Utc::now());
        record.insert("id".into(), Value::from(format!("srv-{}-{}", kind.prefix(), self.seq)));
        if kind == EntityKind::Task && !record.contains_key("taskId") {
            record.insert("taskId".into(), Value::from(format!("TASK-{}", self.seq)));
        }
        record.insert("createdAt".into(), Value::from(now.clone()));
        record.insert("updatedAt".into(), Value::from(now));
        let record = Value::Object(record);
        self.table_mut(kind).push(record.clone());
        Envelope::ok(record)
    }

    fn update(&mut self, kind: EntityKind, id: &str, patch: Value) -> Envelope<Value> {
        let Value::Object(patch) = patch else {
            return Envelope::fail("patch must be an object");
        };
        let Some(record) = self.table_mut(kind).iter_mut().find(|r| id_of(r) == id) else {
            return Envelope::fail(format!("{kind} {id} not found"));
        };
        let Some(fields) = record.as_object_mut() else {
            return Envelope::fail(format!("{kind} {id} is corrupt"));
        };
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            if key == "config" {
                if let (Some(Value::Object(existing)), Value::Object(incoming)) = (fields.get_mut("config"), &value) {
                    merge_object(existing, incoming.clone());
                    continue;
                }
            }
            fields.insert(key, value);
        }
        fields.insert("updatedAt".into(), Value::from(wire_date(Utc::now())));
        Envelope::ok(record.clone())
    }

    fn delete(&mut self, kind: EntityKind, id: &str) -> Envelope<Value> {
        if self.find(kind, id).is_none() {
            return Envelope::fail(format!("{kind} {id} not found"));
        }
        match kind {
            EntityKind::Project => {
                let boards: Vec<String> = self
                    .boards
                    .iter()
                    .filter(|b| str_of(b, "projectId") == id)
                    .map(|b| id_of(b).to_string())
                    .collect();
                self.projects.retain(|p| id_of(p) != id);
                self.boards.retain(|b| str_of(b, "projectId") != id);
                self.tasks.retain(|t| {
                    str_of(t, "projectId") != id && !boards.iter().any(|b| b == str_of(t, "boardId"))
                });
            }
            EntityKind::Board => {
                self.boards.retain(|b| id_of(b) != id);
                self.tasks.retain(|t| str_of(t, "boardId") != id);
            }
            EntityKind::Task => self.tasks.retain(|t| id_of(t) != id),
        }
        Envelope::done()
    }
}

/// Additive merge one level deep, plus the nested `credentials` map.
fn merge_object(existing: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if key == "credentials" {
            if let (Some(Value::Object(inner)), Value::Object(more)) = (existing.get_mut(&key), &value) {
                inner.extend(more.clone());
                continue;
            }
        }
        existing.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryService {
        let svc = MemoryService::new();
        let mut state = lock(&svc.state);
        let p = state.create(EntityKind::Project, json!({"name": "Alpha"}));
        let pid = id_of(p.data.as_ref().unwrap()).to_string();
        state.create(EntityKind::Board, json!({"name": "Main", "projectId": pid}));
        drop(state);
        svc
    }

    #[tokio::test]
    async fn create_assigns_ids_and_validates_parents() {
        let svc = seeded();
        let state = svc.state();
        let pid = id_of(&state.projects[0]).to_string();
        let bid = id_of(&state.boards[0]).to_string();

        let env = svc
            .create(EntityKind::Task, json!({"name": "X", "boardId": bid, "projectId": pid, "labels": ["Bug"]}))
            .await
            .unwrap();
        let record = env.data.unwrap();
        assert!(id_of(&record).starts_with("srv-task-"));
        assert!(record["taskId"].as_str().unwrap().starts_with("TASK-"));
        assert_eq!(record["labels"], json!(["Bug"]));

        let bad = svc
            .create(EntityKind::Task, json!({"name": "Y", "boardId": "nope", "projectId": pid}))
            .await
            .unwrap();
        assert!(!bad.success);
        assert_eq!(bad.details[0].field.as_deref(), Some("boardId"));
    }

    #[tokio::test]
    async fn update_merges_config_and_ignores_id() {
        let svc = MemoryService::new();
        let created = svc
            .create(EntityKind::Project, json!({"name": "A", "config": {"theme": "dark", "credentials": {"a": "1"}}}))
            .await
            .unwrap()
            .data
            .unwrap();
        let id = id_of(&created).to_string();
        let updated = svc
            .update(EntityKind::Project, &id, json!({"id": "hijack", "config": {"wip": 2, "credentials": {"b": "2"}}}))
            .await
            .unwrap()
            .data
            .unwrap();
        assert_eq!(id_of(&updated), id);
        assert_eq!(updated["config"], json!({"theme": "dark", "wip": 2, "credentials": {"a": "1", "b": "2"}}));
    }

    #[tokio::test]
    async fn delete_cascades_server_side() {
        let svc = seeded();
        let pid = id_of(&svc.state().projects[0]).to_string();
        assert!(svc.delete(EntityKind::Project, &pid).await.unwrap().success);
        let state = svc.state();
        assert!(state.projects.is_empty() && state.boards.is_empty());
        assert!(!svc.delete(EntityKind::Project, &pid).await.unwrap().success);
    }

    #[tokio::test]
    async fn faults_play_once_in_order() {
        let svc = MemoryService::new();
        svc.fail_next(Fault::reject("nope"));
        svc.fail_next(Fault::Transport("offline".into()));

        let first = svc.fetch_all_user_data().await.unwrap();
        assert_eq!(first.error.as_deref(), Some("nope"));
        assert!(matches!(svc.fetch_all_user_data().await, Err(Error::Transport(_))));
        assert!(svc.fetch_all_user_data().await.unwrap().success);
        assert_eq!(svc.calls(Op::FetchAll), 3);
    }
}
