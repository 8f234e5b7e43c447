//! Optimistic mutation engine.
//!
//! `Cache` owns the entity tables and runs every create, update and delete
//! through the same protocol: snapshot, apply locally, dispatch to the
//! remote service, then reconcile with the server record or roll back.
//!
//! * Creates and deletes roll back fully on failure.
//! * Updates keep the local change on failure and land in the unsynced
//!   ledger, from where they can be retried or discarded.
//! * Mutations on the same identifier queue behind each other (see
//!   [`CacheConfig::serialize_per_entity`]); each remote call has a deadline.
//!
//! The std mutexes guarding the tables are never held across an await, so
//! every local step is atomic with respect to other cache operations. Each
//! step that changes the tables bumps the revision published by
//! [`Cache::subscribe`] exactly once.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde_json::Value;
use tokio::sync::watch;

use crate::cascade;
use crate::config::CacheConfig;
use crate::db::{position, replace_row, Counts, Database, Entity};
use crate::error::{Error, Result};
use crate::fields::EntityKind;
use crate::ids::{is_temp, temp_id};
use crate::loader::LoadFlags;
use crate::locks::{EntityGuard, EntityLocks};
use crate::normalize::{normalize_board, normalize_project, normalize_task, LabelHints};
use crate::project::{Board, BoardPatch, NewBoard, NewProject, Project, ProjectPatch};
use crate::remote::{Envelope, RemoteService};
use crate::task::{NewTask, Task, TaskPatch};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A whole row of any table.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Project(Project),
    Board(Board),
    Task(Task),
}

impl Row {
    pub fn kind(&self) -> EntityKind {
        match self {
            Row::Project(_) => EntityKind::Project,
            Row::Board(_) => EntityKind::Board,
            Row::Task(_) => EntityKind::Task,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Row::Project(p) => &p.id,
            Row::Board(b) => &b.id,
            Row::Task(t) => &t.id,
        }
    }

    /// Put this row back over the current row with the same id.
    fn restore(self, db: &mut Database) -> Option<()> {
        match self {
            Row::Project(p) => replace_row(&mut db.projects, &p.id.clone(), p).map(drop),
            Row::Board(b) => replace_row(&mut db.boards, &b.id.clone(), b).map(drop),
            Row::Task(t) => replace_row(&mut db.tasks, &t.id.clone(), t).map(drop),
        }
    }
}

/// An update the service did not accept, still applied locally.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsyncedUpdate {
    pub kind: EntityKind,
    pub id: String,
    /// Every field sent since the last synced state, later writes winning.
    pub patch: Value,
    /// Message of the most recent failure.
    pub error: String,
    before: Row,
}

impl UnsyncedUpdate {
    /// The row as it was before the first unaccepted update.
    pub fn before(&self) -> &Row {
        &self.before
    }
}

/// Table-specific glue for the generic mutation paths.
trait Stored: Entity + Send + Sized + 'static {
    const KIND: EntityKind;

    fn rows_mut(db: &mut Database) -> &mut Vec<Self>;

    fn from_record(raw: &Value, hints: &LabelHints, now: DateTime<Utc>) -> Self;

    /// Point children at `new_id` after a parent's identifier changed.
    fn rekey_children(_db: &mut Database, _old_id: &str, _new_id: &str) {}

    fn into_row(self) -> Row;
}

impl Stored for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.projects
    }

    fn from_record(raw: &Value, _hints: &LabelHints, now: DateTime<Utc>) -> Self {
        normalize_project(raw, now)
    }

    fn rekey_children(db: &mut Database, old_id: &str, new_id: &str) {
        db.rekey_project(old_id, new_id);
    }

    fn into_row(self) -> Row {
        Row::Project(self)
    }
}

impl Stored for Board {
    const KIND: EntityKind = EntityKind::Board;

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.boards
    }

    fn from_record(raw: &Value, _hints: &LabelHints, now: DateTime<Utc>) -> Self {
        normalize_board(raw, now)
    }

    fn rekey_children(db: &mut Database, old_id: &str, new_id: &str) {
        db.rekey_board(old_id, new_id);
    }

    fn into_row(self) -> Row {
        Row::Board(self)
    }
}

impl Stored for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.tasks
    }

    fn from_record(raw: &Value, hints: &LabelHints, now: DateTime<Utc>) -> Self {
        normalize_task(raw, hints, now)
    }

    fn into_row(self) -> Row {
        Row::Task(self)
    }
}

/// Client-held cache of projects, boards and tasks.
pub struct Cache {
    service: Arc<dyn RemoteService>,
    config: CacheConfig,
    db: Mutex<Database>,
    load: Mutex<LoadFlags>,
    unsynced: Mutex<BTreeMap<String, UnsyncedUpdate>>,
    /// Temporary id -> server id, for creates that have reconciled.
    aliases: Mutex<HashMap<String, String>>,
    locks: EntityLocks,
    revision: watch::Sender<u64>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("counts", &self.counts())
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

impl Cache {
    pub fn new(service: Arc<dyn RemoteService>, config: CacheConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Cache {
            service,
            config,
            db: Mutex::new(Database::default()),
            load: Mutex::new(LoadFlags::default()),
            unsynced: Mutex::new(BTreeMap::new()),
            aliases: Mutex::new(HashMap::new()),
            locks: EntityLocks::default(),
            revision,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn service(&self) -> &dyn RemoteService {
        self.service.as_ref()
    }

    pub(crate) fn load_flags(&self) -> MutexGuard<'_, LoadFlags> {
        lock(&self.load)
    }

    /// Receiver of the store revision; it changes once per state transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Drop all cached state and start over as if freshly constructed.
    ///
    /// A load still in flight will not commit its result.
    pub fn reset(&self) {
        {
            let mut flags = self.load_flags();
            flags.initialized = false;
            flags.loading = false;
            flags.epoch += 1;
        }
        lock(&self.unsynced).clear();
        lock(&self.aliases).clear();
        self.transition(|db| {
            *db = Database::default();
            Some(())
        });
    }

    /// Run `f` against the tables as one atomic transition. The revision is
    /// bumped when `f` returns `Some`.
    pub(crate) fn transition<R>(&self, f: impl FnOnce(&mut Database) -> Option<R>) -> Option<R> {
        let out = f(&mut lock(&self.db));
        if out.is_some() {
            self.revision.send_modify(|rev| *rev += 1);
        }
        out
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        f(&lock(&self.db))
    }

    /// Await a service call under the configured deadline and unwrap its
    /// envelope.
    pub(crate) async fn dispatch<T>(&self, call: impl Future<Output = Result<Envelope<T>>>) -> Result<Option<T>> {
        let envelope = match self.config.remote_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| Error::Timeout(limit))??,
            None => call.await?,
        };
        envelope.into_result()
    }

    /// Current identifier for `id`, following a reconciled temporary id.
    pub fn resolve(&self, id: &str) -> String {
        lock(&self.aliases).get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    /// Take the queue turn on `id`. If `id` was superseded while waiting,
    /// move to the queue of its replacement.
    async fn enter(&self, id: &str) -> (String, Option<EntityGuard<'_>>) {
        let mut id = self.resolve(id);
        if !self.config.serialize_per_entity {
            return (id, None);
        }
        loop {
            let guard = self.locks.acquire(&id).await;
            let current = self.resolve(&id);
            if current == id {
                return (id, Some(guard));
            }
            id = current;
        }
    }

    /// Wait for a provisional parent's create to settle and return the id
    /// to reference it by.
    async fn settle_parent(&self, id: &str) -> String {
        let id = self.resolve(id);
        if !is_temp(&id) {
            return id;
        }
        drop(self.locks.acquire(&id).await);
        self.resolve(&id)
    }

    // ----- reads -----

    pub fn project(&self, id: &str) -> Option<Project> {
        self.read(|db| db.project(id).cloned())
    }

    pub fn board(&self, id: &str) -> Option<Board> {
        self.read(|db| db.board(id).cloned())
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.read(|db| db.task(id).cloned())
    }

    pub fn projects(&self) -> Vec<Project> {
        self.read(|db| db.projects.clone())
    }

    pub fn boards(&self) -> Vec<Board> {
        self.read(|db| db.boards.clone())
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read(|db| db.tasks.clone())
    }

    pub fn boards_for_project(&self, project_id: &str) -> Vec<Board> {
        self.read(|db| db.boards_for_project(project_id).into_iter().cloned().collect())
    }

    pub fn tasks_for_board(&self, board_id: &str) -> Vec<Task> {
        self.read(|db| db.tasks_for_board(board_id).into_iter().cloned().collect())
    }

    pub fn tasks_for_project(&self, project_id: &str) -> Vec<Task> {
        self.read(|db| db.tasks_for_project(project_id).into_iter().cloned().collect())
    }

    pub fn tasks_for_user(&self, user_id: &str) -> Vec<Task> {
        self.read(|db| db.tasks_for_user(user_id).into_iter().cloned().collect())
    }

    pub fn tasks_in_column(&self, board_id: &str, status: &str) -> Vec<Task> {
        self.read(|db| db.tasks_in_column(board_id, status).into_iter().cloned().collect())
    }

    pub fn label_hints(&self) -> LabelHints {
        self.read(Database::label_hints)
    }

    pub fn counts(&self) -> Counts {
        self.read(Database::counts)
    }

    /// Copy of all three tables.
    pub fn snapshot(&self) -> Database {
        self.read(Database::clone)
    }

    // ----- unsynced ledger -----

    pub fn unsynced(&self) -> Vec<UnsyncedUpdate> {
        lock(&self.unsynced).values().cloned().collect()
    }

    pub fn is_unsynced(&self, id: &str) -> bool {
        let id = self.resolve(id);
        lock(&self.unsynced).contains_key(&id)
    }

    /// Send the recorded patch for `id` again. Resolves `Ok` without a call
    /// when nothing is pending for `id`.
    pub async fn retry_update(&self, id: &str) -> Result<String> {
        let (id, _turn) = self.enter(id).await;
        let pending = lock(&self.unsynced).get(&id).map(|u| (u.kind, u.patch.clone()));
        let Some((kind, patch)) = pending else {
            debug!("nothing unsynced for {id}");
            return Ok(id);
        };
        let outcome = self.dispatch(self.service.update(kind, &id, patch.clone())).await;
        match kind {
            EntityKind::Project => self.settle_update::<Project>(&id, None, patch, outcome),
            EntityKind::Board => self.settle_update::<Board>(&id, None, patch, outcome),
            EntityKind::Task => self.settle_update::<Task>(&id, None, patch, outcome),
        }
    }

    /// Give up on the pending update for `id` and put back the last synced
    /// row. Returns whether anything was pending.
    pub async fn discard_update(&self, id: &str) -> bool {
        let (id, _turn) = self.enter(id).await;
        let Some(entry) = lock(&self.unsynced).remove(&id) else {
            return false;
        };
        debug!("discarding unsynced update of {} {id}", entry.kind);
        self.transition(|db| entry.before.restore(db));
        true
    }

    // ----- projects -----

    pub async fn add_project(&self, draft: NewProject) -> Result<String> {
        let temp = temp_id(EntityKind::Project);
        let _turn = self.locks.acquire(&temp).await;
        let now = Utc::now();
        self.transition(|db| {
            db.projects.push(draft.provisional(&temp, now));
            Some(())
        });
        let outcome = self.dispatch(self.service.create(EntityKind::Project, draft.payload())).await;
        self.settle_create::<Project>(&temp, outcome)
    }

    pub async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<String> {
        self.update::<Project>(id, patch.payload(), |row, _, now| patch.apply(row, now)).await
    }

    /// Delete a project with its boards and tasks.
    pub async fn delete_project(&self, id: &str) -> Result<String> {
        self.delete(EntityKind::Project, id).await
    }

    // ----- boards -----

    pub async fn add_board(&self, mut draft: NewBoard) -> Result<String> {
        let temp = temp_id(EntityKind::Board);
        let _turn = self.locks.acquire(&temp).await;
        draft.project_id = self.resolve(&draft.project_id);
        let now = Utc::now();
        self.transition(|db| {
            db.boards.push(draft.provisional(&temp, now));
            Some(())
        });
        draft.project_id = self.settle_parent(&draft.project_id).await;
        if is_temp(&draft.project_id) {
            return self.settle_create::<Board>(&temp, Err(parent_missing(EntityKind::Project, &draft.project_id)));
        }
        let outcome = self.dispatch(self.service.create(EntityKind::Board, draft.payload())).await;
        self.settle_create::<Board>(&temp, outcome)
    }

    pub async fn update_board(&self, id: &str, patch: BoardPatch) -> Result<String> {
        self.update::<Board>(id, patch.payload(), |row, _, now| patch.apply(row, now)).await
    }

    /// Delete a board with its tasks.
    pub async fn delete_board(&self, id: &str) -> Result<String> {
        self.delete(EntityKind::Board, id).await
    }

    // ----- tasks -----

    pub async fn add_task(&self, mut draft: NewTask) -> Result<String> {
        let temp = temp_id(EntityKind::Task);
        let _turn = self.locks.acquire(&temp).await;
        draft.board_id = self.resolve(&draft.board_id);
        draft.project_id = self.resolve(&draft.project_id);
        let now = Utc::now();
        self.transition(|db| {
            let hints = db.label_hints();
            db.tasks.push(draft.provisional(&temp, &hints, now));
            Some(())
        });
        draft.project_id = self.settle_parent(&draft.project_id).await;
        draft.board_id = self.settle_parent(&draft.board_id).await;
        for (kind, parent) in [(EntityKind::Project, &draft.project_id), (EntityKind::Board, &draft.board_id)] {
            if is_temp(parent) {
                return self.settle_create::<Task>(&temp, Err(parent_missing(kind, parent)));
            }
        }
        let outcome = self.dispatch(self.service.create(EntityKind::Task, draft.payload())).await;
        self.settle_create::<Task>(&temp, outcome)
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<String> {
        self.update::<Task>(id, patch.payload(), |row, hints, now| row.apply(&patch, hints, now)).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<String> {
        self.delete(EntityKind::Task, id).await
    }

    // ----- protocol -----

    /// Swap the provisional row for the server record, or take it out again.
    fn settle_create<T: Stored>(&self, temp: &str, outcome: Result<Option<Value>>) -> Result<String> {
        let record = match outcome.and_then(|data| data.ok_or(Error::MissingData(T::KIND.prefix()))) {
            Ok(record) => record,
            Err(err) => {
                error!("create of {} failed, rolling back {temp}: {err}", T::KIND);
                // Children queued under the provisional id go with it.
                self.transition(|db| {
                    let set = cascade::collect(db, T::KIND, temp)?;
                    Some(cascade::remove(db, &set))
                });
                return Err(err);
            }
        };

        let hints = self.read(|db| db.label_hints_for(temp));
        let row = T::from_record(&record, &hints, Utc::now());
        let id = row.id().to_string();
        let swapped = self.transition(|db| {
            replace_row(T::rows_mut(db), temp, row)?;
            if id != temp {
                T::rekey_children(db, temp, &id);
            }
            Some(())
        });
        if swapped.is_none() {
            debug!("provisional {} {temp} was gone before {id} arrived", T::KIND);
        }
        if id != temp {
            lock(&self.aliases).insert(temp.to_string(), id.clone());
        }
        debug!("created {} {id} (was {temp})", T::KIND);
        Ok(id)
    }

    async fn update<T: Stored>(
        &self,
        id: &str,
        payload: Value,
        apply: impl FnOnce(&mut T, &LabelHints, DateTime<Utc>),
    ) -> Result<String> {
        let (id, _turn) = self.enter(id).await;
        let now = Utc::now();
        let before = self.transition(|db| {
            let hints = db.label_hints();
            let rows = T::rows_mut(db);
            let idx = position(rows, &id)?;
            let mut row = rows[idx].clone();
            apply(&mut row, &hints, now);
            Some(std::mem::replace(&mut rows[idx], row))
        });
        let Some(before) = before else {
            debug!("update of unknown {} {id} ignored", T::KIND);
            return Ok(id);
        };
        let outcome = self.dispatch(self.service.update(T::KIND, &id, payload.clone())).await;
        self.settle_update::<T>(&id, Some(before.into_row()), payload, outcome)
    }

    /// Adopt the server record, or keep the local change and record it as
    /// unsynced.
    fn settle_update<T: Stored>(
        &self,
        id: &str,
        before: Option<Row>,
        payload: Value,
        outcome: Result<Option<Value>>,
    ) -> Result<String> {
        match outcome {
            Ok(record) => {
                if let Some(record) = record {
                    let hints = self.read(|db| db.label_hints_for(id));
                    let row = T::from_record(&record, &hints, Utc::now());
                    if row.id() == id {
                        self.transition(|db| replace_row(T::rows_mut(db), id, row).map(drop));
                    }
                }
                if lock(&self.unsynced).remove(id).is_some() {
                    debug!("{} {id} back in sync", T::KIND);
                }
                Ok(id.to_string())
            }
            Err(err) => {
                warn!("update of {} {id} failed, keeping local change: {err}", T::KIND);
                let message = err.to_string();
                let mut ledger = lock(&self.unsynced);
                if let Some(entry) = ledger.get_mut(id) {
                    merge_patch(&mut entry.patch, payload);
                    entry.error = message;
                } else if let Some(before) = before {
                    let entry = UnsyncedUpdate { kind: T::KIND, id: id.to_string(), patch: payload, error: message, before };
                    ledger.insert(id.to_string(), entry);
                }
                Err(err)
            }
        }
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<String> {
        let (id, _turn) = self.enter(id).await;
        let removed = self.transition(|db| {
            let set = cascade::collect(db, kind, &id)?;
            Some(cascade::remove(db, &set))
        });
        let Some(removed) = removed else {
            debug!("delete of unknown {kind} {id} ignored");
            return Ok(id);
        };
        match self.dispatch(self.service.delete(kind, &id)).await {
            Ok(_) => {
                let mut ledger = lock(&self.unsynced);
                let gone = removed.projects.iter().map(|(_, p)| &p.id)
                    .chain(removed.boards.iter().map(|(_, b)| &b.id))
                    .chain(removed.tasks.iter().map(|(_, t)| &t.id));
                for gone in gone {
                    ledger.remove(gone);
                }
                debug!("deleted {kind} {id} and {} dependents", removed.len() - 1);
                Ok(id)
            }
            Err(err) => {
                error!("delete of {kind} {id} failed, restoring {} rows: {err}", removed.len());
                self.transition(|db| {
                    cascade::restore(db, removed);
                    Some(())
                });
                Err(err)
            }
        }
    }
}

fn parent_missing(kind: EntityKind, id: &str) -> Error {
    Error::remote(format!("{kind} {id} was never created"))
}

/// Fold a later patch into an earlier one; keys in `later` win.
fn merge_patch(earlier: &mut Value, later: Value) {
    match (earlier, later) {
        (Value::Object(into), Value::Object(from)) => into.extend(from),
        (slot, later) => *slot = later,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryService, Op, ServerState};
    use serde_json::json;
    use std::time::Duration;

    /// Service with p1 ⊇ b1 ⊇ {t1, t2}, plus a cache loaded from it.
    async fn seeded() -> (Arc<MemoryService>, Cache) {
        let state = ServerState {
            projects: vec![json!({"id": "p1", "name": "Alpha"})],
            boards: vec![json!({"id": "b1", "name": "Main", "projectId": "p1"})],
            tasks: vec![
                json!({"id": "t1", "name": "One", "boardId": "b1", "projectId": "p1"}),
                json!({"id": "t2", "name": "Two", "boardId": "b1", "projectId": "p1", "labels": ["Bug"]}),
            ],
            seq: 0,
        };
        let svc = Arc::new(MemoryService::with_state(state));
        let cache = Cache::new(svc.clone(), CacheConfig::default());
        cache.load().await.unwrap();
        (svc, cache)
    }

    #[tokio::test]
    async fn create_replaces_temp_row_with_server_row() {
        let (_svc, cache) = seeded().await;
        let id = cache.add_task(NewTask::new("Three", "b1", "p1")).await.unwrap();
        assert!(id.starts_with("srv-task-"));
        assert!(cache.tasks().iter().all(|t| !is_temp(&t.id)));
        assert_eq!(cache.tasks_for_board("b1").len(), 3);
    }

    #[tokio::test]
    async fn failed_create_restores_previous_tables() {
        let (svc, cache) = seeded().await;
        let before = cache.snapshot();
        svc.fail_next(Fault::reject("boardId invalid"));
        let err = cache.add_task(NewTask::new("X", "b1", "p1")).await.unwrap_err();
        assert!(err.to_string().contains("boardId invalid"));
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn failed_update_keeps_change_and_can_be_discarded() {
        let (svc, cache) = seeded().await;
        svc.fail_next(Fault::Transport("offline".into()));
        let patch = TaskPatch { name: Some("Renamed".into()), ..Default::default() };
        assert!(cache.update_task("t1", patch).await.is_err());
        assert_eq!(cache.task("t1").unwrap().name, "Renamed");
        assert!(cache.is_unsynced("t1"));

        assert!(cache.discard_update("t1").await);
        assert_eq!(cache.task("t1").unwrap().name, "One");
        assert!(cache.unsynced().is_empty());
    }

    #[tokio::test]
    async fn retry_sends_merged_patch() {
        let (svc, cache) = seeded().await;
        svc.fail_next(Fault::reject("busy"));
        svc.fail_next(Fault::reject("busy"));
        let first = TaskPatch { name: Some("A".into()), ..Default::default() };
        let second = TaskPatch { priority: Some("High".into()), ..Default::default() };
        assert!(cache.update_task("t1", first).await.is_err());
        assert!(cache.update_task("t1", second).await.is_err());
        let pending = cache.unsynced();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].patch, json!({"name": "A", "priority": "High"}));

        cache.retry_update("t1").await.unwrap();
        assert!(!cache.is_unsynced("t1"));
        let server = svc.state();
        assert_eq!(server.tasks[0]["name"], "A");
        assert_eq!(server.tasks[0]["priority"], "High");
    }

    #[tokio::test]
    async fn unknown_ids_are_noops() {
        let (svc, cache) = seeded().await;
        let rev = cache.revision();
        assert_eq!(cache.delete_task("ghost").await.unwrap(), "ghost");
        assert_eq!(cache.update_board("ghost", BoardPatch::default()).await.unwrap(), "ghost");
        assert_eq!(cache.revision(), rev);
        assert_eq!(svc.calls(Op::Delete) + svc.calls(Op::Update), 0);
    }

    #[tokio::test]
    async fn failed_delete_restores_subtree_in_place() {
        let (svc, cache) = seeded().await;
        let before = cache.snapshot();
        svc.fail_next(Fault::reject("nope"));
        assert!(cache.delete_board("b1").await.is_err());
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn hung_call_times_out_and_rolls_back() {
        let svc = Arc::new(MemoryService::new());
        let cache = Cache::new(svc.clone(), CacheConfig::default().with_timeout(Some(Duration::from_millis(30))));
        svc.fail_next(Fault::Hang);
        let err = cache.add_project(NewProject::new("Slow")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(cache.projects().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (_svc, cache) = seeded().await;
        cache.reset();
        assert_eq!(cache.counts(), Counts::default());
        assert!(!cache.is_initialized());
    }

    #[test]
    fn merge_patch_overrides_keys() {
        let mut a = json!({"name": "A", "status": "Done"});
        merge_patch(&mut a, json!({"name": "B"}));
        assert_eq!(a, json!({"name": "B", "status": "Done"}));
    }
}
