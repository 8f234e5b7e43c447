//! # taskboard - optimistic client cache for projects, boards and tasks
//!
//! Holds a user's projects, boards and tasks in memory and keeps them in step
//! with a remote persistence service. Mutations show up locally at once and
//! are confirmed or undone when the service answers.
//!
//! ## Key Features
//!
//! - **Optimistic mutations**: create, update and delete apply immediately;
//!   the server record replaces the provisional one on success
//! - **Rollback**: failed creates and deletes restore the previous tables,
//!   deletes including the whole cascaded subtree (Project ⊇ Board ⊇ Task)
//! - **Unsynced ledger**: failed updates stay applied and can be retried or
//!   discarded later
//! - **Normalization**: labels, dates and optional collections in any of the
//!   shapes the service produces converge on one canonical form
//! - **Single-flight bulk load** at startup
//! - **Pluggable service**: [`MemoryService`] for tests and demos,
//!   [`JsonFileService`] for a durable local file
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard::{Cache, CacheConfig, MemoryService, NewProject};
//!
//! # async fn demo() -> taskboard::Result<()> {
//! let cache = Cache::new(Arc::new(MemoryService::new()), CacheConfig::default());
//! cache.load().await?;
//! let id = cache.add_project(NewProject::new("Website")).await?;
//! assert!(cache.project(&id).is_some());
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fields;
pub mod file;
pub mod ids;
pub mod loader;
pub mod locks;
pub mod memory;
pub mod normalize;
pub mod project;
pub mod remote;
pub mod task;

pub use config::CacheConfig;
pub use db::{Counts, Database};
pub use engine::{Cache, Row, UnsyncedUpdate};
pub use error::{Error, Result};
pub use fields::*;
pub use file::JsonFileService;
pub use loader::LoadOutcome;
pub use memory::{Fault, MemoryService, Op, ServerState};
pub use normalize::{DateInput, LabelHints};
pub use project::{Board, BoardPatch, NewBoard, NewProject, Project, ProjectPatch};
pub use remote::{Envelope, RemoteService, UserData, ValidationDetail};
pub use task::{NewTask, Task, TaskPatch};
