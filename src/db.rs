//! In-memory entity tables and read queries.
//!
//! This module provides the `Database` struct holding the canonical copies
//! of all projects, boards and tasks, the synchronous queries the UI renders
//! from, and a couple of display helpers shared by the CLI.
//!
//! Rows are changed through whole-row primitives (insert, replace, remove,
//! restore), the foreign-key re-keying that follows a create, or a wholesale
//! `replace_all`. Each change happens inside a single transition, so every
//! observable state is a complete set of rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::{hint_key, LabelHints};
use crate::project::{Board, Project};
use crate::task::Task;

/// Anything stored in a `Database` table.
pub trait Entity: Clone {
    fn id(&self) -> &str;
}

impl Entity for Project {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Board {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

/// In-memory database for projects, boards and tasks.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub projects: Vec<Project>,
    pub boards: Vec<Board>,
    pub tasks: Vec<Task>,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub projects: usize,
    pub boards: usize,
    pub tasks: usize,
}

impl Database {
    /// Replace all three tables at once. Used only by the bulk loader.
    pub fn replace_all(&mut self, projects: Vec<Project>, boards: Vec<Board>, tasks: Vec<Task>) {
        self.projects = projects;
        self.boards = boards;
        self.tasks = tasks;
    }

    pub fn counts(&self) -> Counts {
        Counts { projects: self.projects.len(), boards: self.boards.len(), tasks: self.tasks.len() }
    }

    /// Get a project by ID.
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Get a board by ID.
    pub fn board(&self, id: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == id)
    }

    /// Get a task by ID.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn boards_for_project(&self, project_id: &str) -> Vec<&Board> {
        self.boards.iter().filter(|b| b.project_id == project_id).collect()
    }

    pub fn tasks_for_board(&self, board_id: &str) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.board_id == board_id).collect()
    }

    pub fn tasks_for_project(&self, project_id: &str) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.project_id == project_id).collect()
    }

    /// Tasks the user is assigned to or created.
    pub fn tasks_for_user(&self, user_id: &str) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.touches_user(user_id)).collect()
    }

    /// Tasks of one board column, in manual order. Unordered tasks follow
    /// ordered ones, oldest first.
    pub fn tasks_in_column(&self, board_id: &str, status: &str) -> Vec<&Task> {
        let mut column: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.board_id == board_id && t.status.eq_ignore_ascii_case(status))
            .collect();
        column.sort_by(|a, b| match (a.order, b.order) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.created_at.cmp(&b.created_at),
        });
        column
    }

    /// Colors already in use, keyed by label name, for normalizing new labels
    /// consistently with existing ones.
    pub fn label_hints(&self) -> LabelHints {
        let mut hints = HashMap::new();
        for label in self.tasks.iter().flat_map(|t| &t.labels) {
            hints.entry(hint_key(&label.name)).or_insert_with(|| label.color.clone());
        }
        hints
    }

    /// Like [`Database::label_hints`], but the labels of task `id` win.
    pub fn label_hints_for(&self, id: &str) -> LabelHints {
        let own = self.tasks.iter().filter(|t| t.id == id);
        let rest = self.tasks.iter().filter(|t| t.id != id);
        let mut hints = HashMap::new();
        for label in own.chain(rest).flat_map(|t| &t.labels) {
            hints.entry(hint_key(&label.name)).or_insert_with(|| label.color.clone());
        }
        hints
    }

    /// Point boards and tasks of a project at its new identifier.
    pub fn rekey_project(&mut self, old_id: &str, new_id: &str) -> usize {
        let mut touched = 0;
        for b in self.boards.iter_mut().filter(|b| b.project_id == old_id) {
            b.project_id = new_id.to_string();
            touched += 1;
        }
        for t in self.tasks.iter_mut().filter(|t| t.project_id == old_id) {
            t.project_id = new_id.to_string();
            touched += 1;
        }
        touched
    }

    /// Point tasks of a board at its new identifier.
    pub fn rekey_board(&mut self, old_id: &str, new_id: &str) -> usize {
        let mut touched = 0;
        for t in self.tasks.iter_mut().filter(|t| t.board_id == old_id) {
            t.board_id = new_id.to_string();
            touched += 1;
        }
        touched
    }
}

/// Position of the row with `id`.
pub fn position<T: Entity>(rows: &[T], id: &str) -> Option<usize> {
    rows.iter().position(|r| r.id() == id)
}

/// Replace the row with `id` by `row` in place. Returns the previous row.
pub fn replace_row<T: Entity>(rows: &mut [T], id: &str, row: T) -> Option<T> {
    let idx = position(rows, id)?;
    Some(std::mem::replace(&mut rows[idx], row))
}

/// Remove the row with `id`, returning it with its former position.
pub fn remove_row<T: Entity>(rows: &mut Vec<T>, id: &str) -> Option<(usize, T)> {
    let idx = position(rows, id)?;
    Some((idx, rows.remove(idx)))
}

/// Put a removed row back at its former position (clamped to the end).
pub fn restore_row<T: Entity>(rows: &mut Vec<T>, index: usize, row: T) {
    if position(rows, row.id()).is_some() {
        return;
    }
    let index = index.min(rows.len());
    rows.insert(index, row);
}

/// Format a due date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let delta = d.date_naive() - now.date_naive();
            if delta.num_days() == 0 {
                "today".into()
            } else if delta.num_days() == 1 {
                "tomorrow".into()
            } else if delta.num_days() > 1 {
                format!("in {}d", delta.num_days())
            } else {
                format!("{}d late", -delta.num_days())
            }
        }
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}
