//! Ownership cascade for deletes.
//!
//! Project ⊇ Board ⊇ Task. Removing a parent removes every child pointing at
//! it in the same state transition, and hands back a `Removed` set that puts
//! the whole subtree back exactly where it was.

use std::collections::HashSet;

use crate::db::{position, remove_row, restore_row, Database};
use crate::fields::EntityKind;
use crate::project::{Board, Project};
use crate::task::Task;

/// Identifiers a delete of one entity will take out, per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSet {
    pub projects: HashSet<String>,
    pub boards: HashSet<String>,
    pub tasks: HashSet<String>,
}

impl CascadeSet {
    pub fn len(&self) -> usize {
        self.projects.len() + self.boards.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rows taken out by a cascade, each with its former position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removed {
    pub projects: Vec<(usize, Project)>,
    pub boards: Vec<(usize, Board)>,
    pub tasks: Vec<(usize, Task)>,
}

impl Removed {
    pub fn len(&self) -> usize {
        self.projects.len() + self.boards.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collect the subtree rooted at `id`. Returns `None` when the root does not
/// exist locally.
pub fn collect(db: &Database, kind: EntityKind, id: &str) -> Option<CascadeSet> {
    let mut set = CascadeSet::default();
    match kind {
        EntityKind::Project => {
            db.project(id)?;
            set.projects.insert(id.to_string());
            set.boards.extend(db.boards_for_project(id).into_iter().map(|b| b.id.clone()));
            // Tasks go with their project and with any board being removed,
            // even if their own project_id disagrees.
            set.tasks.extend(
                db.tasks
                    .iter()
                    .filter(|t| t.project_id == id || set.boards.contains(&t.board_id))
                    .map(|t| t.id.clone()),
            );
        }
        EntityKind::Board => {
            db.board(id)?;
            set.boards.insert(id.to_string());
            set.tasks.extend(db.tasks_for_board(id).into_iter().map(|t| t.id.clone()));
        }
        EntityKind::Task => {
            db.task(id)?;
            set.tasks.insert(id.to_string());
        }
    }
    Some(set)
}

/// Remove every row in `set`, remembering positions for `restore`.
pub fn remove(db: &mut Database, set: &CascadeSet) -> Removed {
    Removed {
        projects: take_rows(&mut db.projects, &set.projects),
        boards: take_rows(&mut db.boards, &set.boards),
        tasks: take_rows(&mut db.tasks, &set.tasks),
    }
}

/// Put a removed subtree back. Parents go in before children so the
/// hierarchy is never observed half-restored.
pub fn restore(db: &mut Database, removed: Removed) {
    for (idx, p) in removed.projects {
        restore_row(&mut db.projects, idx, p);
    }
    for (idx, b) in removed.boards {
        restore_row(&mut db.boards, idx, b);
    }
    for (idx, t) in removed.tasks {
        restore_row(&mut db.tasks, idx, t);
    }
}

/// Take rows out in ascending original position, so that restoring them in
/// the same order rebuilds the table exactly.
fn take_rows<T: crate::db::Entity>(rows: &mut Vec<T>, ids: &HashSet<String>) -> Vec<(usize, T)> {
    let mut positions: Vec<usize> = ids.iter().filter_map(|id| position(rows, id)).collect();
    positions.sort_unstable();
    let mut taken = Vec::with_capacity(positions.len());
    // Walk backwards so earlier indices stay valid while removing.
    for &idx in positions.iter().rev() {
        let id = rows[idx].id().to_string();
        if let Some(pair) = remove_row(rows, &id) {
            taken.push(pair);
        }
    }
    taken.reverse();
    taken
}

/// Rows a subtree would orphan if left behind: boards whose project is gone
/// and tasks whose board or project is gone.
#[cfg(test)]
pub(crate) fn orphans(db: &Database) -> CascadeSet {
    let projects: HashSet<&str> = db.projects.iter().map(|p| p.id.as_str()).collect();
    let boards: HashSet<&str> = db.boards.iter().map(|b| b.id.as_str()).collect();
    CascadeSet {
        projects: HashSet::new(),
        boards: db
            .boards
            .iter()
            .filter(|b| !projects.contains(b.project_id.as_str()))
            .map(|b| b.id.clone())
            .collect(),
        tasks: db
            .tasks
            .iter()
            .filter(|t| !boards.contains(t.board_id.as_str()) || !projects.contains(t.project_id.as_str()))
            .map(|t| t.id.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::fixture;

    #[test]
    fn project_cascade_takes_boards_and_tasks() {
        let db = fixture();
        let set = collect(&db, EntityKind::Project, "p1").unwrap();
        assert_eq!(set.boards.len(), 2);
        assert_eq!(set.tasks.len(), 3);
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn board_cascade_only_takes_its_tasks() {
        let db = fixture();
        let set = collect(&db, EntityKind::Board, "b1").unwrap();
        assert!(set.projects.is_empty());
        assert_eq!(set.tasks, ["t1", "t2"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn missing_root_yields_none() {
        assert!(collect(&fixture(), EntityKind::Task, "ghost").is_none());
    }

    #[test]
    fn remove_leaves_no_orphans_and_restore_is_exact() {
        let mut db = fixture();
        let before = db.clone();
        let set = collect(&db, EntityKind::Project, "p1").unwrap();

        let removed = remove(&mut db, &set);
        assert_eq!(removed.len(), 6);
        assert!(orphans(&db).is_empty());
        assert_eq!(db.counts().tasks, 1);

        restore(&mut db, removed);
        assert_eq!(db, before);
    }

    #[test]
    fn interleaved_positions_restore_in_place() {
        let mut db = fixture();
        // Move t4 between the p1 tasks so removed rows are not contiguous.
        let t4 = db.tasks.remove(3);
        db.tasks.insert(1, t4);
        let before = db.clone();

        let set = collect(&db, EntityKind::Board, "b1").unwrap();
        let removed = remove(&mut db, &set);
        assert_eq!(db.tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t4", "t3"]);

        restore(&mut db, removed);
        assert_eq!(db, before);
    }
}
