//! Task data structure and related functionality.
//!
//! This module defines the canonical `Task` record held by the cache, the
//! `NewTask` draft the UI submits for creation and the `TaskPatch` used for
//! partial updates. Every task belongs to one board and, through it, to one
//! project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::*;
use crate::normalize::{coerce_date, normalize_labels, DateInput, LabelHints};
use crate::project::{insert_date, insert_opt};

pub const DEFAULT_STATUS: &str = "To do";
pub const DEFAULT_PRIORITY: &str = "Medium";

/// A work item with comprehensive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Human-facing display code, distinct from `id`.
    pub task_id: String,
    pub name: String,
    pub description: String,
    pub assignees: Vec<Assignee>,
    pub status: String,
    pub priority: String,
    pub labels: Vec<Label>,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    pub reminder: Option<Reminder>,
    pub has_workflow: bool,
    pub checklists: Vec<Checklist>,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
    pub workflows: Vec<WorkflowRef>,
    pub board_id: String,
    pub project_id: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Manual position within a status column.
    pub order: Option<f64>,
}

impl Task {
    /// Whether `user_id` is assigned to or created this task.
    pub fn touches_user(&self, user_id: &str) -> bool {
        self.created_by.as_deref() == Some(user_id)
            || self.assignees.iter().any(|a| a.id == user_id)
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &TaskPatch, hints: &LabelHints, now: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(desc) = &patch.description {
            self.description = desc.clone();
        }
        if let Some(assignees) = &patch.assignees {
            self.assignees = assignees.clone();
        }
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        if let Some(priority) = &patch.priority {
            self.priority = priority.clone();
        }
        if let Some(labels) = &patch.labels {
            self.labels = normalize_labels(labels, &self.id, hints);
        }
        if let Some(due) = &patch.due_date {
            self.due_date = due.as_ref().and_then(coerce_date);
        }
        if let Some(start) = &patch.start_date {
            self.start_date = start.as_ref().and_then(coerce_date);
        }
        if let Some(rec) = &patch.recurrence {
            self.recurrence = rec.clone();
        }
        if let Some(rem) = &patch.reminder {
            self.reminder = rem.clone();
        }
        if let Some(flag) = patch.has_workflow {
            self.has_workflow = flag;
        }
        if let Some(lists) = &patch.checklists {
            self.checklists = lists.clone();
        }
        if let Some(comments) = &patch.comments {
            self.comments = comments.clone();
        }
        if let Some(attachments) = &patch.attachments {
            self.attachments = attachments.clone();
        }
        if let Some(workflows) = &patch.workflows {
            self.workflows = workflows.clone();
        }
        if let Some(order) = patch.order {
            self.order = Some(order);
        }
        self.updated_at = now;
    }
}

/// Fields supplied by the UI when creating a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    /// Display code; generated from the identifier when absent.
    pub task_id: Option<String>,
    pub name: String,
    pub description: String,
    pub assignees: Vec<Assignee>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub labels: Vec<LabelInput>,
    pub due_date: Option<DateInput>,
    pub start_date: Option<DateInput>,
    pub recurrence: Option<Recurrence>,
    pub reminder: Option<Reminder>,
    pub has_workflow: bool,
    pub checklists: Vec<Checklist>,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
    pub workflows: Vec<WorkflowRef>,
    pub board_id: String,
    pub project_id: String,
    pub created_by: Option<String>,
    pub order: Option<f64>,
}

impl NewTask {
    pub fn new(name: impl Into<String>, board_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        NewTask {
            name: name.into(),
            board_id: board_id.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    /// Local stand-in shown until the service confirms the create.
    pub fn provisional(&self, id: &str, hints: &LabelHints, now: DateTime<Utc>) -> Task {
        Task {
            id: id.to_string(),
            task_id: self.task_id.clone().unwrap_or_else(|| id.to_string()),
            name: self.name.clone(),
            description: self.description.clone(),
            assignees: self.assignees.clone(),
            status: self.status.clone().unwrap_or_else(|| DEFAULT_STATUS.into()),
            priority: self.priority.clone().unwrap_or_else(|| DEFAULT_PRIORITY.into()),
            labels: normalize_labels(&self.labels, id, hints),
            due_date: self.due_date.as_ref().and_then(coerce_date),
            start_date: self.start_date.as_ref().and_then(coerce_date),
            recurrence: self.recurrence.clone(),
            reminder: self.reminder.clone(),
            has_workflow: self.has_workflow || !self.workflows.is_empty(),
            checklists: self.checklists.clone(),
            comments: self.comments.clone(),
            attachments: self.attachments.clone(),
            workflows: self.workflows.clone(),
            board_id: self.board_id.clone(),
            project_id: self.project_id.clone(),
            created_by: self.created_by.clone(),
            created_at: now,
            updated_at: now,
            order: self.order,
        }
    }

    /// Request body for the remote create call. Labels go out as bare names
    /// and dates as RFC 3339 strings.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        insert_opt(&mut body, "taskId", self.task_id.clone());
        body.insert("name".into(), Value::from(self.name.clone()));
        body.insert("description".into(), Value::from(self.description.clone()));
        body.insert("assignees".into(), to_json(&self.assignees));
        insert_opt(&mut body, "status", self.status.clone());
        insert_opt(&mut body, "priority", self.priority.clone());
        body.insert("labels".into(), label_names(&self.labels));
        insert_date(&mut body, "dueDate", self.due_date.as_ref().and_then(coerce_date));
        insert_date(&mut body, "startDate", self.start_date.as_ref().and_then(coerce_date));
        if let Some(rec) = &self.recurrence {
            body.insert("recurrence".into(), to_json(rec));
        }
        if let Some(rem) = &self.reminder {
            body.insert("reminder".into(), to_json(rem));
        }
        body.insert("hasWorkflow".into(), Value::from(self.has_workflow || !self.workflows.is_empty()));
        body.insert("checklists".into(), to_json(&self.checklists));
        body.insert("comments".into(), to_json(&self.comments));
        body.insert("attachments".into(), to_json(&self.attachments));
        body.insert("workflows".into(), to_json(&self.workflows));
        body.insert("boardId".into(), Value::from(self.board_id.clone()));
        body.insert("projectId".into(), Value::from(self.project_id.clone()));
        insert_opt(&mut body, "createdBy", self.created_by.clone());
        if let Some(order) = self.order {
            body.insert("order".into(), Value::from(order));
        }
        Value::Object(body)
    }
}

/// Partial update of a task. `None` leaves a field untouched; for clearable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub assignees: Option<Vec<Assignee>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub labels: Option<Vec<LabelInput>>,
    pub due_date: Option<Option<DateInput>>,
    pub start_date: Option<Option<DateInput>>,
    pub recurrence: Option<Option<Recurrence>>,
    pub reminder: Option<Option<Reminder>>,
    pub has_workflow: Option<bool>,
    pub checklists: Option<Vec<Checklist>>,
    pub comments: Option<Vec<Comment>>,
    pub attachments: Option<Vec<Attachment>>,
    pub workflows: Option<Vec<WorkflowRef>>,
    pub order: Option<f64>,
}

impl TaskPatch {
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        insert_opt(&mut body, "name", self.name.clone());
        insert_opt(&mut body, "description", self.description.clone());
        if let Some(assignees) = &self.assignees {
            body.insert("assignees".into(), to_json(assignees));
        }
        insert_opt(&mut body, "status", self.status.clone());
        insert_opt(&mut body, "priority", self.priority.clone());
        if let Some(labels) = &self.labels {
            body.insert("labels".into(), label_names(labels));
        }
        if let Some(due) = &self.due_date {
            body.insert("dueDate".into(), clearable_date(due));
        }
        if let Some(start) = &self.start_date {
            body.insert("startDate".into(), clearable_date(start));
        }
        if let Some(rec) = &self.recurrence {
            body.insert("recurrence".into(), rec.as_ref().map(to_json).unwrap_or(Value::Null));
        }
        if let Some(rem) = &self.reminder {
            body.insert("reminder".into(), rem.as_ref().map(to_json).unwrap_or(Value::Null));
        }
        if let Some(flag) = self.has_workflow {
            body.insert("hasWorkflow".into(), Value::from(flag));
        }
        if let Some(lists) = &self.checklists {
            body.insert("checklists".into(), to_json(lists));
        }
        if let Some(comments) = &self.comments {
            body.insert("comments".into(), to_json(comments));
        }
        if let Some(attachments) = &self.attachments {
            body.insert("attachments".into(), to_json(attachments));
        }
        if let Some(workflows) = &self.workflows {
            body.insert("workflows".into(), to_json(workflows));
        }
        if let Some(order) = self.order {
            body.insert("order".into(), Value::from(order));
        }
        Value::Object(body)
    }
}

fn label_names(labels: &[LabelInput]) -> Value {
    Value::Array(
        labels
            .iter()
            .map(|l| l.name().trim())
            .filter(|n| !n.is_empty())
            .map(Value::from)
            .collect(),
    )
}

fn clearable_date(input: &Option<DateInput>) -> Value {
    input
        .as_ref()
        .and_then(coerce_date)
        .map(|dt| Value::from(crate::normalize::wire_date(dt)))
        .unwrap_or(Value::Null)
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft() -> NewTask {
        NewTask {
            labels: vec!["Design".into(), LabelInput::Record {
                id: None,
                name: "Backend".into(),
                color: Some("bg-green-500".into()),
            }],
            due_date: Some(DateInput::Text("2026-11-02".into())),
            ..NewTask::new("Ship it", "b1", "p1")
        }
    }

    #[test]
    fn payload_serializes_labels_as_names_and_dates_as_strings() {
        let body = draft().payload();
        assert_eq!(body["labels"], json!(["Design", "Backend"]));
        assert_eq!(body["dueDate"], json!("2026-11-02T00:00:00.000Z"));
        assert_eq!(body["boardId"], json!("b1"));
        assert!(body.get("status").is_none());
    }

    #[test]
    fn provisional_task_uses_temp_id_for_display_code() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        let t = draft().provisional("task-1-0", &LabelHints::new(), now);
        assert_eq!(t.task_id, "task-1-0");
        assert_eq!(t.status, DEFAULT_STATUS);
        assert_eq!(t.labels[0].id, "label-task-1-0-0");
        assert_eq!(t.labels[1].color, "bg-green-500");
        assert_eq!(t.due_date, Some(Utc.with_ymd_and_hms(2026, 11, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn patch_clears_due_date_with_null() {
        let patch = TaskPatch { due_date: Some(None), ..Default::default() };
        assert_eq!(patch.payload(), json!({"dueDate": null}));

        let now = Utc::now();
        let mut t = draft().provisional("t1", &LabelHints::new(), now);
        t.apply(&patch, &LabelHints::new(), now);
        assert!(t.due_date.is_none());
    }

    #[test]
    fn touches_user_matches_assignee_or_creator() {
        let mut t = draft().provisional("t1", &LabelHints::new(), Utc::now());
        t.created_by = Some("u1".into());
        t.assignees.push(Assignee { id: "u2".into(), name: "Ana".into(), avatar: "A".into(), email: None });
        assert!(t.touches_user("u1"));
        assert!(t.touches_user("u2"));
        assert!(!t.touches_user("u3"));
    }
}
