//! Shared field types for projects, boards and tasks.
//!
//! This module defines the small structured records that hang off the main
//! entities: labels, assignees, checklists, comments, attachments, recurrence
//! and reminder descriptors, workflow references and the free-form
//! configuration map carried by projects and boards.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three entity tables held by the cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    #[serde(alias = "Project")]
    Project,
    #[serde(alias = "Board")]
    Board,
    #[serde(alias = "Task")]
    Task,
}

impl EntityKind {
    /// Prefix used for temporary identifiers (`project-<millis>-<n>`).
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Board => "board",
            EntityKind::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A colored tag attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// A label as supplied by the UI or the remote service: either a bare name
/// or a partially filled record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelInput {
    Name(String),
    Record {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl LabelInput {
    pub fn name(&self) -> &str {
        match self {
            LabelInput::Name(name) => name,
            LabelInput::Record { name, .. } => name,
        }
    }
}

impl From<&str> for LabelInput {
    fn from(name: &str) -> Self {
        LabelInput::Name(name.to_string())
    }
}

impl From<Label> for LabelInput {
    fn from(label: Label) -> Self {
        LabelInput::Record { id: Some(label.id), name: label.name, color: Some(label.color) }
    }
}

/// A person a task is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// A named, ordered list of checklist entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
}

impl Checklist {
    /// Number of completed entries out of the total.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.items.iter().filter(|i| i.completed).count();
        (done, self.items.len())
    }
}

/// A comment left on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: String,
    #[serde(default)]
    pub avatar: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Whether an attachment is an uploaded file or an external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    File,
    Link,
}

/// A file or link attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// How often a task repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    pub frequency: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

fn default_interval() -> u32 {
    1
}

/// When to remind the assignees about a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remind_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_before: Option<u32>,
}

/// Reference to an automation workflow attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Free-form settings carried by projects and boards.
///
/// Merging is additive: keys absent from the incoming config are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

impl EntityConfig {
    /// Merge `other` into `self` without dropping keys `other` leaves out.
    pub fn merge(&mut self, other: &EntityConfig) {
        for (k, v) in &other.settings {
            self.settings.insert(k.clone(), v.clone());
        }
        if let Some(incoming) = &other.credentials {
            let creds = self.credentials.get_or_insert_with(BTreeMap::new);
            for (k, v) in incoming {
                creds.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Merge an optional incoming config into an optional existing one.
pub fn merge_config(existing: &mut Option<EntityConfig>, incoming: &EntityConfig) {
    match existing {
        Some(cfg) => cfg.merge(incoming),
        None => *existing = Some(incoming.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_merge_keeps_unspecified_keys() {
        let mut base: EntityConfig = serde_json::from_value(json!({
            "theme": "dark",
            "wip": 3,
            "credentials": {"slack": "abc"}
        }))
        .unwrap();
        let patch: EntityConfig = serde_json::from_value(json!({
            "wip": 5,
            "credentials": {"github": "xyz"}
        }))
        .unwrap();

        base.merge(&patch);

        assert_eq!(base.settings["theme"], json!("dark"));
        assert_eq!(base.settings["wip"], json!(5));
        let creds = base.credentials.unwrap();
        assert_eq!(creds["slack"], "abc");
        assert_eq!(creds["github"], "xyz");
    }

    #[test]
    fn merge_into_missing_config_adopts_incoming() {
        let mut existing = None;
        let incoming: EntityConfig = serde_json::from_value(json!({"a": 1})).unwrap();
        merge_config(&mut existing, &incoming);
        assert_eq!(existing, Some(incoming));
    }

    #[test]
    fn label_input_accepts_both_shapes() {
        let inputs: Vec<LabelInput> =
            serde_json::from_value(json!(["Design", {"name": "Backend", "color": "bg-green-500"}]))
                .unwrap();
        assert_eq!(inputs[0], LabelInput::Name("Design".into()));
        assert_eq!(inputs[1].name(), "Backend");
    }

    #[test]
    fn checklist_progress_counts_completed() {
        let list = Checklist {
            name: "Release".into(),
            items: vec![
                ChecklistItem { text: "tag".into(), completed: true },
                ChecklistItem { text: "publish".into(), completed: false },
            ],
        };
        assert_eq!(list.progress(), (1, 2));
    }
}
