//! Projects and boards.
//!
//! A project owns any number of boards; a board belongs to exactly one
//! project through its `project_id`. Both carry an optional free-form
//! configuration map that merges additively on update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::{merge_config, EntityConfig};
use crate::normalize::wire_date;

pub const DEFAULT_PROJECT_ICON: &str = "folder";
pub const DEFAULT_BOARD_ICON: &str = "layout";
pub const DEFAULT_ICON_COLOR: &str = "text-blue-500";

/// A top-level container of boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub icon: String,
    pub icon_color: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EntityConfig>,
}

/// A column set / workspace under a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub icon: String,
    pub icon_color: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EntityConfig>,
}

/// Fields supplied by the UI when creating a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
    pub user_id: Option<String>,
    pub config: Option<EntityConfig>,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        NewProject { name: name.into(), ..Default::default() }
    }

    /// Local stand-in shown until the service confirms the create.
    pub fn provisional(&self, id: &str, now: DateTime<Utc>) -> Project {
        Project {
            id: id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone().unwrap_or_else(|| DEFAULT_PROJECT_ICON.into()),
            icon_color: self.icon_color.clone().unwrap_or_else(|| DEFAULT_ICON_COLOR.into()),
            created_at: now,
            updated_at: Some(now),
            user_id: self.user_id.clone(),
            config: self.config.clone(),
        }
    }

    /// Request body for the remote create call.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), Value::from(self.name.clone()));
        insert_opt(&mut body, "description", self.description.clone());
        insert_opt(&mut body, "icon", self.icon.clone());
        insert_opt(&mut body, "iconColor", self.icon_color.clone());
        insert_opt(&mut body, "userId", self.user_id.clone());
        if let Some(cfg) = &self.config {
            body.insert("config".into(), serde_json::to_value(cfg).unwrap_or(Value::Null));
        }
        Value::Object(body)
    }
}

/// Partial update of a project. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
    pub config: Option<EntityConfig>,
}

impl ProjectPatch {
    pub fn apply(&self, project: &mut Project, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(desc) = &self.description {
            project.description = desc.clone();
        }
        if let Some(icon) = &self.icon {
            project.icon = icon.clone();
        }
        if let Some(color) = &self.icon_color {
            project.icon_color = color.clone();
        }
        if let Some(cfg) = &self.config {
            merge_config(&mut project.config, cfg);
        }
        project.updated_at = Some(now);
    }

    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        insert_opt(&mut body, "name", self.name.clone());
        if let Some(desc) = &self.description {
            body.insert("description".into(), desc.clone().map(Value::from).unwrap_or(Value::Null));
        }
        insert_opt(&mut body, "icon", self.icon.clone());
        insert_opt(&mut body, "iconColor", self.icon_color.clone());
        if let Some(cfg) = &self.config {
            body.insert("config".into(), serde_json::to_value(cfg).unwrap_or(Value::Null));
        }
        Value::Object(body)
    }
}

/// Fields supplied by the UI when creating a board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBoard {
    pub name: String,
    pub project_id: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
    pub config: Option<EntityConfig>,
}

impl NewBoard {
    pub fn new(name: impl Into<String>, project_id: impl Into<String>) -> Self {
        NewBoard { name: name.into(), project_id: project_id.into(), ..Default::default() }
    }

    pub fn provisional(&self, id: &str, now: DateTime<Utc>) -> Board {
        Board {
            id: id.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone().unwrap_or_else(|| DEFAULT_BOARD_ICON.into()),
            icon_color: self.icon_color.clone().unwrap_or_else(|| DEFAULT_ICON_COLOR.into()),
            project_id: self.project_id.clone(),
            created_at: now,
            updated_at: now,
            config: self.config.clone(),
        }
    }

    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), Value::from(self.name.clone()));
        body.insert("projectId".into(), Value::from(self.project_id.clone()));
        insert_opt(&mut body, "description", self.description.clone());
        insert_opt(&mut body, "icon", self.icon.clone());
        insert_opt(&mut body, "iconColor", self.icon_color.clone());
        if let Some(cfg) = &self.config {
            body.insert("config".into(), serde_json::to_value(cfg).unwrap_or(Value::Null));
        }
        Value::Object(body)
    }
}

/// Partial update of a board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
    pub config: Option<EntityConfig>,
}

impl BoardPatch {
    pub fn apply(&self, board: &mut Board, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            board.name = name.clone();
        }
        if let Some(desc) = &self.description {
            board.description = desc.clone();
        }
        if let Some(icon) = &self.icon {
            board.icon = icon.clone();
        }
        if let Some(color) = &self.icon_color {
            board.icon_color = color.clone();
        }
        if let Some(cfg) = &self.config {
            merge_config(&mut board.config, cfg);
        }
        board.updated_at = now;
    }

    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        insert_opt(&mut body, "name", self.name.clone());
        if let Some(desc) = &self.description {
            body.insert("description".into(), desc.clone().map(Value::from).unwrap_or(Value::Null));
        }
        insert_opt(&mut body, "icon", self.icon.clone());
        insert_opt(&mut body, "iconColor", self.icon_color.clone());
        if let Some(cfg) = &self.config {
            body.insert("config".into(), serde_json::to_value(cfg).unwrap_or(Value::Null));
        }
        Value::Object(body)
    }
}

pub(crate) fn insert_opt(body: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        body.insert(key.to_string(), Value::from(v));
    }
}

/// Insert an optional timestamp in wire format.
pub(crate) fn insert_date(body: &mut Map<String, Value>, key: &str, value: Option<DateTime<Utc>>) {
    if let Some(dt) = value {
        body.insert(key.to_string(), Value::from(wire_date(dt)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_project() -> Project {
        NewProject::new("Launch").provisional("p1", Utc::now())
    }

    #[test]
    fn provisional_project_fills_display_defaults() {
        let p = sample_project();
        assert_eq!(p.icon, DEFAULT_PROJECT_ICON);
        assert_eq!(p.icon_color, DEFAULT_ICON_COLOR);
        assert!(p.updated_at.is_some());
    }

    #[test]
    fn patch_merges_config_additively() {
        let mut p = sample_project();
        p.config = Some(serde_json::from_value(json!({"theme": "dark"})).unwrap());
        let patch = ProjectPatch {
            config: Some(serde_json::from_value(json!({"wip": 4})).unwrap()),
            ..Default::default()
        };
        patch.apply(&mut p, Utc::now());

        let cfg = p.config.unwrap();
        assert_eq!(cfg.settings["theme"], json!("dark"));
        assert_eq!(cfg.settings["wip"], json!(4));
    }

    #[test]
    fn patch_payload_only_carries_set_fields() {
        let patch = ProjectPatch {
            name: Some("Renamed".into()),
            description: Some(None),
            ..Default::default()
        };
        assert_eq!(patch.payload(), json!({"name": "Renamed", "description": null}));
    }

    #[test]
    fn board_payload_uses_camel_case_foreign_key() {
        let body = NewBoard::new("Sprint", "p1").payload();
        assert_eq!(body["projectId"], json!("p1"));
        assert!(body.get("icon").is_none());
    }
}
