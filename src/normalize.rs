//! Conversion of loosely shaped records into canonical entities.
//!
//! The remote service is not consistent about shapes: labels arrive as bare
//! strings or as records, dates as RFC 3339 strings, plain `YYYY-MM-DD`
//! strings or epoch milliseconds, keys in camelCase or snake_case, and
//! optional arrays are sometimes missing or `null`. Everything here is a
//! plain function of its inputs; running a normalized record through again
//! yields the same record.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::fields::*;
use crate::project::{Board, Project, DEFAULT_BOARD_ICON, DEFAULT_ICON_COLOR, DEFAULT_PROJECT_ICON};
use crate::task::{Task, DEFAULT_PRIORITY, DEFAULT_STATUS};

/// Previously seen label colors, keyed by lowercased label name.
pub type LabelHints = HashMap<String, String>;

pub const DEFAULT_LABEL_COLOR: &str = "bg-gray-500";

/// Colors for label names common enough to deserve a fixed choice.
const LABEL_COLORS: &[(&str, &str)] = &[
    ("bug", "bg-red-500"),
    ("urgent", "bg-red-600"),
    ("feature", "bg-blue-500"),
    ("enhancement", "bg-indigo-500"),
    ("design", "bg-purple-500"),
    ("frontend", "bg-cyan-500"),
    ("backend", "bg-emerald-500"),
    ("documentation", "bg-yellow-500"),
    ("docs", "bg-yellow-500"),
    ("research", "bg-pink-500"),
    ("testing", "bg-teal-500"),
    ("marketing", "bg-orange-500"),
];

/// Fixed-table color for a label name, if it is a well-known one.
pub fn table_color(name: &str) -> Option<&'static str> {
    let key = name.trim().to_lowercase();
    LABEL_COLORS.iter().find(|(n, _)| *n == key).map(|(_, c)| *c)
}

/// Key under which a label name is looked up in [`LabelHints`].
pub fn hint_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Unify label inputs into canonical labels.
///
/// Color priority: explicit color, then `hints`, then the fixed table, then
/// [`DEFAULT_LABEL_COLOR`]. Entries with a blank name are dropped. Missing
/// ids become `label-<owner_id>-<index>` where `index` is the position in
/// `raw`.
pub fn normalize_labels(raw: &[LabelInput], owner_id: &str, hints: &LabelHints) -> Vec<Label> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, input)| {
            let name = input.name().trim();
            if name.is_empty() {
                return None;
            }
            let (id, explicit) = match input {
                LabelInput::Name(_) => (None, None),
                LabelInput::Record { id, color, .. } => (
                    id.as_deref().filter(|s| !s.trim().is_empty()),
                    color.as_deref().filter(|s| !s.trim().is_empty()),
                ),
            };
            let color = explicit
                .map(str::to_string)
                .or_else(|| hints.get(&hint_key(name)).cloned())
                .or_else(|| table_color(name).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string());
            Some(Label {
                id: id.map(str::to_string).unwrap_or_else(|| format!("label-{owner_id}-{index}")),
                name: name.to_string(),
                color,
            })
        })
        .collect()
}

/// Read a `labels` value of any shape. Non-arrays yield nothing; elements
/// that are neither strings nor objects are skipped.
pub fn labels_from_value(raw: Option<&Value>) -> Vec<LabelInput> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(LabelInput::Name(s.clone())),
            Value::Object(obj) => Some(LabelInput::Record {
                id: obj.get("id").and_then(Value::as_str).map(str::to_string),
                name: obj.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                color: obj.get("color").and_then(Value::as_str).map(str::to_string),
            }),
            _ => None,
        })
        .collect()
}

/// A date in any of the shapes the UI or the service may hand over.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Parsed(DateTime<Utc>),
    Text(String),
    Millis(i64),
}

impl DateInput {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(DateInput::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(DateInput::Millis),
            _ => None,
        }
    }
}

impl From<DateTime<Utc>> for DateInput {
    fn from(dt: DateTime<Utc>) -> Self {
        DateInput::Parsed(dt)
    }
}

impl From<&str> for DateInput {
    fn from(s: &str) -> Self {
        DateInput::Text(s.to_string())
    }
}

/// Coerce a date input into a UTC timestamp. Parsed dates pass through
/// unchanged; unparseable text yields `None`.
pub fn coerce_date(input: &DateInput) -> Option<DateTime<Utc>> {
    match input {
        DateInput::Parsed(dt) => Some(*dt),
        DateInput::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
        DateInput::Text(s) => parse_date_str(s),
    }
}

/// Parse RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (taken as UTC) or a
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Stable wire format for outgoing dates.
pub fn wire_date(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fresh identifier for records that arrive without one.
pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// First non-null value among `keys`.
fn field<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| raw.get(*k)).find(|v| !v.is_null())
}

fn str_field(raw: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match field(raw, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn date_field(raw: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    field(raw, keys).and_then(DateInput::from_value).and_then(|d| coerce_date(&d))
}

/// Elements of an array field; missing or non-array fields yield nothing.
fn array_field<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    match field(raw, keys) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn config_field(raw: &Map<String, Value>) -> Option<EntityConfig> {
    match field(raw, &["config", "configuration"])? {
        Value::Object(obj) => {
            let value = Value::Object(obj.clone());
            Some(serde_json::from_value(value).unwrap_or_else(|_| {
                let mut settings: std::collections::BTreeMap<String, Value> =
                    obj.clone().into_iter().collect();
                settings.remove("credentials");
                EntityConfig { credentials: None, settings }
            }))
        }
        _ => None,
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

fn as_object(raw: &Value) -> &Map<String, Value> {
    raw.as_object().unwrap_or_else(|| empty_map())
}

fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|w| w.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

fn assignee_from_value(value: &Value) -> Option<Assignee> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Assignee {
            id: s.clone(),
            name: s.clone(),
            avatar: initials(s),
            email: None,
        }),
        Value::Object(obj) => {
            let id = non_empty(str_field(obj, &["id", "userId", "user_id"]))?;
            let name = str_field(obj, &["name", "displayName"]).unwrap_or_else(|| id.clone());
            let avatar = str_field(obj, &["avatar"]).unwrap_or_else(|| initials(&name));
            Some(Assignee { id, name, avatar, email: non_empty(str_field(obj, &["email"])) })
        }
        _ => None,
    }
}

fn checklist_from_value(value: &Value) -> Option<Checklist> {
    let obj = value.as_object()?;
    let items = array_field(obj, &["items"])
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(ChecklistItem { text: text.clone(), completed: false }),
            Value::Object(o) => Some(ChecklistItem {
                text: str_field(o, &["text", "title"])?,
                completed: field(o, &["completed", "done"]).and_then(Value::as_bool).unwrap_or(false),
            }),
            _ => None,
        })
        .collect();
    Some(Checklist { name: str_field(obj, &["name", "title"]).unwrap_or_default(), items })
}

fn comment_from_value(value: &Value, now: DateTime<Utc>) -> Option<Comment> {
    let obj = value.as_object()?;
    Some(Comment {
        author: str_field(obj, &["author", "user"]).unwrap_or_default(),
        avatar: str_field(obj, &["avatar"]).unwrap_or_default(),
        text: str_field(obj, &["text", "content"])?,
        timestamp: date_field(obj, &["timestamp", "createdAt", "created_at"]).unwrap_or(now),
    })
}

fn attachment_from_value(value: &Value) -> Option<Attachment> {
    let obj = value.as_object()?;
    let url = non_empty(str_field(obj, &["url"]))?;
    let kind = match str_field(obj, &["type", "kind"]).as_deref() {
        Some("link") => AttachmentKind::Link,
        _ => AttachmentKind::File,
    };
    Some(Attachment {
        name: str_field(obj, &["name"]).unwrap_or_else(|| url.clone()),
        kind,
        url,
        size: field(obj, &["size"]).and_then(Value::as_u64),
    })
}

fn workflow_from_value(value: &Value) -> Option<WorkflowRef> {
    match value {
        Value::String(id) if !id.is_empty() => Some(WorkflowRef { id: id.clone(), name: None }),
        Value::Object(obj) => Some(WorkflowRef {
            id: non_empty(str_field(obj, &["id", "workflowId", "workflow_id"]))?,
            name: str_field(obj, &["name"]),
        }),
        _ => None,
    }
}

/// Normalize a raw task record.
///
/// A record lacking both `id` and `taskId` gets one fresh identifier used
/// for both, so every cached task is addressable.
pub fn normalize_task(raw: &Value, hints: &LabelHints, now: DateTime<Utc>) -> Task {
    let obj = as_object(raw);
    let id = non_empty(str_field(obj, &["id"]));
    let task_id = non_empty(str_field(obj, &["taskId", "task_id"]));
    let (id, task_id) = match (id, task_id) {
        (Some(id), Some(task_id)) => (id, task_id),
        (Some(id), None) => (id.clone(), id),
        (None, Some(task_id)) => (task_id.clone(), task_id),
        (None, None) => {
            let fresh = fresh_id();
            (fresh.clone(), fresh)
        }
    };

    let labels = normalize_labels(&labels_from_value(field(obj, &["labels", "tags"])), &id, hints);
    let workflows: Vec<WorkflowRef> = array_field(obj, &["workflows", "attachedWorkflows", "attached_workflows"])
        .iter()
        .filter_map(workflow_from_value)
        .collect();
    let has_workflow = field(obj, &["hasWorkflow", "has_workflow"])
        .and_then(Value::as_bool)
        .unwrap_or(false)
        || !workflows.is_empty();

    Task {
        name: str_field(obj, &["name", "title"]).unwrap_or_default(),
        description: str_field(obj, &["description"]).unwrap_or_default(),
        assignees: array_field(obj, &["assignees"]).iter().filter_map(assignee_from_value).collect(),
        status: non_empty(str_field(obj, &["status"])).unwrap_or_else(|| DEFAULT_STATUS.into()),
        priority: non_empty(str_field(obj, &["priority"])).unwrap_or_else(|| DEFAULT_PRIORITY.into()),
        labels,
        due_date: date_field(obj, &["dueDate", "due_date"]),
        start_date: date_field(obj, &["startDate", "start_date"]),
        recurrence: field(obj, &["recurrence"]).and_then(|v| serde_json::from_value(v.clone()).ok()),
        reminder: field(obj, &["reminder"]).and_then(|v| serde_json::from_value(v.clone()).ok()),
        has_workflow,
        checklists: array_field(obj, &["checklists"]).iter().filter_map(checklist_from_value).collect(),
        comments: array_field(obj, &["comments"])
            .iter()
            .filter_map(|c| comment_from_value(c, now))
            .collect(),
        attachments: array_field(obj, &["attachments"]).iter().filter_map(attachment_from_value).collect(),
        workflows,
        board_id: str_field(obj, &["boardId", "board_id"]).unwrap_or_default(),
        project_id: str_field(obj, &["projectId", "project_id"]).unwrap_or_default(),
        created_by: non_empty(str_field(obj, &["createdBy", "created_by", "userId", "user_id"])),
        created_at: date_field(obj, &["createdAt", "created_at"]).unwrap_or(now),
        updated_at: date_field(obj, &["updatedAt", "updated_at"]).unwrap_or(now),
        order: field(obj, &["order", "position"]).and_then(Value::as_f64),
        id,
        task_id,
    }
}

/// Normalize a raw project record.
pub fn normalize_project(raw: &Value, now: DateTime<Utc>) -> Project {
    let obj = as_object(raw);
    Project {
        id: non_empty(str_field(obj, &["id"])).unwrap_or_else(fresh_id),
        name: str_field(obj, &["name"]).unwrap_or_default(),
        description: str_field(obj, &["description"]),
        icon: non_empty(str_field(obj, &["icon"])).unwrap_or_else(|| DEFAULT_PROJECT_ICON.into()),
        icon_color: non_empty(str_field(obj, &["iconColor", "icon_color"]))
            .unwrap_or_else(|| DEFAULT_ICON_COLOR.into()),
        created_at: date_field(obj, &["createdAt", "created_at"]).unwrap_or(now),
        updated_at: date_field(obj, &["updatedAt", "updated_at"]),
        user_id: non_empty(str_field(obj, &["userId", "user_id"])),
        config: config_field(obj),
    }
}

/// Normalize a raw board record.
pub fn normalize_board(raw: &Value, now: DateTime<Utc>) -> Board {
    let obj = as_object(raw);
    Board {
        id: non_empty(str_field(obj, &["id"])).unwrap_or_else(fresh_id),
        name: str_field(obj, &["name"]).unwrap_or_default(),
        description: str_field(obj, &["description"]),
        icon: non_empty(str_field(obj, &["icon"])).unwrap_or_else(|| DEFAULT_BOARD_ICON.into()),
        icon_color: non_empty(str_field(obj, &["iconColor", "icon_color"]))
            .unwrap_or_else(|| DEFAULT_ICON_COLOR.into()),
        project_id: str_field(obj, &["projectId", "project_id"]).unwrap_or_default(),
        created_at: date_field(obj, &["createdAt", "created_at"]).unwrap_or(now),
        updated_at: date_field(obj, &["updatedAt", "updated_at"]).unwrap_or(now),
        config: config_field(obj),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn mixed_label_shapes_converge() {
        let raw = json!({
            "id": "t1",
            "labels": ["Design", {"name": "Backend", "color": "bg-green-500"}]
        });
        let task = normalize_task(&raw, &LabelHints::new(), at());

        assert_eq!(task.labels.len(), 2);
        assert_eq!(task.labels[0].name, "Design");
        assert_eq!(task.labels[0].color, table_color("Design").unwrap());
        assert_eq!(task.labels[0].id, "label-t1-0");
        assert_eq!(task.labels[1].color, "bg-green-500");
    }

    #[rstest]
    #[case::explicit_wins(Some("bg-black"), Some("bg-white"), "bg-black")]
    #[case::hint_beats_table(None, Some("bg-white"), "bg-white")]
    #[case::table_fallback(None, None, "bg-red-500")]
    fn label_color_priority(#[case] explicit: Option<&str>, #[case] hint: Option<&str>, #[case] expected: &str) {
        let mut hints = LabelHints::new();
        if let Some(h) = hint {
            hints.insert(hint_key("Bug"), h.to_string());
        }
        let input = LabelInput::Record { id: None, name: "Bug".into(), color: explicit.map(str::to_string) };
        let labels = normalize_labels(&[input], "t", &hints);
        assert_eq!(labels[0].color, expected);
    }

    #[test]
    fn unknown_label_gets_default_color_and_blank_names_drop() {
        let labels = normalize_labels(&["  ".into(), "Quux".into()], "t9", &LabelHints::new());
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].color, DEFAULT_LABEL_COLOR);
        assert_eq!(labels[0].id, "label-t9-1");
    }

    #[rstest]
    #[case::rfc3339("2026-03-04T05:06:07Z")]
    #[case::offset("2026-03-04T07:06:07+02:00")]
    #[case::naive("2026-03-04 05:06:07")]
    fn date_strings_coerce(#[case] text: &str) {
        let expected = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(coerce_date(&DateInput::Text(text.into())), Some(expected));
    }

    #[test]
    fn parsed_dates_pass_through_and_millis_convert() {
        let dt = at();
        assert_eq!(coerce_date(&DateInput::Parsed(dt)), Some(dt));
        assert_eq!(coerce_date(&DateInput::Millis(dt.timestamp_millis())), Some(dt));
        assert_eq!(coerce_date(&DateInput::Text("not a date".into())), None);
    }

    #[test]
    fn missing_collections_become_empty() {
        let raw = json!({"id": "t1", "checklists": null, "comments": "oops", "boardId": "b1"});
        let task = normalize_task(&raw, &LabelHints::new(), at());
        assert!(task.checklists.is_empty());
        assert!(task.comments.is_empty());
        assert!(task.attachments.is_empty());
        assert!(task.workflows.is_empty());
        assert!(task.assignees.is_empty());
        assert_eq!(task.created_at, at());
        assert!(task.due_date.is_none());
    }

    #[test]
    fn missing_ids_share_one_fresh_identifier() {
        let task = normalize_task(&json!({"name": "orphan"}), &LabelHints::new(), at());
        assert!(!task.id.is_empty());
        assert_eq!(task.id, task.task_id);

        let other = normalize_task(&json!({"name": "orphan"}), &LabelHints::new(), at());
        assert_ne!(task.id, other.id);
    }

    #[test]
    fn snake_case_records_are_accepted() {
        let raw = json!({
            "id": "t1",
            "task_id": "ENG-4",
            "board_id": "b1",
            "project_id": "p1",
            "due_date": "2026-12-01",
            "assignees": ["Ana Lopez"],
            "attachments": [{"name": "mockup", "kind": "link", "url": "https://x"}, {"name": "no url"}]
        });
        let task = normalize_task(&raw, &LabelHints::new(), at());
        assert_eq!(task.task_id, "ENG-4");
        assert_eq!(task.board_id, "b1");
        assert_eq!(task.assignees[0].avatar, "AL");
        assert_eq!(task.attachments.len(), 1);
        assert_eq!(task.attachments[0].kind, AttachmentKind::Link);
        assert!(task.due_date.is_some());
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let raw = json!({
            "taskId": "ENG-1",
            "labels": ["Design", {"name": "Backend"}, ""],
            "dueDate": "2026-11-02",
            "checklists": [{"name": "QA", "items": ["smoke", {"text": "e2e", "completed": true}]}],
            "comments": [{"author": "ana", "text": "hi"}],
            "workflows": ["wf-1"],
            "boardId": "b1",
            "projectId": "p1"
        });
        let hints = LabelHints::new();
        let once = normalize_task(&raw, &hints, at());
        let twice = normalize_task(&serde_json::to_value(&once).unwrap(), &hints, at());
        assert_eq!(once, twice);
        assert!(once.has_workflow);

        let project = normalize_project(&json!({"id": "p1", "config": {"wip": 3}}), at());
        let again = normalize_project(&serde_json::to_value(&project).unwrap(), at());
        assert_eq!(project, again);
    }

    #[test]
    fn wire_dates_use_millisecond_precision() {
        assert_eq!(wire_date(at()), "2026-10-19T12:00:00.000Z");
    }
}
