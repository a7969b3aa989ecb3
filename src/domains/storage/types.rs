use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::{DomainError, ValidationError};

/// Accepts epoch-ms integers, numeric strings, strict RFC3339, or a bare
/// `YYYY-MM-DD`/`YYYY-MM-DDTHH:MM:SS` date (assumed UTC) — the loose wire
/// formats a remote peer's note/todo payload may arrive in.
fn parse_flexible_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ms) = s.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0).unwrap(), Utc));
    }
    None
}

fn default_now() -> DateTime<Utc> {
    Utc::now()
}

/// `deserialize_with` for required timestamp fields on wire-format Note/Todo
/// payloads: accepts epoch-ms, numeric strings, or ISO-like strings.
fn deserialize_flexible_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    flexible_datetime_from_value(&value).ok_or_else(|| de::Error::custom(format!("not a recognizable timestamp: {}", value)))
}

fn deserialize_optional_flexible_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(flexible_datetime_from_value(&v)),
    }
}

fn flexible_datetime_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => parse_flexible_datetime_str(s),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Markdown,
    Whiteboard,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteKind::Markdown => "markdown",
            NoteKind::Whiteboard => "whiteboard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "markdown" => Some(NoteKind::Markdown),
            "whiteboard" => Some(NoteKind::Whiteboard),
            _ => None,
        }
    }

    /// The remote object extension this note kind is stored under.
    pub fn extension(&self) -> &'static str {
        match self {
            NoteKind::Markdown => ".md",
            NoteKind::Whiteboard => ".wb",
        }
    }
}

/// Wire/domain representation of a note. Field-level `deserialize_with`/
/// `default` attributes implement the loose-ingestion contract for payloads
/// arriving from a remote peer: timestamps accept epoch-ms, numeric
/// strings, or ISO-like strings, and missing fields fall back to
/// type-appropriate defaults rather than failing deserialization outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub sync_id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub kind: NoteKind,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(deserialize_with = "deserialize_flexible_datetime", default = "default_now")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_flexible_datetime", default = "default_now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(deserialize_with = "deserialize_optional_flexible_datetime", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub sync_id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub urgent: bool,
    #[serde(deserialize_with = "deserialize_optional_flexible_datetime", default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_optional_flexible_datetime", default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_time: bool,
    #[serde(default)]
    pub focus_seconds: i64,
    #[serde(default)]
    pub repeat_rule: Option<String>,
    #[serde(default)]
    pub parent_todo_id: Option<Uuid>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(deserialize_with = "deserialize_optional_flexible_datetime", default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_flexible_datetime", default = "default_now")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_flexible_datetime", default = "default_now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(deserialize_with = "deserialize_optional_flexible_datetime", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingValueType {
    String,
    Number,
    Boolean,
    Json,
}

impl SettingValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingValueType::String => "string",
            SettingValueType::Number => "number",
            SettingValueType::Boolean => "boolean",
            SettingValueType::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(SettingValueType::String),
            "number" => Some(SettingValueType::Number),
            "boolean" => Some(SettingValueType::Boolean),
            "json" | "object" | "array" => Some(SettingValueType::Json),
            _ => None,
        }
    }
}

/// Decodes a raw setting row into the declared type, producing the value
/// the StorageAdapter hands back from `get_all_settings`.
pub fn decode_setting(value_type: SettingValueType, raw: &str) -> Value {
    match value_type {
        SettingValueType::String => Value::String(raw.to_string()),
        SettingValueType::Number => serde_json::from_str::<f64>(raw).map(|n| json_number(n)).unwrap_or(Value::Null),
        SettingValueType::Boolean => Value::Bool(raw == "true" || raw == "1"),
        SettingValueType::Json => serde_json::from_str(raw).unwrap_or(Value::Null),
    }
}

fn json_number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Encodes a decoded value back to its declared type's raw storage form.
pub fn encode_setting(value: &Value) -> (SettingValueType, String) {
    match value {
        Value::String(s) => (SettingValueType::String, s.clone()),
        Value::Number(n) => (SettingValueType::Number, n.to_string()),
        Value::Bool(b) => (SettingValueType::Boolean, b.to_string()),
        other => (SettingValueType::Json, other.to_string()),
    }
}

fn parse_uuid(s: &str, field: &str) -> Result<Uuid, DomainError> {
    Uuid::parse_str(s).map_err(|_| DomainError::Validation(ValidationError::format(field, &format!("invalid uuid: {}", s))))
}

fn parse_optional_uuid(s: Option<String>, field: &str) -> Result<Option<Uuid>, DomainError> {
    s.map(|s| parse_uuid(&s, field)).transpose()
}

fn parse_datetime(s: &str, field: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DomainError::Validation(ValidationError::format(field, &format!("invalid rfc3339: {}", s))))
}

fn parse_optional_datetime(s: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
    s.map(|s| parse_datetime(&s, field)).transpose()
}

#[derive(Debug, Clone, FromRow)]
pub struct NoteRow {
    pub sync_id: String,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub tags: String,
    pub category: String,
    pub pinned: i64,
    pub favorite: i64,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: i64,
    pub deleted_at: Option<String>,
}

impl TryFrom<NoteRow> for Note {
    type Error = DomainError;
    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            sync_id: parse_uuid(&row.sync_id, "note.sync_id")?,
            title: row.title,
            body: row.body,
            kind: NoteKind::from_str(&row.kind)
                .ok_or_else(|| DomainError::Validation(ValidationError::format("note.kind", &row.kind)))?,
            tags: row.tags,
            category: row.category,
            pinned: row.pinned != 0,
            favorite: row.favorite != 0,
            created_at: parse_datetime(&row.created_at, "note.created_at")?,
            updated_at: parse_datetime(&row.updated_at, "note.updated_at")?,
            is_deleted: row.is_deleted != 0,
            deleted_at: parse_optional_datetime(row.deleted_at, "note.deleted_at")?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TodoRow {
    pub sync_id: String,
    pub content: String,
    pub description: String,
    pub tags: String,
    pub important: i64,
    pub urgent: i64,
    pub due_at: Option<String>,
    pub end_at: Option<String>,
    pub has_time: i64,
    pub focus_seconds: i64,
    pub repeat_rule: Option<String>,
    pub parent_todo_id: Option<String>,
    pub is_completed: i64,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: i64,
    pub deleted_at: Option<String>,
}

impl TryFrom<TodoRow> for Todo {
    type Error = DomainError;
    fn try_from(row: TodoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            sync_id: parse_uuid(&row.sync_id, "todo.sync_id")?,
            content: row.content,
            description: row.description,
            tags: row.tags,
            important: row.important != 0,
            urgent: row.urgent != 0,
            due_at: parse_optional_datetime(row.due_at, "todo.due_at")?,
            end_at: parse_optional_datetime(row.end_at, "todo.end_at")?,
            has_time: row.has_time != 0,
            focus_seconds: row.focus_seconds,
            repeat_rule: row.repeat_rule,
            parent_todo_id: parse_optional_uuid(row.parent_todo_id, "todo.parent_todo_id")?,
            is_completed: row.is_completed != 0,
            completed_at: parse_optional_datetime(row.completed_at, "todo.completed_at")?,
            created_at: parse_datetime(&row.created_at, "todo.created_at")?,
            updated_at: parse_datetime(&row.updated_at, "todo.updated_at")?,
            is_deleted: row.is_deleted != 0,
            deleted_at: parse_optional_datetime(row.deleted_at, "todo.deleted_at")?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value_type: String,
    pub value: String,
    pub updated_at: String,
}
