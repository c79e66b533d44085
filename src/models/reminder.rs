// Reminders attached to a relation (customer, appointment, ...)
// Stored flat on the server under /v1/health/reminders, keyed by their own id.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Prefix of ids assigned to drafts that only exist client-side.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// The record a reminder belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    /// Relation type as the backend names it, e.g. "customer".
    pub kind: String,
}

impl Relation {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(id, "customer")
    }
}

/// Internal reminder shape, as edited in forms and returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub relation_id: String,
    #[serde(default)]
    pub relation_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub note: String,
    /// Calendar date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: String,
    /// Local time, `HH:MM`.
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub status_id: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub sub_category_id: Option<String>,
}

impl Reminder {
    /// A client-side draft for `relation` carrying a fresh temporary id.
    pub fn draft(relation: &Relation, title: impl Into<String>) -> Self {
        Self {
            id: Some(format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4())),
            relation_id: relation.id.clone(),
            relation_type: relation.kind.clone(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// The server-assigned id, if this reminder has one.
    pub fn persisted_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !is_temporary_id(id))
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted_id().is_some()
    }
}

pub fn is_temporary_id(id: &str) -> bool {
    id.is_empty() || id.starts_with(TEMP_ID_PREFIX)
}

/// Reminder as the backend sends and receives it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderWire {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub relation_id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub relation_type: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub note: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub reminder_date: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub reminder_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub status_id: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub sub_category_id: Option<String>,
}

impl From<ReminderWire> for Reminder {
    fn from(w: ReminderWire) -> Self {
        Self {
            id: w.id,
            relation_id: w.relation_id,
            relation_type: w.relation_type,
            title: w.title,
            note: w.note,
            date: w.reminder_date,
            time: w.reminder_time,
            status_id: w.status_id,
            is_completed: w.is_completed,
            category_id: w.category_id,
            sub_category_id: w.sub_category_id,
        }
    }
}

impl From<&Reminder> for ReminderWire {
    fn from(r: &Reminder) -> Self {
        Self {
            id: r.persisted_id().map(str::to_string),
            relation_id: r.relation_id.clone(),
            relation_type: r.relation_type.clone(),
            title: r.title.clone(),
            note: r.note.clone(),
            reminder_date: r.date.clone(),
            reminder_time: r.time.clone(),
            status_id: r.status_id.clone(),
            is_completed: r.is_completed,
            category_id: r.category_id.clone(),
            sub_category_id: r.sub_category_id.clone(),
        }
    }
}

/// List responses come back either as a bare array or wrapped in `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReminderList {
    Bare(Vec<ReminderWire>),
    Paged { items: Vec<ReminderWire> },
}

impl ReminderList {
    pub fn into_reminders(self) -> Vec<Reminder> {
        let items = match self {
            ReminderList::Bare(items) | ReminderList::Paged { items } => items,
        };
        items.into_iter().map(Reminder::from).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCompletedRequest {
    pub is_completed: bool,
}

// ── id decoding ──────────────────────────────────────────────

fn id_from_value(v: Value) -> Result<Option<String>, String> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(format!("expected string or number id, got {}", other)),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    id_from_value(v).map_err(serde::de::Error::custom)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string_or_number(deserializer).map(Option::unwrap_or_default)
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
