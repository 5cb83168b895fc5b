use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of row change reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which change kinds a subscription asks the server for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl EventFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFilter::All => "*",
            EventFilter::Only(kind) => kind.as_str(),
        }
    }
}

impl FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(EventFilter::All);
        }
        ChangeKind::parse(&s.to_uppercase())
            .map(EventFilter::Only)
            .ok_or_else(|| format!("unknown event filter '{}'", s))
    }
}

/// Table a channel listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTarget {
    pub schema: String,
    pub table: String,
    pub event: EventFilter,
}

#[allow(dead_code)]
impl ChangeTarget {
    /// All changes of `table` in the `public` schema.
    pub fn table(table: &str) -> Self {
        ChangeTarget {
            schema: "public".to_string(),
            table: table.to_string(),
            event: EventFilter::All,
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn event(mut self, event: EventFilter) -> Self {
        self.event = event;
        self
    }
}

/// Untyped change notification, in the shape handed to listeners:
/// `{eventType, schema, table, old, new, commit_timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub old: Option<Value>,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

fn non_empty(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(v) => Some(v.clone()),
    }
}

impl RawChange {
    /// Build from the `payload.data` object of a realtime `postgres_changes`
    /// message (`type`, `schema`, `table`, `record`, `old_record`, ...).
    pub fn from_realtime(data: &Value) -> Option<Self> {
        Some(RawChange {
            event_type: data.get("type")?.as_str()?.to_string(),
            schema: data.get("schema").and_then(Value::as_str).unwrap_or_default().to_string(),
            table: data.get("table").and_then(Value::as_str).unwrap_or_default().to_string(),
            old: non_empty(data.get("old_record")),
            new: non_empty(data.get("record")),
            commit_timestamp: data
                .get("commit_timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.commit_timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A classified change with typed row snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Insert { after: T },
    Update { before: T, after: T },
    Delete { before: T },
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("unknown event type '{0}'")]
    UnknownKind(String),

    #[error("{kind} event without '{snapshot}' snapshot")]
    MissingSnapshot {
        kind: ChangeKind,
        snapshot: &'static str,
    },

    #[error("invalid '{snapshot}' snapshot: {source}")]
    InvalidSnapshot {
        snapshot: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn snapshot<T: DeserializeOwned>(
    kind: ChangeKind,
    name: &'static str,
    value: Option<&Value>,
) -> Result<T, ClassifyError> {
    let value = value.ok_or(ClassifyError::MissingSnapshot {
        kind,
        snapshot: name,
    })?;
    serde_json::from_value(value.clone()).map_err(|source| ClassifyError::InvalidSnapshot {
        snapshot: name,
        source,
    })
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert { .. } => ChangeKind::Insert,
            ChangeEvent::Update { .. } => ChangeKind::Update,
            ChangeEvent::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Classify a raw notification. Only the snapshots the kind requires are
    /// decoded; extra ones are ignored.
    pub fn classify(raw: &RawChange) -> Result<Self, ClassifyError> {
        let kind = ChangeKind::parse(&raw.event_type)
            .ok_or_else(|| ClassifyError::UnknownKind(raw.event_type.clone()))?;
        Ok(match kind {
            ChangeKind::Insert => ChangeEvent::Insert {
                after: snapshot(kind, "new", raw.new.as_ref())?,
            },
            ChangeKind::Update => ChangeEvent::Update {
                before: snapshot(kind, "old", raw.old.as_ref())?,
                after: snapshot(kind, "new", raw.new.as_ref())?,
            },
            ChangeKind::Delete => ChangeEvent::Delete {
                before: snapshot(kind, "old", raw.old.as_ref())?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Row {
        id: u64,
    }

    #[test]
    fn test_from_realtime_maps_record_fields() {
        let data = json!({
            "type": "UPDATE",
            "schema": "public",
            "table": "score_board",
            "commit_timestamp": "2024-05-01T10:00:00Z",
            "record": {"id": 2},
            "old_record": {"id": 1},
            "columns": [],
            "errors": null
        });
        let raw = RawChange::from_realtime(&data).unwrap();
        assert_eq!(raw.event_type, "UPDATE");
        assert_eq!(raw.new, Some(json!({"id": 2})));
        assert_eq!(raw.old, Some(json!({"id": 1})));
        assert!(raw.committed_at().is_some());
    }

    #[test]
    fn test_from_realtime_treats_empty_old_record_as_absent() {
        let data = json!({"type": "INSERT", "schema": "public", "table": "t", "record": {"id": 1}, "old_record": {}});
        let raw = RawChange::from_realtime(&data).unwrap();
        assert_eq!(raw.old, None);
        assert!(RawChange::from_realtime(&json!({"schema": "public"})).is_none());
    }

    #[test]
    fn test_classify_each_kind() {
        let raw = |t: &str, old: Option<Value>, new: Option<Value>| RawChange {
            event_type: t.into(),
            schema: "public".into(),
            table: "t".into(),
            old,
            new,
            commit_timestamp: None,
        };
        assert_eq!(
            ChangeEvent::<Row>::classify(&raw("INSERT", None, Some(json!({"id": 1})))).unwrap(),
            ChangeEvent::Insert { after: Row { id: 1 } }
        );
        assert_eq!(
            ChangeEvent::<Row>::classify(&raw("UPDATE", Some(json!({"id": 1})), Some(json!({"id": 1})))).unwrap(),
            ChangeEvent::Update {
                before: Row { id: 1 },
                after: Row { id: 1 }
            }
        );
        assert_eq!(
            ChangeEvent::<Row>::classify(&raw("DELETE", Some(json!({"id": 4})), None)).unwrap(),
            ChangeEvent::Delete { before: Row { id: 4 } }
        );
    }

    #[test]
    fn test_classify_rejects_inconsistent_events() {
        let raw = RawChange {
            event_type: "UPDATE".into(),
            schema: "public".into(),
            table: "t".into(),
            old: None,
            new: Some(json!({"id": 1})),
            commit_timestamp: None,
        };
        assert!(matches!(
            ChangeEvent::<Row>::classify(&raw),
            Err(ClassifyError::MissingSnapshot { snapshot: "old", .. })
        ));

        let raw = RawChange {
            event_type: "TRUNCATE".into(),
            ..raw
        };
        assert!(matches!(
            ChangeEvent::<Row>::classify(&raw),
            Err(ClassifyError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_event_filter_parse() {
        assert_eq!("*".parse::<EventFilter>().unwrap(), EventFilter::All);
        assert_eq!(
            "delete".parse::<EventFilter>().unwrap(),
            EventFilter::Only(ChangeKind::Delete)
        );
        assert!("upsert".parse::<EventFilter>().is_err());
        assert_eq!(EventFilter::Only(ChangeKind::Insert).as_str(), "INSERT");
    }
}
