// ABOUTME: Defines the typed record variants stored in the single logical table.
// ABOUTME: Records convert to and from a uniform JSON row tagged by category at the storage boundary.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use ulid::Ulid;

use crate::category::{Category, RecordKey};
use crate::setting::SettingId;

/// Errors raised while converting or validating records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown setting id: {0}")]
    UnknownSetting(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("record category cannot change from {expected} to {found}")]
    CategoryChange { expected: Category, found: String },

    #[error("records of category {0} cannot be created from defaults")]
    NotCreatable(Category),
}

/// Current time truncated to millisecond precision, matching what survives
/// an export/import round trip.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Generate a fresh record id.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Severity of a LOG record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// A persisted setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: SettingId,
    pub value: Value,
}

impl Setting {
    pub fn new(id: SettingId, value: Value) -> Self {
        Self { id, value }
    }
}

/// An application log entry. A blank id asks the engine to assign the next
/// surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    #[serde(default)]
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Log {
    pub fn new(severity: Severity, name: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            id: String::new(),
            created_timestamp: now_millis(),
            severity,
            name: name.into(),
            details,
        }
    }
}

/// A parent record (Example or Test).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_timestamp: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub is_favorited: bool,
    pub is_enabled: bool,
}

impl Parent {
    /// Create an enabled, unfavorited parent with a fresh id and timestamps.
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            created_timestamp: now,
            updated_timestamp: now,
            name: name.into(),
            text: None,
            is_favorited: false,
            is_enabled: true,
        }
    }
}

/// A child result record (ExampleResult or TestResult). `parent_id` is a
/// plain reference and may dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_timestamp: DateTime<Utc>,
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub number: f64,
}

impl Child {
    pub fn new(parent_id: impl Into<String>, number: f64) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            created_timestamp: now,
            updated_timestamp: now,
            parent_id: parent_id.into(),
            text: None,
            number,
        }
    }
}

/// One row of the store, typed by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Record {
    Setting(Setting),
    Log(Log),
    Example(Parent),
    ExampleResult(Child),
    Test(Parent),
    TestResult(Child),
}

impl Record {
    pub fn category(&self) -> Category {
        match self {
            Record::Setting(_) => Category::Setting,
            Record::Log(_) => Category::Log,
            Record::Example(_) => Category::Example,
            Record::ExampleResult(_) => Category::ExampleResult,
            Record::Test(_) => Category::Test,
            Record::TestResult(_) => Category::TestResult,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Setting(s) => s.id.as_str(),
            Record::Log(l) => &l.id,
            Record::Example(p) | Record::Test(p) => &p.id,
            Record::ExampleResult(c) | Record::TestResult(c) => &c.id,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.category(), self.id())
    }

    /// The referenced parent id for child records.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Record::ExampleResult(c) | Record::TestResult(c) => Some(&c.parent_id),
            _ => None,
        }
    }

    pub fn created_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Record::Setting(_) => None,
            Record::Log(l) => Some(l.created_timestamp),
            Record::Example(p) | Record::Test(p) => Some(p.created_timestamp),
            Record::ExampleResult(c) | Record::TestResult(c) => Some(c.created_timestamp),
        }
    }

    pub fn updated_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Record::Example(p) | Record::Test(p) => Some(p.updated_timestamp),
            Record::ExampleResult(c) | Record::TestResult(c) => Some(c.updated_timestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Record::Log(l) => Some(&l.name),
            Record::Example(p) | Record::Test(p) => Some(&p.name),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Record::Example(p) | Record::Test(p) => p.is_enabled,
            _ => false,
        }
    }

    pub fn is_favorited(&self) -> bool {
        match self {
            Record::Example(p) | Record::Test(p) => p.is_favorited,
            _ => false,
        }
    }

    /// Replace the id of a LOG record. Other categories keep their ids.
    pub fn assign_log_id(&mut self, id: String) {
        if let Record::Log(l) = self {
            l.id = id;
        }
    }

    /// Set `updatedTimestamp` on categories that carry one.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        match self {
            Record::Example(p) | Record::Test(p) => p.updated_timestamp = at,
            Record::ExampleResult(c) | Record::TestResult(c) => c.updated_timestamp = at,
            _ => {}
        }
    }

    /// Convert to the uniform row representation.
    pub fn to_value(&self) -> Result<Value, RecordError> {
        serde_json::to_value(self).map_err(|e| RecordError::Malformed(e.to_string()))
    }

    /// Parse a uniform row. Unknown categories are reported separately from
    /// rows that are otherwise malformed.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let tag = value
            .get("category")
            .and_then(Value::as_str)
            .ok_or_else(|| RecordError::Malformed("missing category".to_string()))?;
        tag.parse::<Category>()?;
        serde_json::from_value(value).map_err(|e| RecordError::Malformed(e.to_string()))
    }

    /// Apply a partial set of fields over this record. Unspecified fields are
    /// preserved; the category cannot change.
    pub fn merged(&self, changes: &Map<String, Value>) -> Result<Self, RecordError> {
        let category = self.category();
        let mut value = self.to_value()?;
        let fields = value
            .as_object_mut()
            .ok_or_else(|| RecordError::Malformed("record is not an object".to_string()))?;

        for (field, new_value) in changes {
            if field == "category" {
                if new_value.as_str() != Some(category.as_str()) {
                    return Err(RecordError::CategoryChange {
                        expected: category,
                        found: new_value.to_string(),
                    });
                }
                continue;
            }
            fields.insert(field.clone(), new_value.clone());
        }

        Self::from_value(value)
    }
}
