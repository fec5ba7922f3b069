// ABOUTME: Static blueprint registry describing every record category: labels, fields, defaults, and columns.
// ABOUTME: Lookups resolve through an exhaustive match on Category; tag and slug lookups fail softly with None.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::category::Category;
use crate::record::{Record, RecordError, Severity, new_id, now_millis};

/// Actions a collaborator may offer for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Inspect,
    Edit,
    Delete,
    Charts,
}

/// Field names shared across record categories, in their stored spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Id,
    CreatedTimestamp,
    UpdatedTimestamp,
    Name,
    Text,
    IsFavorited,
    IsEnabled,
    ParentId,
    Number,
    Severity,
    Details,
    Value,
}

impl FieldKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Id => "id",
            FieldKey::CreatedTimestamp => "createdTimestamp",
            FieldKey::UpdatedTimestamp => "updatedTimestamp",
            FieldKey::Name => "name",
            FieldKey::Text => "text",
            FieldKey::IsFavorited => "isFavorited",
            FieldKey::IsEnabled => "isEnabled",
            FieldKey::ParentId => "parentId",
            FieldKey::Number => "number",
            FieldKey::Severity => "severity",
            FieldKey::Details => "details",
            FieldKey::Value => "value",
        }
    }
}

/// Horizontal alignment of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// One field of a category: its label, default generator, and inspect formatter.
#[derive(Debug)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub label: &'static str,
    pub default: fn() -> Value,
    pub inspect: fn(&Value) -> String,
}

/// How a field renders as a table column.
#[derive(Debug)]
pub struct ColumnSpec {
    pub key: FieldKey,
    pub label: &'static str,
    pub align: Align,
    pub render: fn(&Value) -> String,
}

/// The static schema description of one category.
#[derive(Debug)]
pub struct Blueprint {
    pub category: Category,
    pub slug: &'static str,
    pub singular: &'static str,
    pub plural: &'static str,
    pub icon: &'static str,
    pub parent_type: Option<Category>,
    pub child_type: Option<Category>,
    pub actions: &'static [Action],
    pub fields: &'static [FieldSpec],
    pub visible_columns: &'static [FieldKey],
    pub columns: &'static [ColumnSpec],
}

impl Blueprint {
    pub fn supports(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn field(&self, key: FieldKey) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn column(&self, key: FieldKey) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn has_field(&self, key: FieldKey) -> bool {
        self.field(key).is_some()
    }

    /// Run every field's default generator, keyed by field name.
    pub fn default_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "category".to_string(),
            Value::String(self.category.as_str().to_string()),
        );
        for field in self.fields {
            fields.insert(field.key.as_str().to_string(), (field.default)());
        }
        fields
    }

    /// Build a fully defaulted record. Settings are keyed by a fixed id and
    /// cannot be created this way.
    pub fn new_record(&self) -> Result<Record, RecordError> {
        if !self.supports(Action::Create) {
            return Err(RecordError::NotCreatable(self.category));
        }
        Record::from_value(Value::Object(self.default_fields()))
    }

    /// Label/value pairs for the inspect view, in field order.
    pub fn inspect(&self, record: &Record) -> Result<Vec<(&'static str, String)>, RecordError> {
        let value = record.to_value()?;
        Ok(self
            .fields
            .iter()
            .map(|field| {
                let raw = value.get(field.key.as_str()).unwrap_or(&Value::Null);
                (field.label, (field.inspect)(raw))
            })
            .collect())
    }

    /// Rendered cells for the visible columns of a table row.
    pub fn render_row(&self, record: &Record) -> Result<Vec<String>, RecordError> {
        let value = record.to_value()?;
        Ok(self
            .visible_columns
            .iter()
            .filter_map(|key| self.column(*key))
            .map(|column| {
                let raw = value.get(column.key.as_str()).unwrap_or(&Value::Null);
                (column.render)(raw)
            })
            .collect())
    }
}

/// Resolve the blueprint for a category.
pub fn blueprint(category: Category) -> &'static Blueprint {
    match category {
        Category::Setting => &SETTING,
        Category::Log => &LOG,
        Category::Example => &EXAMPLE,
        Category::ExampleResult => &EXAMPLE_RESULT,
        Category::Test => &TEST,
        Category::TestResult => &TEST_RESULT,
    }
}

/// Resolve a blueprint from a stored category tag.
pub fn lookup(tag: &str) -> Option<&'static Blueprint> {
    tag.parse::<Category>().ok().map(blueprint)
}

/// Resolve a category from its URL slug.
pub fn slug_to_category(slug: &str) -> Option<Category> {
    Category::ALL
        .into_iter()
        .find(|c| blueprint(*c).slug == slug)
}

pub fn all_blueprints() -> impl Iterator<Item = &'static Blueprint> {
    Category::ALL.into_iter().map(blueprint)
}

// Default generators

fn default_id() -> Value {
    Value::String(new_id())
}

fn default_blank() -> Value {
    Value::String(String::new())
}

fn default_now() -> Value {
    Value::from(now_millis().timestamp_millis())
}

fn default_null() -> Value {
    Value::Null
}

fn default_false() -> Value {
    Value::Bool(false)
}

fn default_true() -> Value {
    Value::Bool(true)
}

fn default_zero() -> Value {
    Value::from(0.0)
}

fn default_severity() -> Value {
    Value::String(Severity::Info.as_str().to_string())
}

// Formatters

fn format_text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) if s.is_empty() => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_truncated(value: &Value) -> String {
    const LIMIT: usize = 40;
    let text = format_text(value);
    if text.chars().count() > LIMIT {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    } else {
        text
    }
}

fn format_timestamp(value: &Value) -> String {
    value
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_bool(value: &Value) -> String {
    match value.as_bool() {
        Some(true) => "Yes".to_string(),
        Some(false) => "No".to_string(),
        None => "-".to_string(),
    }
}

fn format_number(value: &Value) -> String {
    match value.as_f64() {
        Some(n) if n.fract() == 0.0 => format!("{}", n as i64),
        Some(n) => format!("{n:.2}"),
        None => "-".to_string(),
    }
}

fn format_json(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// Field tables

static SETTING_FIELDS: [FieldSpec; 2] = [
    FieldSpec { key: FieldKey::Id, label: "Setting", default: default_blank, inspect: format_text },
    FieldSpec { key: FieldKey::Value, label: "Value", default: default_null, inspect: format_json },
];

static LOG_FIELDS: [FieldSpec; 5] = [
    FieldSpec { key: FieldKey::Id, label: "Id", default: default_blank, inspect: format_text },
    FieldSpec {
        key: FieldKey::CreatedTimestamp,
        label: "Created",
        default: default_now,
        inspect: format_timestamp,
    },
    FieldSpec {
        key: FieldKey::Severity,
        label: "Severity",
        default: default_severity,
        inspect: format_text,
    },
    FieldSpec { key: FieldKey::Name, label: "Name", default: default_blank, inspect: format_text },
    FieldSpec { key: FieldKey::Details, label: "Details", default: default_null, inspect: format_json },
];

static PARENT_FIELDS: [FieldSpec; 7] = [
    FieldSpec { key: FieldKey::Id, label: "Id", default: default_id, inspect: format_text },
    FieldSpec {
        key: FieldKey::CreatedTimestamp,
        label: "Created",
        default: default_now,
        inspect: format_timestamp,
    },
    FieldSpec {
        key: FieldKey::UpdatedTimestamp,
        label: "Updated",
        default: default_now,
        inspect: format_timestamp,
    },
    FieldSpec { key: FieldKey::Name, label: "Name", default: default_blank, inspect: format_text },
    FieldSpec { key: FieldKey::Text, label: "Text", default: default_null, inspect: format_text },
    FieldSpec {
        key: FieldKey::IsFavorited,
        label: "Favorited",
        default: default_false,
        inspect: format_bool,
    },
    FieldSpec {
        key: FieldKey::IsEnabled,
        label: "Enabled",
        default: default_true,
        inspect: format_bool,
    },
];

static CHILD_FIELDS: [FieldSpec; 6] = [
    FieldSpec { key: FieldKey::Id, label: "Id", default: default_id, inspect: format_text },
    FieldSpec {
        key: FieldKey::CreatedTimestamp,
        label: "Created",
        default: default_now,
        inspect: format_timestamp,
    },
    FieldSpec {
        key: FieldKey::UpdatedTimestamp,
        label: "Updated",
        default: default_now,
        inspect: format_timestamp,
    },
    FieldSpec { key: FieldKey::ParentId, label: "Parent", default: default_blank, inspect: format_text },
    FieldSpec { key: FieldKey::Text, label: "Text", default: default_null, inspect: format_text },
    FieldSpec { key: FieldKey::Number, label: "Number", default: default_zero, inspect: format_number },
];

// Column tables

static SETTING_COLUMNS: [ColumnSpec; 2] = [
    ColumnSpec { key: FieldKey::Id, label: "Setting", align: Align::Left, render: format_text },
    ColumnSpec { key: FieldKey::Value, label: "Value", align: Align::Left, render: format_truncated },
];

static LOG_COLUMNS: [ColumnSpec; 5] = [
    ColumnSpec { key: FieldKey::Id, label: "Id", align: Align::Right, render: format_text },
    ColumnSpec {
        key: FieldKey::CreatedTimestamp,
        label: "Created",
        align: Align::Left,
        render: format_timestamp,
    },
    ColumnSpec { key: FieldKey::Severity, label: "Severity", align: Align::Center, render: format_text },
    ColumnSpec { key: FieldKey::Name, label: "Name", align: Align::Left, render: format_truncated },
    ColumnSpec { key: FieldKey::Details, label: "Details", align: Align::Left, render: format_truncated },
];

static PARENT_COLUMNS: [ColumnSpec; 7] = [
    ColumnSpec { key: FieldKey::Id, label: "Id", align: Align::Left, render: format_text },
    ColumnSpec {
        key: FieldKey::CreatedTimestamp,
        label: "Created",
        align: Align::Left,
        render: format_timestamp,
    },
    ColumnSpec {
        key: FieldKey::UpdatedTimestamp,
        label: "Updated",
        align: Align::Left,
        render: format_timestamp,
    },
    ColumnSpec { key: FieldKey::Name, label: "Name", align: Align::Left, render: format_truncated },
    ColumnSpec { key: FieldKey::Text, label: "Text", align: Align::Left, render: format_truncated },
    ColumnSpec { key: FieldKey::IsFavorited, label: "Favorited", align: Align::Center, render: format_bool },
    ColumnSpec { key: FieldKey::IsEnabled, label: "Enabled", align: Align::Center, render: format_bool },
];

static CHILD_COLUMNS: [ColumnSpec; 6] = [
    ColumnSpec { key: FieldKey::Id, label: "Id", align: Align::Left, render: format_text },
    ColumnSpec {
        key: FieldKey::CreatedTimestamp,
        label: "Created",
        align: Align::Left,
        render: format_timestamp,
    },
    ColumnSpec {
        key: FieldKey::UpdatedTimestamp,
        label: "Updated",
        align: Align::Left,
        render: format_timestamp,
    },
    ColumnSpec { key: FieldKey::ParentId, label: "Parent", align: Align::Left, render: format_text },
    ColumnSpec { key: FieldKey::Text, label: "Text", align: Align::Left, render: format_truncated },
    ColumnSpec { key: FieldKey::Number, label: "Number", align: Align::Right, render: format_number },
];

const PARENT_ACTIONS: &[Action] = &[
    Action::Create,
    Action::Inspect,
    Action::Edit,
    Action::Delete,
    Action::Charts,
];

const CHILD_ACTIONS: &[Action] = &[Action::Create, Action::Inspect, Action::Edit, Action::Delete];

// Blueprints

static SETTING: Blueprint = Blueprint {
    category: Category::Setting,
    slug: "settings",
    singular: "Setting",
    plural: "Settings",
    icon: "settings",
    parent_type: None,
    child_type: None,
    actions: &[Action::Inspect],
    fields: &SETTING_FIELDS,
    visible_columns: &[FieldKey::Id, FieldKey::Value],
    columns: &SETTING_COLUMNS,
};

static LOG: Blueprint = Blueprint {
    category: Category::Log,
    slug: "logs",
    singular: "Log",
    plural: "Logs",
    icon: "logs",
    parent_type: None,
    child_type: None,
    actions: &[Action::Inspect, Action::Delete],
    fields: &LOG_FIELDS,
    visible_columns: &[FieldKey::CreatedTimestamp, FieldKey::Severity, FieldKey::Name],
    columns: &LOG_COLUMNS,
};

static EXAMPLE: Blueprint = Blueprint {
    category: Category::Example,
    slug: "examples",
    singular: "Example",
    plural: "Examples",
    icon: "examples",
    parent_type: None,
    child_type: Some(Category::ExampleResult),
    actions: PARENT_ACTIONS,
    fields: &PARENT_FIELDS,
    visible_columns: &[FieldKey::Name, FieldKey::IsFavorited, FieldKey::IsEnabled],
    columns: &PARENT_COLUMNS,
};

static EXAMPLE_RESULT: Blueprint = Blueprint {
    category: Category::ExampleResult,
    slug: "example-results",
    singular: "Example Result",
    plural: "Example Results",
    icon: "results",
    parent_type: Some(Category::Example),
    child_type: None,
    actions: CHILD_ACTIONS,
    fields: &CHILD_FIELDS,
    visible_columns: &[FieldKey::CreatedTimestamp, FieldKey::ParentId, FieldKey::Number],
    columns: &CHILD_COLUMNS,
};

static TEST: Blueprint = Blueprint {
    category: Category::Test,
    slug: "tests",
    singular: "Test",
    plural: "Tests",
    icon: "tests",
    parent_type: None,
    child_type: Some(Category::TestResult),
    actions: PARENT_ACTIONS,
    fields: &PARENT_FIELDS,
    visible_columns: &[FieldKey::Name, FieldKey::IsFavorited, FieldKey::IsEnabled],
    columns: &PARENT_COLUMNS,
};

static TEST_RESULT: Blueprint = Blueprint {
    category: Category::TestResult,
    slug: "test-results",
    singular: "Test Result",
    plural: "Test Results",
    icon: "results",
    parent_type: Some(Category::Test),
    child_type: None,
    actions: CHILD_ACTIONS,
    fields: &CHILD_FIELDS,
    visible_columns: &[FieldKey::CreatedTimestamp, FieldKey::ParentId, FieldKey::Number],
    columns: &CHILD_COLUMNS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Parent;

    #[test]
    fn every_category_resolves_to_its_own_blueprint() {
        for category in Category::ALL {
            assert_eq!(blueprint(category).category, category);
        }
    }

    #[test]
    fn links_agree_with_category_families() {
        for bp in all_blueprints() {
            assert_eq!(bp.child_type, bp.category.child());
            assert_eq!(bp.parent_type, bp.category.parent());
        }
    }

    #[test]
    fn lookups_fail_softly() {
        assert!(lookup("EXAMPLE").is_some());
        assert!(lookup("NOPE").is_none());
        assert_eq!(slug_to_category("test-results"), Some(Category::TestResult));
        assert_eq!(slug_to_category("missing"), None);
    }

    #[test]
    fn visible_columns_are_all_rendered() {
        for bp in all_blueprints() {
            for key in bp.visible_columns {
                assert!(bp.column(*key).is_some(), "{} lacks column {:?}", bp.slug, key);
                assert!(bp.has_field(*key), "{} lacks field {:?}", bp.slug, key);
            }
        }
    }

    #[test]
    fn new_record_uses_field_defaults() {
        let record = blueprint(Category::Test).new_record().unwrap();
        match record {
            Record::Test(p) => {
                assert!(!p.id.is_empty());
                assert!(p.is_enabled);
                assert!(!p.is_favorited);
                assert_eq!(p.name, "");
                assert_eq!(p.created_timestamp, p.updated_timestamp);
            }
            other => panic!("expected Test, got {:?}", other),
        }

        let log = blueprint(Category::Log).new_record();
        assert!(log.is_err(), "logs are written by the logger, not created from defaults");
        let setting = blueprint(Category::Setting).new_record();
        assert!(matches!(setting, Err(RecordError::NotCreatable(Category::Setting))));
    }

    #[test]
    fn default_ids_are_unique() {
        let a = blueprint(Category::Example).new_record().unwrap();
        let b = blueprint(Category::Example).new_record().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn inspect_and_render_format_values() {
        let mut parent = Parent::new("Morning run");
        parent.is_favorited = true;
        let record = Record::Example(parent);
        let bp = blueprint(Category::Example);

        let inspected = bp.inspect(&record).unwrap();
        assert_eq!(inspected.len(), bp.fields.len());
        assert!(inspected.contains(&("Name", "Morning run".to_string())));
        assert!(inspected.contains(&("Favorited", "Yes".to_string())));
        assert!(inspected.contains(&("Text", "-".to_string())));

        let row = bp.render_row(&record).unwrap();
        assert_eq!(row, vec!["Morning run".to_string(), "Yes".to_string(), "Yes".to_string()]);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(&Value::from(3.0)), "3");
        assert_eq!(format_number(&Value::from(2.5)), "2.50");
        assert_eq!(format_number(&Value::Null), "-");
    }
}
