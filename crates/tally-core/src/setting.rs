// ABOUTME: Defines the closed set of setting identifiers, their coded defaults, and log retention windows.
// ABOUTME: Setting values are stored as JSON; typed accessors decode them with fallbacks to defaults.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::RecordError;

/// Identifier of a persisted setting. Each id owns exactly one SETTING row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingId {
    DarkMode,
    ConsoleLogs,
    InfoPopups,
    LogRetention,
}

impl SettingId {
    pub const ALL: [SettingId; 4] = [
        SettingId::DarkMode,
        SettingId::ConsoleLogs,
        SettingId::InfoPopups,
        SettingId::LogRetention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingId::DarkMode => "DARK_MODE",
            SettingId::ConsoleLogs => "CONSOLE_LOGS",
            SettingId::InfoPopups => "INFO_POPUPS",
            SettingId::LogRetention => "LOG_RETENTION",
        }
    }

    /// The value a setting takes before anything has been written for it.
    pub fn default_value(&self) -> Value {
        match self {
            SettingId::DarkMode => Value::Bool(false),
            SettingId::ConsoleLogs => Value::Bool(false),
            SettingId::InfoPopups => Value::Bool(true),
            SettingId::LogRetention => LogRetention::default().to_value(),
        }
    }

    /// Human-readable label for settings screens.
    pub fn label(&self) -> &'static str {
        match self {
            SettingId::DarkMode => "Dark Mode",
            SettingId::ConsoleLogs => "Console Logs",
            SettingId::InfoPopups => "Info Popups",
            SettingId::LogRetention => "Log Retention",
        }
    }
}

impl fmt::Display for SettingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RecordError::UnknownSetting(s.to_string()))
    }
}

/// How long log records are kept before the purger removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogRetention {
    OneWeek,
    OneMonth,
    #[default]
    ThreeMonths,
    SixMonths,
    OneYear,
    Forever,
}

impl LogRetention {
    /// The retention window, or None when logs are kept forever.
    /// Months count as 30 days and years as 365 days.
    pub fn window(&self) -> Option<TimeDelta> {
        match self {
            LogRetention::OneWeek => Some(TimeDelta::days(7)),
            LogRetention::OneMonth => Some(TimeDelta::days(30)),
            LogRetention::ThreeMonths => Some(TimeDelta::days(90)),
            LogRetention::SixMonths => Some(TimeDelta::days(180)),
            LogRetention::OneYear => Some(TimeDelta::days(365)),
            LogRetention::Forever => None,
        }
    }

    pub fn to_value(self) -> Value {
        // Unit variants always serialize to a JSON string.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode a stored setting value. Returns None for anything unrecognized.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_ids_parse_from_their_tags() {
        for id in SettingId::ALL {
            assert_eq!(id.as_str().parse::<SettingId>().unwrap(), id);
        }
        assert!("THEME".parse::<SettingId>().is_err());
    }

    #[test]
    fn defaults_are_coded_per_setting() {
        assert_eq!(SettingId::DarkMode.default_value(), Value::Bool(false));
        assert_eq!(SettingId::InfoPopups.default_value(), Value::Bool(true));
        assert_eq!(
            SettingId::LogRetention.default_value(),
            Value::String("THREE_MONTHS".to_string())
        );
    }

    #[test]
    fn retention_windows() {
        assert_eq!(LogRetention::OneWeek.window(), Some(TimeDelta::days(7)));
        assert_eq!(LogRetention::OneYear.window(), Some(TimeDelta::days(365)));
        assert!(LogRetention::Forever.window().is_none());
    }

    #[test]
    fn retention_decodes_from_stored_value() {
        let value = LogRetention::SixMonths.to_value();
        assert_eq!(LogRetention::from_value(&value), Some(LogRetention::SixMonths));
        assert_eq!(LogRetention::from_value(&Value::Bool(true)), None);
    }
}
