// ABOUTME: Defines the closed set of record categories and the compound (category, id) key.
// ABOUTME: Categories parse from their storage tags and pair up into parent/child families.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::RecordError;

/// The discriminant tag identifying which schema a stored row follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Setting,
    Log,
    Example,
    ExampleResult,
    Test,
    TestResult,
}

impl Category {
    /// Every category, in registry order.
    pub const ALL: [Category; 6] = [
        Category::Setting,
        Category::Log,
        Category::Example,
        Category::ExampleResult,
        Category::Test,
        Category::TestResult,
    ];

    /// The tag stored in the `category` column and in exported records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Setting => "SETTING",
            Category::Log => "LOG",
            Category::Example => "EXAMPLE",
            Category::ExampleResult => "EXAMPLE_RESULT",
            Category::Test => "TEST",
            Category::TestResult => "TEST_RESULT",
        }
    }

    /// True for categories whose records carry a `parentId`.
    pub fn is_child(&self) -> bool {
        matches!(self, Category::ExampleResult | Category::TestResult)
    }

    /// True for categories whose records can own children.
    pub fn is_parent(&self) -> bool {
        matches!(self, Category::Example | Category::Test)
    }

    /// The child category owned by this parent category, if any.
    pub fn child(&self) -> Option<Category> {
        match self {
            Category::Example => Some(Category::ExampleResult),
            Category::Test => Some(Category::TestResult),
            _ => None,
        }
    }

    /// The parent category this child category points at, if any.
    pub fn parent(&self) -> Option<Category> {
        match self {
            Category::ExampleResult => Some(Category::Example),
            Category::TestResult => Some(Category::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| RecordError::UnknownCategory(s.to_string()))
    }
}

/// The compound key that uniquely identifies a record across the whole store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub category: Category,
    pub id: String,
}

impl RecordKey {
    pub fn new(category: Category, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.id)
    }
}
