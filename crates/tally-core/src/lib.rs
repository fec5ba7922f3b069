// ABOUTME: Core library for tally, containing record categories, typed records, and the blueprint registry.
// ABOUTME: This crate has no I/O; storage and live queries live in tally-store.

pub mod blueprint;
pub mod category;
pub mod demo;
pub mod query;
pub mod record;
pub mod setting;

pub use blueprint::{Action, Blueprint, blueprint, lookup, slug_to_category};
pub use category::{Category, RecordKey};
pub use query::{Direction, Filter, LiveQuery, Sort, SortKey};
pub use record::{Child, Log, Parent, Record, RecordError, Setting, Severity};
pub use setting::{LogRetention, SettingId};
