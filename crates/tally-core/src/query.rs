// ABOUTME: Declarative live query descriptors: a category, a predicate filter, and a sort order.
// ABOUTME: Evaluation is pure so it can run against any snapshot of the table, including orphan/unused joins.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::record::Record;

/// Predicate applied to records of the queried category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Filter {
    All,
    Enabled,
    Favorited,
    /// Children whose `parentId` equals the given id.
    ChildrenOf(String),
    /// Children whose `parentId` matches no existing parent.
    Orphaned,
    /// Parents with no children.
    Unused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Id,
    CreatedTimestamp,
    UpdatedTimestamp,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub direction: Direction,
}

impl Sort {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            direction: Direction::Ascending,
        }
    }

    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            direction: Direction::Descending,
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = match self.key {
            SortKey::Id => Ordering::Equal,
            SortKey::CreatedTimestamp => a.created_timestamp().cmp(&b.created_timestamp()),
            SortKey::UpdatedTimestamp => a.updated_timestamp().cmp(&b.updated_timestamp()),
            SortKey::Name => a.name().cmp(&b.name()),
        };
        let ordering = primary.then_with(|| compare_ids(a.id(), b.id()));
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

/// Numeric ids (log surrogates) compare numerically, everything else lexically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// A stored query whose result is re-delivered on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveQuery {
    pub category: Category,
    pub filter: Filter,
    pub sort: Sort,
}

impl LiveQuery {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            filter: Filter::All,
            sort: Sort::default(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// The other category whose rows the filter needs, if any.
    pub fn related_category(&self) -> Option<Category> {
        match self.filter {
            Filter::Orphaned => self.category.parent(),
            Filter::Unused => self.category.child(),
            _ => None,
        }
    }

    /// Filter and sort a snapshot. `records` holds the queried category,
    /// `related` holds rows of `related_category()` (empty when unused).
    pub fn evaluate(&self, records: Vec<Record>, related: &[Record]) -> Vec<Record> {
        let mut matched: Vec<Record> = match &self.filter {
            Filter::All => records,
            Filter::Enabled => records.into_iter().filter(Record::is_enabled).collect(),
            Filter::Favorited => records.into_iter().filter(Record::is_favorited).collect(),
            Filter::ChildrenOf(parent_id) => records
                .into_iter()
                .filter(|r| r.parent_id() == Some(parent_id.as_str()))
                .collect(),
            Filter::Orphaned => orphaned(records, related),
            Filter::Unused => unused(records, related),
        };
        matched.retain(|r| r.category() == self.category);
        matched.sort_by(|a, b| self.sort.compare(a, b));
        matched
    }
}

/// Children whose `parentId` matches none of `parents`.
pub fn orphaned(children: Vec<Record>, parents: &[Record]) -> Vec<Record> {
    let parent_ids: HashSet<&str> = parents.iter().map(Record::id).collect();
    children
        .into_iter()
        .filter(|c| match c.parent_id() {
            Some(pid) => !parent_ids.contains(pid),
            None => false,
        })
        .collect()
}

/// Parents that no record in `children` points at.
pub fn unused(parents: Vec<Record>, children: &[Record]) -> Vec<Record> {
    let referenced: HashSet<&str> = children.iter().filter_map(Record::parent_id).collect();
    parents
        .into_iter()
        .filter(|p| !referenced.contains(p.id()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Child, Log, Parent, Severity};

    fn parent(id: &str, name: &str, enabled: bool) -> Record {
        let mut p = Parent::new(name);
        p.id = id.to_string();
        p.is_enabled = enabled;
        Record::Example(p)
    }

    fn child(id: &str, parent_id: &str) -> Record {
        let mut c = Child::new(parent_id, 1.0);
        c.id = id.to_string();
        Record::ExampleResult(c)
    }

    #[test]
    fn enabled_filter_keeps_only_enabled_parents() {
        let query = LiveQuery::new(Category::Example).filter(Filter::Enabled);
        let result = query.evaluate(
            vec![parent("b", "B", true), parent("a", "A", false), parent("c", "C", true)],
            &[],
        );
        let ids: Vec<&str> = result.iter().map(Record::id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn orphaned_children_are_those_without_a_parent() {
        let query = LiveQuery::new(Category::ExampleResult).filter(Filter::Orphaned);
        assert_eq!(query.related_category(), Some(Category::Example));

        let parents = vec![parent("p1", "P1", true)];
        let result = query.evaluate(vec![child("c1", "p1"), child("c2", "gone")], &parents);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "c2");
    }

    #[test]
    fn unused_parents_have_no_children() {
        let query = LiveQuery::new(Category::Example).filter(Filter::Unused);
        assert_eq!(query.related_category(), Some(Category::ExampleResult));

        let children = vec![child("c1", "p1")];
        let result = query.evaluate(
            vec![parent("p1", "P1", true), parent("p2", "P2", true)],
            &children,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "p2");
    }

    #[test]
    fn children_of_matches_parent_id() {
        let query =
            LiveQuery::new(Category::ExampleResult).filter(Filter::ChildrenOf("p1".to_string()));
        let result = query.evaluate(vec![child("c1", "p1"), child("c2", "p2")], &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].parent_id(), Some("p1"));
    }

    #[test]
    fn sort_by_name_descending_breaks_ties_by_id() {
        let query = LiveQuery::new(Category::Example).sort(Sort::descending(SortKey::Name));
        let result = query.evaluate(
            vec![parent("1", "alpha", true), parent("3", "beta", true), parent("2", "beta", true)],
            &[],
        );
        let ids: Vec<&str> = result.iter().map(Record::id).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[test]
    fn numeric_ids_sort_numerically() {
        let logs: Vec<Record> = ["10", "9", "2"]
            .into_iter()
            .map(|id| {
                let mut log = Log::new(Severity::Info, "x", None);
                log.id = id.to_string();
                Record::Log(log)
            })
            .collect();
        let result = LiveQuery::new(Category::Log).evaluate(logs, &[]);
        let ids: Vec<&str> = result.iter().map(Record::id).collect();
        assert_eq!(ids, vec!["2", "9", "10"]);
    }
}
