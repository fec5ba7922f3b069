// ABOUTME: Generates demo parents and children for both record families, including one orphaned child each.
// ABOUTME: Output shape is fixed for a given size; only ids and timestamps vary between calls.

use chrono::TimeDelta;

use crate::category::Category;
use crate::record::{Child, Parent, Record, new_id, now_millis};

const NAMES: [&str; 6] = ["Push Ups", "Squats", "Plank", "Running", "Rowing", "Cycling"];

/// Build demo records for every parent category.
///
/// Each family gets `parents` parents (every third one disabled, the first
/// favorited), `children_per_parent` results per parent spaced a day apart,
/// plus one result that points at a parent id that does not exist.
pub fn demo_records(parents: usize, children_per_parent: usize) -> Vec<Record> {
    let mut records = Vec::new();
    for category in [Category::Example, Category::Test] {
        records.extend(family(category, parents, children_per_parent));
    }
    records
}

fn family(category: Category, parents: usize, children_per_parent: usize) -> Vec<Record> {
    let now = now_millis();
    let mut records = Vec::with_capacity(parents * (children_per_parent + 1) + 1);

    for i in 0..parents {
        let mut parent = Parent::new(format!("{} {}", NAMES[i % NAMES.len()], i + 1));
        parent.is_enabled = i % 3 != 2;
        parent.is_favorited = i == 0;
        parent.text = Some(format!("Demo {} {}", category.as_str().to_lowercase(), i + 1));

        for j in 0..children_per_parent {
            let mut child = Child::new(parent.id.clone(), ((i + 1) * 10 + j) as f64);
            let at = now - TimeDelta::days((children_per_parent - j) as i64);
            child.created_timestamp = at;
            child.updated_timestamp = at;
            records.push(wrap_child(category, child));
        }
        records.push(wrap_parent(category, parent));
    }

    let mut orphan = Child::new(new_id(), 0.0);
    orphan.text = Some("Orphaned result".to_string());
    records.push(wrap_child(category, orphan));
    records
}

fn wrap_parent(category: Category, parent: Parent) -> Record {
    match category {
        Category::Test => Record::Test(parent),
        _ => Record::Example(parent),
    }
}

fn wrap_child(category: Category, child: Child) -> Record {
    match category {
        Category::Test => Record::TestResult(child),
        _ => Record::ExampleResult(child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::orphaned;

    #[test]
    fn produces_both_families() {
        let records = demo_records(3, 2);
        // per family: 3 parents, 6 children, 1 orphan
        assert_eq!(records.len(), 2 * (3 + 6 + 1));

        let count = |c: Category| records.iter().filter(|r| r.category() == c).count();
        assert_eq!(count(Category::Example), 3);
        assert_eq!(count(Category::TestResult), 7);
    }

    #[test]
    fn exactly_one_orphan_per_family() {
        let records = demo_records(4, 1);
        for (parent_cat, child_cat) in [
            (Category::Example, Category::ExampleResult),
            (Category::Test, Category::TestResult),
        ] {
            let parents: Vec<Record> = records
                .iter()
                .filter(|r| r.category() == parent_cat)
                .cloned()
                .collect();
            let children: Vec<Record> = records
                .iter()
                .filter(|r| r.category() == child_cat)
                .cloned()
                .collect();
            assert_eq!(orphaned(children, &parents).len(), 1);
        }
    }

    #[test]
    fn every_third_parent_is_disabled() {
        let records = demo_records(6, 0);
        let disabled = records
            .iter()
            .filter(|r| r.category() == Category::Example && !r.is_enabled())
            .count();
        assert_eq!(disabled, 2);
    }
}
