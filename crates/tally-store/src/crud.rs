// ABOUTME: CRUD facade validating records against the blueprint registry before writing through the engine.
// ABOUTME: Also answers the parent/child questions: children, orphans, unused parents, and cascade targets.

use std::sync::Arc;

use serde_json::{Map, Value};
use tally_core::blueprint::{Action, FieldKey, blueprint};
use tally_core::query::{orphaned, unused};
use tally_core::{Category, Record, RecordKey, SettingId};
use tracing::debug;

use crate::engine::EngineHandle;
use crate::error::{StoreError, StoreResult};
use crate::settings::Settings;

/// Validated record operations. Writes of SETTING rows keep the settings
/// cache in step with storage.
#[derive(Clone)]
pub struct RecordService {
    engine: EngineHandle,
    settings: Arc<Settings>,
}

impl RecordService {
    pub fn new(engine: EngineHandle, settings: Arc<Settings>) -> Self {
        Self { engine, settings }
    }

    /// Create a record whose key must not exist yet.
    pub async fn create_record(&self, record: Record) -> StoreResult<RecordKey> {
        validate(&record)?;
        let _guard = self.settings_guard(record.category()).await;
        let key = self.engine.insert(record.clone()).await?;
        self.mirror(&record);
        debug!(%key, "record created");
        Ok(key)
    }

    pub async fn get_record(&self, category: Category, id: &str) -> StoreResult<Option<Record>> {
        self.engine.get(category, id).await
    }

    /// Merge `changes` into the record stored under `original_id`, touching
    /// `updatedTimestamp`. A different `id` in `changes` re-keys the record;
    /// either the whole rename lands or the original is left as it was.
    pub async fn update_record(
        &self,
        category: Category,
        original_id: &str,
        mut changes: Map<String, Value>,
    ) -> StoreResult<Record> {
        // SETTING values change through the settings page, not the Edit action.
        if category != Category::Setting && !blueprint(category).supports(Action::Edit) {
            return Err(StoreError::InvalidRecord(format!(
                "{category} records cannot be edited"
            )));
        }
        if let Some(new_id) = changes.get("id").and_then(Value::as_str) {
            if category != Category::Setting && new_id.parse::<SettingId>().is_ok() {
                return Err(reserved_id(category, new_id));
            }
        }
        if blueprint(category).has_field(FieldKey::UpdatedTimestamp) {
            let now = tally_core::record::now_millis().timestamp_millis();
            changes.insert(
                FieldKey::UpdatedTimestamp.as_str().to_string(),
                Value::from(now),
            );
        }

        let _guard = self.settings_guard(category).await;
        let updated = self.engine.update(category, original_id, changes).await?;
        if let Record::Setting(setting) = &updated {
            if setting.id.as_str() != original_id {
                if let Ok(old) = original_id.parse::<SettingId>() {
                    self.settings.forget(old);
                }
            }
        }
        self.mirror(&updated);
        Ok(updated)
    }

    /// Delete a record. Deleting an absent key is a no-op.
    pub async fn delete_record(&self, category: Category, id: &str) -> StoreResult<()> {
        let _guard = self.settings_guard(category).await;
        let removed = self.engine.delete(category, id).await?;
        if removed && category == Category::Setting {
            if let Ok(setting_id) = id.parse::<SettingId>() {
                self.settings.forget(setting_id);
            }
        }
        Ok(())
    }

    /// Upsert typed records in one transaction.
    pub async fn bulk_add_records(&self, records: Vec<Record>) -> StoreResult<Vec<RecordKey>> {
        for record in &records {
            validate(record)?;
        }
        let touches_settings = records.iter().any(|r| r.category() == Category::Setting);
        let _guard = if touches_settings {
            Some(self.settings.lock_writes().await)
        } else {
            None
        };

        let keys = self.engine.bulk_put(records.clone()).await?;
        for record in &records {
            self.mirror(record);
        }
        debug!(count = keys.len(), "records added in bulk");
        Ok(keys)
    }

    /// Parse raw rows and upsert them. Every row is checked before anything
    /// is written: one unknown category rejects the whole batch.
    pub async fn bulk_add_raw(&self, rows: Vec<Value>) -> StoreResult<Vec<RecordKey>> {
        let records = rows
            .into_iter()
            .map(Record::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.bulk_add_records(records).await
    }

    pub async fn list(&self, category: Category) -> StoreResult<Vec<Record>> {
        self.engine.query_by_category(category).await
    }

    pub async fn list_all(&self) -> StoreResult<Vec<Record>> {
        self.engine.query_all().await
    }

    pub async fn count(&self, category: Category) -> StoreResult<usize> {
        self.engine.count(category).await
    }

    pub async fn clear_category(&self, category: Category) -> StoreResult<usize> {
        let _guard = self.settings_guard(category).await;
        let removed = self.engine.clear_category(category).await?;
        if category == Category::Setting {
            for id in SettingId::ALL {
                self.settings.forget(id);
            }
        }
        Ok(removed)
    }

    /// Children of a parent record.
    pub async fn children_of(&self, category: Category, parent_id: &str) -> StoreResult<Vec<Record>> {
        let child = child_category(category)?;
        let mut children = self.engine.query_by_parent(parent_id).await?;
        children.retain(|r| r.category() == child);
        Ok(children)
    }

    /// Children whose parent reference matches no existing parent.
    pub async fn orphaned_children(&self, child_category: Category) -> StoreResult<Vec<Record>> {
        let parent = child_category.parent().ok_or_else(|| {
            StoreError::InvalidRecord(format!("{child_category} records have no parent"))
        })?;
        let children = self.engine.query_by_category(child_category).await?;
        let parents = self.engine.query_by_category(parent).await?;
        Ok(orphaned(children, &parents))
    }

    /// Parents that no child points at.
    pub async fn unused_parents(&self, parent_category: Category) -> StoreResult<Vec<Record>> {
        let child = child_category(parent_category)?;
        let parents = self.engine.query_by_category(parent_category).await?;
        let children = self.engine.query_by_category(child).await?;
        Ok(unused(parents, &children))
    }

    /// Keys of the children that deleting this parent would strand.
    pub async fn cascade_targets(&self, category: Category, id: &str) -> StoreResult<Vec<RecordKey>> {
        Ok(self
            .children_of(category, id)
            .await?
            .iter()
            .map(Record::key)
            .collect())
    }

    /// Delete a parent and all of its children. Returns the number of rows removed.
    pub async fn delete_with_children(&self, category: Category, id: &str) -> StoreResult<usize> {
        let child = child_category(category)?;
        let ids: Vec<String> = self
            .cascade_targets(category, id)
            .await?
            .into_iter()
            .map(|key| key.id)
            .collect();

        let mut removed = 0;
        if !ids.is_empty() {
            removed += self.engine.bulk_delete(child, ids).await?;
        }
        if self.engine.delete(category, id).await? {
            removed += 1;
        }
        Ok(removed)
    }

    async fn settings_guard(&self, category: Category) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if category == Category::Setting {
            Some(self.settings.lock_writes().await)
        } else {
            None
        }
    }

    fn mirror(&self, record: &Record) {
        if let Record::Setting(setting) = record {
            self.settings.absorb(setting);
        }
    }
}

fn child_category(category: Category) -> StoreResult<Category> {
    category
        .child()
        .ok_or_else(|| StoreError::InvalidRecord(format!("{category} records have no children")))
}

/// Setting ids are reserved for SETTING rows.
fn validate(record: &Record) -> StoreResult<()> {
    let category = record.category();
    if category != Category::Setting && record.id().parse::<SettingId>().is_ok() {
        return Err(reserved_id(category, record.id()));
    }
    Ok(())
}

fn reserved_id(category: Category, id: &str) -> StoreError {
    StoreError::InvalidRecord(format!("{category} record cannot use reserved setting id {id}"))
}
