// ABOUTME: Settings synchronizer: an in-memory cache of setting values kept consistent with SETTING rows.
// ABOUTME: Writes hit storage first and only then the cache; dark mode changes are also pushed through a watch channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tally_core::{Category, LogRetention, Record, Setting, SettingId};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::info;

use crate::engine::EngineHandle;
use crate::error::{StoreError, StoreResult};

/// Process-wide settings cache owned by the `Tally` context.
pub struct Settings {
    engine: EngineHandle,
    cache: RwLock<HashMap<SettingId, Value>>,
    // Serializes storage writes with their cache updates so the two never
    // land in different orders.
    write_lock: Mutex<()>,
    dark_mode: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Settings {
    pub fn new(engine: EngineHandle) -> Self {
        let (dark_mode, _) = watch::channel(dark_mode_of(&SettingId::DarkMode.default_value()));
        Self {
            engine,
            cache: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            dark_mode,
            closed: AtomicBool::new(false),
        }
    }

    /// Load stored settings, persist the coded default for every id that has
    /// no row yet, and fill the cache. Afterwards the store holds exactly one
    /// SETTING row per id.
    pub async fn initialize(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut resolved = HashMap::new();
        for record in self.engine.query_by_category(Category::Setting).await? {
            if let Record::Setting(setting) = record {
                resolved.insert(setting.id, setting.value);
            }
        }

        let missing: Vec<Record> = SettingId::ALL
            .into_iter()
            .filter(|id| !resolved.contains_key(id))
            .map(|id| Record::Setting(Setting::new(id, id.default_value())))
            .collect();
        let defaulted = missing.len();
        if !missing.is_empty() {
            self.engine.bulk_put(missing).await?;
        }

        for id in SettingId::ALL {
            resolved.entry(id).or_insert_with(|| id.default_value());
        }
        let dark = dark_mode_of(&resolved[&SettingId::DarkMode]);
        *self.cache.write() = resolved;
        self.dark_mode.send_replace(dark);

        info!(defaulted, "settings initialized");
        Ok(())
    }

    /// The cached value, or the coded default when nothing is cached.
    pub fn get(&self, id: SettingId) -> Value {
        self.cache
            .read()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.default_value())
    }

    /// Like `get`, but fails with StoreClosed once the store has been deleted.
    pub fn try_get(&self, id: SettingId) -> StoreResult<Value> {
        self.ensure_open()?;
        Ok(self.get(id))
    }

    /// Persist a setting, then update the cache. If the write fails the cache
    /// keeps its previous value.
    pub async fn set(&self, id: SettingId, value: Value) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.engine
            .put(Record::Setting(Setting::new(id, value.clone())))
            .await?;
        self.store_cached(id, value);
        Ok(())
    }

    pub fn dark_mode(&self) -> bool {
        dark_mode_of(&self.get(SettingId::DarkMode))
    }

    pub fn console_logs(&self) -> bool {
        self.get(SettingId::ConsoleLogs).as_bool().unwrap_or(false)
    }

    pub fn info_popups(&self) -> bool {
        self.get(SettingId::InfoPopups).as_bool().unwrap_or(true)
    }

    /// Unrecognized stored values fall back to the default window.
    pub fn log_retention(&self) -> LogRetention {
        LogRetention::from_value(&self.get(SettingId::LogRetention)).unwrap_or_default()
    }

    /// The retention window actually stored, without falling back to the
    /// default. `None` when the row is missing or holds an unknown value.
    pub fn stored_log_retention(&self) -> StoreResult<Option<LogRetention>> {
        self.ensure_open()?;
        Ok(self
            .cache
            .read()
            .get(&SettingId::LogRetention)
            .and_then(LogRetention::from_value))
    }

    pub async fn set_log_retention(&self, retention: LogRetention) -> StoreResult<()> {
        self.set(SettingId::LogRetention, retention.to_value()).await
    }

    /// Receiver that observes every dark mode change as soon as the cache
    /// holds it.
    pub fn watch_dark_mode(&self) -> watch::Receiver<bool> {
        self.dark_mode.subscribe()
    }

    /// Forget every cached value and mark the settings closed. Used after the
    /// store is deleted; `try_get` reports StoreClosed from then on.
    pub fn reset(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cache.write().clear();
        self.dark_mode
            .send_replace(dark_mode_of(&SettingId::DarkMode.default_value()));
    }

    /// Held by other writers of SETTING rows for the duration of their write.
    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Mirror a SETTING row that another writer has already committed.
    pub(crate) fn absorb(&self, setting: &Setting) {
        self.store_cached(setting.id, setting.value.clone());
    }

    /// Drop a cached value whose row was deleted.
    pub(crate) fn forget(&self, id: SettingId) {
        self.cache.write().remove(&id);
        if id == SettingId::DarkMode {
            self.dark_mode
                .send_replace(dark_mode_of(&id.default_value()));
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::StoreClosed);
        }
        Ok(())
    }

    fn store_cached(&self, id: SettingId, value: Value) {
        let dark = (id == SettingId::DarkMode).then(|| dark_mode_of(&value));
        self.cache.write().insert(id, value);
        if let Some(dark) = dark {
            self.dark_mode.send_replace(dark);
        }
    }
}

fn dark_mode_of(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::error::StoreError;

    #[tokio::test]
    async fn initialize_on_empty_store_persists_every_default() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Settings::new(engine.clone());
        settings.initialize().await.unwrap();

        for id in SettingId::ALL {
            assert_eq!(settings.get(id), id.default_value());
        }
        assert_eq!(
            engine.count(Category::Setting).await.unwrap(),
            SettingId::ALL.len()
        );
    }

    #[tokio::test]
    async fn initialize_keeps_stored_values() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        engine
            .put(Record::Setting(Setting::new(SettingId::DarkMode, json!(true))))
            .await
            .unwrap();

        let settings = Settings::new(engine.clone());
        settings.initialize().await.unwrap();

        assert!(settings.dark_mode());
        assert!(*settings.watch_dark_mode().borrow());
        assert_eq!(
            engine.count(Category::Setting).await.unwrap(),
            SettingId::ALL.len()
        );
    }

    #[tokio::test]
    async fn set_then_get_returns_the_value_and_persists_it() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Settings::new(engine.clone());
        settings.initialize().await.unwrap();

        settings
            .set_log_retention(LogRetention::OneWeek)
            .await
            .unwrap();
        assert_eq!(settings.log_retention(), LogRetention::OneWeek);

        let stored = engine
            .get(Category::Setting, "LOG_RETENTION")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored,
            Record::Setting(Setting::new(SettingId::LogRetention, json!("ONE_WEEK")))
        );
    }

    #[tokio::test]
    async fn get_before_initialize_falls_back_to_defaults() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Settings::new(engine);
        assert!(settings.info_popups());
        assert!(!settings.console_logs());
        assert_eq!(settings.log_retention(), LogRetention::ThreeMonths);
    }

    #[tokio::test]
    async fn dark_mode_watch_sees_new_value_immediately() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Settings::new(engine);
        settings.initialize().await.unwrap();
        let rx = settings.watch_dark_mode();
        assert!(!*rx.borrow());

        settings.set(SettingId::DarkMode, json!(true)).await.unwrap();
        assert!(*rx.borrow(), "watch must hold the value once set returns");
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tally.db");
        let engine = EngineHandle::open(&path, 16).unwrap();
        let settings = Settings::new(engine);
        settings.initialize().await.unwrap();

        // Make every SETTING write fail from underneath the engine.
        let saboteur = rusqlite::Connection::open(&path).unwrap();
        saboteur
            .execute_batch(
                "CREATE TRIGGER reject_setting_insert BEFORE INSERT ON records
                 WHEN NEW.category = 'SETTING'
                 BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END;
                 CREATE TRIGGER reject_setting_update BEFORE UPDATE ON records
                 WHEN NEW.category = 'SETTING'
                 BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END;",
            )
            .unwrap();

        let err = settings
            .set(SettingId::DarkMode, json!(true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageIo(_)), "got {err}");
        assert!(!settings.dark_mode());
        assert!(!*settings.watch_dark_mode().borrow());
    }

    #[tokio::test]
    async fn reset_drops_cached_values() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Settings::new(engine);
        settings.initialize().await.unwrap();
        settings.set(SettingId::InfoPopups, json!(false)).await.unwrap();

        settings.reset();
        assert!(settings.info_popups());
        assert!(matches!(
            settings.try_get(SettingId::InfoPopups),
            Err(StoreError::StoreClosed)
        ));
        assert!(matches!(
            settings.stored_log_retention(),
            Err(StoreError::StoreClosed)
        ));
    }

    #[tokio::test]
    async fn stored_log_retention_does_not_fall_back_to_the_default() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Settings::new(engine);
        settings.initialize().await.unwrap();
        assert_eq!(
            settings.stored_log_retention().unwrap(),
            Some(LogRetention::ThreeMonths)
        );

        settings
            .set(SettingId::LogRetention, json!("EVERY_OTHER_TUESDAY"))
            .await
            .unwrap();
        assert_eq!(settings.stored_log_retention().unwrap(), None);
        assert_eq!(settings.log_retention(), LogRetention::ThreeMonths);

        settings.forget(SettingId::LogRetention);
        assert_eq!(settings.stored_log_retention().unwrap(), None);
        assert_eq!(
            settings.try_get(SettingId::LogRetention).unwrap(),
            SettingId::LogRetention.default_value()
        );
    }
}
