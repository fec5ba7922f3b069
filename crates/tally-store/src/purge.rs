// ABOUTME: Log retention purger deleting LOG records older than the configured retention window.
// ABOUTME: Runs on demand or periodically from a background task driven by tokio's interval timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_core::{Category, LogRetention, Record};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::EngineHandle;
use crate::error::{StoreError, StoreResult};
use crate::settings::Settings;

pub struct LogPurger {
    engine: EngineHandle,
    settings: Arc<Settings>,
}

impl LogPurger {
    pub fn new(engine: EngineHandle, settings: Arc<Settings>) -> Self {
        Self { engine, settings }
    }

    /// Delete logs older than the retention window. Returns how many were
    /// removed; keeping logs forever, or having no recognizable retention
    /// setting stored, removes nothing.
    pub async fn purge_expired_logs(&self) -> StoreResult<usize> {
        let Some(retention) = self.settings.stored_log_retention()? else {
            debug!("no log retention stored; nothing to purge");
            return Ok(0);
        };
        self.purge_at(retention, Utc::now()).await
    }

    async fn purge_at(&self, retention: LogRetention, now: DateTime<Utc>) -> StoreResult<usize> {
        let Some(window) = retention.window() else {
            debug!("log retention is forever; nothing to purge");
            return Ok(0);
        };
        let cutoff = now - window;

        let expired: Vec<String> = self
            .engine
            .query_by_category(Category::Log)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                Record::Log(log) if log.created_timestamp < cutoff => Some(log.id),
                _ => None,
            })
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }
        let removed = self.engine.bulk_delete(Category::Log, expired).await?;
        info!(removed, ?retention, %cutoff, "purged expired logs");
        Ok(removed)
    }

    /// Purge every `period` until the store is deleted or the handle is aborted.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match self.purge_expired_logs().await {
                    Ok(_) => {}
                    Err(StoreError::StoreClosed) => {
                        info!("store closed; stopping log purger");
                        return;
                    }
                    Err(e) => error!(error = %e, "log purge failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tally_core::{Log, Severity};

    async fn purger_with_logs(ages: &[TimeDelta]) -> (LogPurger, EngineHandle, Arc<Settings>) {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Arc::new(Settings::new(engine.clone()));
        settings.initialize().await.unwrap();

        let now = Utc::now();
        let logs = ages
            .iter()
            .map(|age| {
                let mut log = Log::new(Severity::Info, "aged", None);
                log.created_timestamp = now - *age;
                Record::Log(log)
            })
            .collect();
        engine.bulk_put(logs).await.unwrap();

        let purger = LogPurger::new(engine.clone(), Arc::clone(&settings));
        (purger, engine, settings)
    }

    #[tokio::test]
    async fn one_week_retention_removes_only_older_logs_once() {
        let (purger, engine, settings) = purger_with_logs(&[
            TimeDelta::days(10),
            TimeDelta::days(5),
            TimeDelta::hours(1),
        ])
        .await;
        settings
            .set_log_retention(LogRetention::OneWeek)
            .await
            .unwrap();

        assert_eq!(purger.purge_expired_logs().await.unwrap(), 1);
        assert_eq!(purger.purge_expired_logs().await.unwrap(), 0);
        assert_eq!(engine.count(Category::Log).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn forever_keeps_everything() {
        let (purger, engine, settings) =
            purger_with_logs(&[TimeDelta::days(4000), TimeDelta::days(1)]).await;
        settings
            .set_log_retention(LogRetention::Forever)
            .await
            .unwrap();

        assert_eq!(purger.purge_expired_logs().await.unwrap(), 0);
        assert_eq!(engine.count(Category::Log).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_retention_row_purges_nothing() {
        let (purger, engine, settings) = purger_with_logs(&[TimeDelta::days(200)]).await;
        let service = crate::crud::RecordService::new(engine.clone(), Arc::clone(&settings));
        service
            .delete_record(Category::Setting, "LOG_RETENTION")
            .await
            .unwrap();

        assert_eq!(purger.purge_expired_logs().await.unwrap(), 0);
        assert_eq!(engine.count(Category::Log).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unrecognized_retention_value_purges_nothing() {
        let (purger, engine, settings) = purger_with_logs(&[TimeDelta::days(200)]).await;
        settings
            .set(tally_core::SettingId::LogRetention, serde_json::json!("SOMETIMES"))
            .await
            .unwrap();

        assert_eq!(purger.purge_expired_logs().await.unwrap(), 0);
        assert_eq!(engine.count(Category::Log).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn log_exactly_at_cutoff_is_kept() {
        let (purger, engine, _settings) = purger_with_logs(&[]).await;
        let now = tally_core::record::now_millis();
        let mut log = Log::new(Severity::Warn, "edge", None);
        log.created_timestamp = now - TimeDelta::days(7);
        engine.put(Record::Log(log)).await.unwrap();

        let removed = purger.purge_at(LogRetention::OneWeek, now).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn background_purger_stops_when_store_is_deleted() {
        let (purger, engine, settings) = purger_with_logs(&[TimeDelta::days(400)]).await;
        settings
            .set_log_retention(LogRetention::OneYear)
            .await
            .unwrap();

        let handle = Arc::new(purger).spawn(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.count(Category::Log).await.unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("background purge should remove the expired log");

        engine.delete_store().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("purger should stop after the store closes")
            .unwrap();
    }
}
