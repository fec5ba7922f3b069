// ABOUTME: Application logger that records LOG rows and optionally mirrors them to tracing.
// ABOUTME: Mirroring follows the CONSOLE_LOGS setting at the moment each entry is written.

use std::sync::Arc;

use serde_json::Value;
use tally_core::{Log, Record, RecordKey, Severity};

use crate::engine::EngineHandle;
use crate::error::StoreResult;
use crate::settings::Settings;

#[derive(Clone)]
pub struct RecordLogger {
    engine: EngineHandle,
    settings: Arc<Settings>,
}

impl RecordLogger {
    pub fn new(engine: EngineHandle, settings: Arc<Settings>) -> Self {
        Self { engine, settings }
    }

    /// Store a log entry under the next surrogate id.
    pub async fn log(
        &self,
        severity: Severity,
        name: &str,
        details: Option<Value>,
    ) -> StoreResult<RecordKey> {
        if self.settings.console_logs() {
            mirror(severity, name, details.as_ref());
        }
        self.engine
            .put(Record::Log(Log::new(severity, name, details)))
            .await
    }

    pub async fn debug(&self, name: &str, details: Option<Value>) -> StoreResult<RecordKey> {
        self.log(Severity::Debug, name, details).await
    }

    pub async fn info(&self, name: &str, details: Option<Value>) -> StoreResult<RecordKey> {
        self.log(Severity::Info, name, details).await
    }

    pub async fn warn(&self, name: &str, details: Option<Value>) -> StoreResult<RecordKey> {
        self.log(Severity::Warn, name, details).await
    }

    pub async fn error(&self, name: &str, details: Option<Value>) -> StoreResult<RecordKey> {
        self.log(Severity::Error, name, details).await
    }
}

fn mirror(severity: Severity, name: &str, details: Option<&Value>) {
    let details = details.map(Value::to_string).unwrap_or_default();
    match severity {
        Severity::Debug => tracing::debug!(target: "tally::log", %details, "{name}"),
        Severity::Info => tracing::info!(target: "tally::log", %details, "{name}"),
        Severity::Warn => tracing::warn!(target: "tally::log", %details, "{name}"),
        Severity::Error => tracing::error!(target: "tally::log", %details, "{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::{Category, SettingId};

    #[tokio::test]
    async fn entries_are_stored_with_increasing_ids() {
        let engine = EngineHandle::open_in_memory(16).unwrap();
        let settings = Arc::new(Settings::new(engine.clone()));
        settings.initialize().await.unwrap();
        settings.set(SettingId::ConsoleLogs, json!(true)).await.unwrap();
        let logger = RecordLogger::new(engine.clone(), settings);

        let first = logger.info("started", None).await.unwrap();
        let second = logger
            .error("failed", Some(json!({"reason": "quota"})))
            .await
            .unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");

        let stored = engine.get(Category::Log, "2").await.unwrap().unwrap();
        match stored {
            Record::Log(log) => {
                assert_eq!(log.severity, Severity::Error);
                assert_eq!(log.name, "failed");
                assert_eq!(log.details, Some(json!({"reason": "quota"})));
            }
            other => panic!("expected Log, got {:?}", other),
        }
    }
}
