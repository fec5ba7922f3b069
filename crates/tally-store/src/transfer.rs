// ABOUTME: Import/export codec wrapping selected record categories in a portable JSON envelope.
// ABOUTME: Imports reject foreign documents, drop unknown categories, and regenerate log surrogate ids.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::blueprint::lookup;
use tally_core::record::now_millis;
use tally_core::{Category, Record};
use tracing::{info, warn};

use crate::crud::RecordService;
use crate::error::{StoreError, StoreResult};

/// Identity stamped into every export and required on import.
pub const APP_NAME: &str = "Tally";

/// The portable export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub app_name: String,
    pub exported_timestamp: i64,
    pub exported_records_count: usize,
    pub records: Vec<Value>,
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub dropped: usize,
}

/// Export every record whose category is in `categories`.
pub async fn export_records(
    service: &RecordService,
    categories: &[Category],
) -> StoreResult<ExportEnvelope> {
    let mut records = Vec::new();
    for record in service.list_all().await? {
        if categories.contains(&record.category()) {
            records.push(record.to_value()?);
        }
    }

    Ok(ExportEnvelope {
        app_name: APP_NAME.to_string(),
        exported_timestamp: now_millis().timestamp_millis(),
        exported_records_count: records.len(),
        records,
    })
}

/// Import a document produced by `export_records`.
pub async fn import_records(service: &RecordService, document: Value) -> StoreResult<ImportSummary> {
    let found = document
        .get("appName")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if found != APP_NAME {
        return Err(StoreError::ForeignApp {
            expected: APP_NAME.to_string(),
            found,
        });
    }
    let envelope: ExportEnvelope = serde_json::from_value(document)?;

    let mut summary = ImportSummary::default();
    let mut records = Vec::with_capacity(envelope.records.len());
    for raw in envelope.records {
        let tag = raw.get("category").and_then(Value::as_str).unwrap_or_default();
        if lookup(tag).is_none() {
            warn!(category = tag, "dropping imported record with unknown category");
            summary.dropped += 1;
            continue;
        }
        let mut record = Record::from_value(raw)?;
        record.assign_log_id(String::new());
        records.push(record);
    }

    summary.imported = service.bulk_add_records(records).await?.len();
    info!(imported = summary.imported, dropped = summary.dropped, "records imported");
    Ok(summary)
}

/// Export to a pretty-printed JSON file.
pub async fn write_export(
    service: &RecordService,
    path: &Path,
    categories: &[Category],
) -> StoreResult<ExportEnvelope> {
    let envelope = export_records(service, categories).await?;
    let json = serde_json::to_string_pretty(&envelope)?;
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), count = envelope.exported_records_count, "export written");
    Ok(envelope)
}

/// Read an export file and import it.
pub async fn read_import(service: &RecordService, path: &Path) -> StoreResult<ImportSummary> {
    let contents = tokio::fs::read_to_string(path).await?;
    let document: Value = serde_json::from_str(&contents)?;
    import_records(service, document).await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use serde_json::json;
    use tally_core::demo::demo_records;
    use tally_core::{Log, Severity};

    use crate::engine::EngineHandle;
    use crate::settings::Settings;

    async fn service() -> RecordService {
        let engine = EngineHandle::open_in_memory(64).unwrap();
        let settings = Arc::new(Settings::new(engine.clone()));
        settings.initialize().await.unwrap();
        RecordService::new(engine, settings)
    }

    async fn clear_all(svc: &RecordService) {
        for category in Category::ALL {
            svc.clear_category(category).await.unwrap();
        }
    }

    #[tokio::test]
    async fn export_includes_only_requested_categories() {
        let svc = service().await;
        svc.bulk_add_records(demo_records(2, 1)).await.unwrap();

        let envelope = export_records(&svc, &[Category::Example]).await.unwrap();
        assert_eq!(envelope.app_name, APP_NAME);
        assert_eq!(envelope.exported_records_count, 2);
        assert!(envelope.records.iter().all(|r| r["category"] == "EXAMPLE"));
    }

    #[tokio::test]
    async fn round_trip_reproduces_records_except_log_ids() {
        let svc = service().await;
        svc.bulk_add_records(demo_records(3, 2)).await.unwrap();
        svc.bulk_add_records(vec![
            Record::Log(Log::new(Severity::Info, "first", None)),
            Record::Log(Log::new(Severity::Error, "second", Some(json!({"code": 7})))),
        ])
        .await
        .unwrap();

        let before = svc.list_all().await.unwrap();
        let envelope = export_records(&svc, &Category::ALL).await.unwrap();
        assert_eq!(envelope.exported_records_count, before.len());

        clear_all(&svc).await;
        let document = serde_json::to_value(&envelope).unwrap();
        let summary = import_records(&svc, document).await.unwrap();
        assert_eq!(summary.imported, before.len());
        assert_eq!(summary.dropped, 0);

        let after = svc.list_all().await.unwrap();
        let non_logs = |records: &[Record]| -> Vec<Record> {
            records
                .iter()
                .filter(|r| r.category() != Category::Log)
                .cloned()
                .collect()
        };
        assert_eq!(non_logs(&after), non_logs(&before));

        let log_names = |records: &[Record]| -> BTreeSet<String> {
            records
                .iter()
                .filter(|r| r.category() == Category::Log)
                .filter_map(|r| r.name().map(str::to_string))
                .collect()
        };
        assert_eq!(log_names(&after), log_names(&before));
    }

    #[tokio::test]
    async fn log_numbering_survives_a_round_trip() {
        let svc = service().await;
        for n in 1..=11 {
            svc.create_record(Record::Log(Log::new(Severity::Info, format!("log{n}"), None)))
                .await
                .unwrap();
        }

        let envelope = export_records(&svc, &[Category::Log]).await.unwrap();
        clear_all(&svc).await;
        import_records(&svc, serde_json::to_value(&envelope).unwrap())
            .await
            .unwrap();

        for n in 1..=11 {
            let log = svc
                .get_record(Category::Log, &n.to_string())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(log.name(), Some(format!("log{n}").as_str()));
        }
    }

    #[tokio::test]
    async fn foreign_document_is_rejected() {
        let svc = service().await;
        let document = json!({
            "appName": "Other",
            "exportedTimestamp": 0,
            "exportedRecordsCount": 0,
            "records": []
        });
        let err = import_records(&svc, document).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignApp { found, .. } if found == "Other"));
    }

    #[tokio::test]
    async fn unknown_categories_are_dropped() {
        let svc = service().await;
        let mut parent = tally_core::Parent::new("kept");
        parent.id = "p1".to_string();
        let document = json!({
            "appName": APP_NAME,
            "exportedTimestamp": 0,
            "exportedRecordsCount": 2,
            "records": [
                Record::Example(parent).to_value().unwrap(),
                {"category": "WIDGET", "id": "w1"}
            ]
        });

        let summary = import_records(&svc, document).await.unwrap();
        assert_eq!(summary, ImportSummary { imported: 1, dropped: 1 });
        assert_eq!(svc.count(Category::Example).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn imported_logs_get_fresh_ids() {
        let svc = service().await;
        svc.create_record(Record::Log(Log::new(Severity::Info, "existing", None)))
            .await
            .unwrap();

        let mut incoming = Log::new(Severity::Warn, "incoming", None);
        incoming.id = "1".to_string();
        let document = json!({
            "appName": APP_NAME,
            "exportedTimestamp": 0,
            "exportedRecordsCount": 1,
            "records": [Record::Log(incoming).to_value().unwrap()]
        });
        import_records(&svc, document).await.unwrap();

        assert_eq!(svc.count(Category::Log).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn file_helpers_round_trip_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        let svc = service().await;
        svc.bulk_add_records(demo_records(1, 1)).await.unwrap();

        let envelope = write_export(&svc, &path, &[Category::Test, Category::TestResult])
            .await
            .unwrap();
        clear_all(&svc).await;

        let summary = read_import(&svc, &path).await.unwrap();
        assert_eq!(summary.imported, envelope.exported_records_count);
        assert_eq!(svc.count(Category::Test).await.unwrap(), 1);
    }
}
