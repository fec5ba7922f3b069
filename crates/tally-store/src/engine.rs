// ABOUTME: Persistence engine actor that owns the record table and serializes every operation on it.
// ABOUTME: EngineHandle sends requests over mpsc and publishes a ChangeEvent on broadcast after each committed write.

use std::path::Path;

use serde_json::{Map, Value};
use tally_core::{Category, Record, RecordKey};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::sqlite::RecordTable;

/// What a committed write changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Put(Vec<RecordKey>),
    Update { from: RecordKey, to: RecordKey },
    Delete(Vec<RecordKey>),
    Clear(Category),
    StoreDeleted,
}

/// Published once per committed write, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub sequence: u64,
    pub kind: ChangeKind,
}

type Reply<T> = oneshot::Sender<StoreResult<T>>;

enum Command {
    Get {
        category: Category,
        id: String,
        reply: Reply<Option<Record>>,
    },
    Insert {
        record: Record,
        reply: Reply<RecordKey>,
    },
    Put {
        record: Record,
        reply: Reply<RecordKey>,
    },
    BulkPut {
        records: Vec<Record>,
        reply: Reply<Vec<RecordKey>>,
    },
    Update {
        category: Category,
        id: String,
        changes: Map<String, Value>,
        reply: Reply<Record>,
    },
    Delete {
        category: Category,
        id: String,
        reply: Reply<bool>,
    },
    BulkDelete {
        category: Category,
        ids: Vec<String>,
        reply: Reply<usize>,
    },
    Clear {
        category: Category,
        reply: Reply<usize>,
    },
    QueryCategory {
        category: Category,
        reply: Reply<Vec<Record>>,
    },
    QueryParent {
        parent_id: String,
        reply: Reply<Vec<Record>>,
    },
    QueryAll {
        reply: Reply<Vec<Record>>,
    },
    Count {
        category: Category,
        reply: Reply<usize>,
    },
    DeleteStore {
        reply: Reply<()>,
    },
}

/// Cloneable handle to the engine. Every method is async and resolves once
/// the engine has processed the request; requests are handled strictly in
/// submission order.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<Command>,
    change_tx: broadcast::Sender<ChangeEvent>,
}

impl EngineHandle {
    /// Open a file-backed engine.
    pub fn open(path: &Path, capacity: usize) -> StoreResult<Self> {
        spawn(RecordTable::open(path)?, capacity)
    }

    /// Open an engine over a private in-memory table.
    pub fn open_in_memory(capacity: usize) -> StoreResult<Self> {
        spawn(RecordTable::open_in_memory()?, capacity)
    }

    /// Subscribe to change notifications published after each committed write.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> StoreResult<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| StoreError::StoreClosed)?;
        rx.await.map_err(|_| StoreError::StoreClosed)?
    }

    pub async fn get(&self, category: Category, id: &str) -> StoreResult<Option<Record>> {
        let id = id.to_string();
        self.request(|reply| Command::Get {
            category,
            id,
            reply,
        })
        .await
    }

    /// Insert a record, failing with DuplicateKey if its key exists.
    pub async fn insert(&self, record: Record) -> StoreResult<RecordKey> {
        self.request(|reply| Command::Insert { record, reply }).await
    }

    /// Insert or overwrite a record.
    pub async fn put(&self, record: Record) -> StoreResult<RecordKey> {
        self.request(|reply| Command::Put { record, reply }).await
    }

    /// Upsert all records in one transaction, returning their keys in order.
    pub async fn bulk_put(&self, records: Vec<Record>) -> StoreResult<Vec<RecordKey>> {
        self.request(|reply| Command::BulkPut { records, reply })
            .await
    }

    /// Merge partial fields into an existing record. A changed `id` re-keys
    /// the record atomically.
    pub async fn update(
        &self,
        category: Category,
        id: &str,
        changes: Map<String, Value>,
    ) -> StoreResult<Record> {
        let id = id.to_string();
        self.request(|reply| Command::Update {
            category,
            id,
            changes,
            reply,
        })
        .await
    }

    /// Delete a record. Absent keys are not an error.
    pub async fn delete(&self, category: Category, id: &str) -> StoreResult<bool> {
        let id = id.to_string();
        self.request(|reply| Command::Delete {
            category,
            id,
            reply,
        })
        .await
    }

    pub async fn bulk_delete(&self, category: Category, ids: Vec<String>) -> StoreResult<usize> {
        self.request(|reply| Command::BulkDelete {
            category,
            ids,
            reply,
        })
        .await
    }

    pub async fn clear_category(&self, category: Category) -> StoreResult<usize> {
        self.request(|reply| Command::Clear { category, reply })
            .await
    }

    pub async fn query_by_category(&self, category: Category) -> StoreResult<Vec<Record>> {
        self.request(|reply| Command::QueryCategory { category, reply })
            .await
    }

    pub async fn query_by_parent(&self, parent_id: &str) -> StoreResult<Vec<Record>> {
        let parent_id = parent_id.to_string();
        self.request(|reply| Command::QueryParent { parent_id, reply })
            .await
    }

    pub async fn query_all(&self) -> StoreResult<Vec<Record>> {
        self.request(|reply| Command::QueryAll { reply }).await
    }

    pub async fn count(&self, category: Category) -> StoreResult<usize> {
        self.request(|reply| Command::Count { category, reply })
            .await
    }

    /// Destroy every record, close the table, and remove its files. Every
    /// later request fails with StoreClosed, including when this call itself
    /// fails while removing files.
    pub async fn delete_store(&self) -> StoreResult<()> {
        self.request(|reply| Command::DeleteStore { reply }).await
    }
}

/// Start the engine on a dedicated thread so SQLite calls never block the
/// async runtime.
fn spawn(table: RecordTable, capacity: usize) -> StoreResult<EngineHandle> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(capacity);
    let (change_tx, _) = broadcast::channel::<ChangeEvent>(capacity);

    let actor = EngineActor {
        table: Some(table),
        cmd_rx,
        change_tx: change_tx.clone(),
        sequence: 0,
    };

    std::thread::Builder::new()
        .name("tally-engine".to_string())
        .spawn(move || actor.run())?;

    Ok(EngineHandle { cmd_tx, change_tx })
}

struct EngineActor {
    table: Option<RecordTable>,
    cmd_rx: mpsc::Receiver<Command>,
    change_tx: broadcast::Sender<ChangeEvent>,
    sequence: u64,
}

impl EngineActor {
    fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.blocking_recv() {
            self.handle(cmd);
        }
        debug!("engine stopped: all handles dropped");
    }

    fn table(&mut self) -> StoreResult<&mut RecordTable> {
        self.table.as_mut().ok_or(StoreError::StoreClosed)
    }

    /// Publish before replying so a writer that awaits its reply can rely on
    /// the notification already being queued.
    fn publish(&mut self, kind: ChangeKind) {
        self.sequence += 1;
        debug!(sequence = self.sequence, ?kind, "change committed");
        // No receivers is fine
        let _ = self.change_tx.send(ChangeEvent {
            sequence: self.sequence,
            kind,
        });
    }

    fn handle(&mut self, cmd: Command) {
        // Ignore reply send errors: the caller may have gone away
        match cmd {
            Command::Get {
                category,
                id,
                reply,
            } => {
                let _ = reply.send(self.table().and_then(|t| t.get(category, &id)));
            }

            Command::Insert { record, reply } => {
                let result = self.table().and_then(|t| t.insert(record));
                if let Ok(key) = &result {
                    self.publish(ChangeKind::Put(vec![key.clone()]));
                }
                let _ = reply.send(result);
            }

            Command::Put { record, reply } => {
                let result = self.table().and_then(|t| t.put(record));
                if let Ok(key) = &result {
                    self.publish(ChangeKind::Put(vec![key.clone()]));
                }
                let _ = reply.send(result);
            }

            Command::BulkPut { records, reply } => {
                let result = self.table().and_then(|t| t.bulk_put(records));
                if let Ok(keys) = &result {
                    if !keys.is_empty() {
                        self.publish(ChangeKind::Put(keys.clone()));
                    }
                }
                let _ = reply.send(result);
            }

            Command::Update {
                category,
                id,
                changes,
                reply,
            } => {
                let result = self.table().and_then(|t| t.update(category, &id, &changes));
                if let Ok(record) = &result {
                    self.publish(ChangeKind::Update {
                        from: RecordKey::new(category, id),
                        to: record.key(),
                    });
                }
                let _ = reply.send(result);
            }

            Command::Delete {
                category,
                id,
                reply,
            } => {
                let result = self.table().and_then(|t| t.delete(category, &id));
                if let Ok(true) = result {
                    self.publish(ChangeKind::Delete(vec![RecordKey::new(category, id)]));
                }
                let _ = reply.send(result);
            }

            Command::BulkDelete {
                category,
                ids,
                reply,
            } => {
                let result = self.table().and_then(|t| t.bulk_delete(category, &ids));
                if matches!(result, Ok(removed) if removed > 0) {
                    let keys = ids
                        .into_iter()
                        .map(|id| RecordKey::new(category, id))
                        .collect();
                    self.publish(ChangeKind::Delete(keys));
                }
                let _ = reply.send(result);
            }

            Command::Clear { category, reply } => {
                let result = self.table().and_then(|t| t.clear_category(category));
                if matches!(result, Ok(removed) if removed > 0) {
                    self.publish(ChangeKind::Clear(category));
                }
                let _ = reply.send(result);
            }

            Command::QueryCategory { category, reply } => {
                let _ = reply.send(self.table().and_then(|t| t.list_category(category)));
            }

            Command::QueryParent { parent_id, reply } => {
                let _ = reply.send(self.table().and_then(|t| t.list_by_parent(&parent_id)));
            }

            Command::QueryAll { reply } => {
                let _ = reply.send(self.table().and_then(|t| t.list_all()));
            }

            Command::Count { category, reply } => {
                let _ = reply.send(self.table().and_then(|t| t.count(category)));
            }

            Command::DeleteStore { reply } => {
                // The table is gone even when removing its files fails.
                let was_open = self.table.is_some();
                let result = self.delete_store();
                if was_open {
                    self.publish(ChangeKind::StoreDeleted);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn delete_store(&mut self) -> StoreResult<()> {
        let table = self.table.take().ok_or(StoreError::StoreClosed)?;
        let Some(path) = table.close()? else {
            info!("in-memory store deleted");
            return Ok(());
        };

        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = ?file, error = %e, "failed to remove store file");
                    return Err(e.into());
                }
            }
        }
        info!(path = %path.display(), "store deleted");
        Ok(())
    }
}
