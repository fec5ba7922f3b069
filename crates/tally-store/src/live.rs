// ABOUTME: Live query subscriptions that re-run a stored query after every committed write and push the result.
// ABOUTME: Each subscription is a task fed by the engine's change broadcast; unsubscribing discards any pending delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{FutureExt, StreamExt};
use parking_lot::ReentrantMutex;
use tally_core::{LiveQuery, Record};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::engine::EngineHandle;
use crate::error::{StoreError, StoreResult};

/// Liveness shared between a subscription handle and its task. Deliveries
/// happen under `gate`, so once `unsubscribe` returns no callback is running
/// or will run.
struct Liveness {
    active: AtomicBool,
    gate: ReentrantMutex<()>,
}

impl Liveness {
    /// Run `deliver` only while the subscription is still active.
    fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let _gate = self.gate.lock();
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        deliver();
        true
    }
}

/// Handle to an active live query. Dropping it unsubscribes.
pub struct Subscription {
    liveness: Arc<Liveness>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop deliveries. Safe to call more than once, and from inside a callback.
    ///
    /// If a callback is running on another thread this blocks the calling
    /// thread until it returns, so callbacks should stay short. Async callers
    /// that cannot afford that can drop the handle inside `spawn_blocking`.
    pub fn unsubscribe(&self) {
        self.liveness.active.store(false, Ordering::SeqCst);
        // Wait out a delivery that is already running on another thread.
        drop(self.liveness.gate.lock());
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        self.liveness.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Registers live queries against one engine.
#[derive(Clone)]
pub struct LiveQueries {
    engine: EngineHandle,
}

impl LiveQueries {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Deliver the query's current result to `on_next`, then again after
    /// every committed write. Query failures go to `on_error`; after a
    /// StoreClosed error the subscription ends.
    pub fn subscribe<N, E>(&self, query: LiveQuery, on_next: N, on_error: E) -> Subscription
    where
        N: Fn(Vec<Record>) + Send + Sync + 'static,
        E: Fn(StoreError) + Send + Sync + 'static,
    {
        let liveness = Arc::new(Liveness {
            active: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
        });
        // Subscribe before the initial query so no write slips between them.
        let changes = BroadcastStream::new(self.engine.subscribe());
        let task = tokio::spawn(run(
            self.engine.clone(),
            query,
            changes,
            Arc::clone(&liveness),
            on_next,
            on_error,
        ));
        Subscription { liveness, task }
    }
}

async fn run<N, E>(
    engine: EngineHandle,
    query: LiveQuery,
    mut changes: BroadcastStream<crate::engine::ChangeEvent>,
    liveness: Arc<Liveness>,
    on_next: N,
    on_error: E,
) where
    N: Fn(Vec<Record>) + Send + Sync + 'static,
    E: Fn(StoreError) + Send + Sync + 'static,
{
    loop {
        match evaluate(&engine, &query).await {
            Ok(records) => {
                if !liveness.deliver(|| on_next(records)) {
                    return;
                }
            }
            Err(StoreError::StoreClosed) => {
                liveness.deliver(|| on_error(StoreError::StoreClosed));
                debug!(category = %query.category, "live query ended: store closed");
                return;
            }
            Err(err) => {
                if !liveness.deliver(|| on_error(err)) {
                    return;
                }
            }
        }

        match changes.next().await {
            None => return,
            Some(Ok(_)) => {}
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                warn!(skipped, category = %query.category, "live query lagged; re-running");
            }
        }
        // Coalesce a burst of writes into one re-run.
        while let Some(Some(_)) = changes.next().now_or_never() {}
    }
}

/// Run a query against the current table contents.
async fn evaluate(engine: &EngineHandle, query: &LiveQuery) -> StoreResult<Vec<Record>> {
    let records = engine.query_by_category(query.category).await?;
    let related = match query.related_category() {
        Some(category) => engine.query_by_category(category).await?,
        None => Vec::new(),
    };
    Ok(query.evaluate(records, &related))
}
