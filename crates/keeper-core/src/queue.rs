//! Retrieval queue: the in-memory pool of servable boxes.
//!
//! # Architecture
//!
//! ```text
//!  writers ──submit──▶ mpsc (bounded) ──▶ Reconciler::run ──┐
//!                                           │ timer          │ upsert
//!                                           ▼                ▼
//!                                   spawned rebuild ──▶ Mutex<QueueState>
//!                                   (store scan)             ▲
//!  viewers ──retrieve_next──────────────────────────────────┘
//!                 └── record_view in the store, then rescore
//! ```
//!
//! The [`Queue`] handle is cheap to clone and is what request handlers hold.
//! The [`Reconciler`] owns the receiving end of the event buffer and is
//! consumed by [`Reconciler::run`], so there is exactly one consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{KeeperError, Result};
use crate::index::ScoredIndex;
use crate::models::{score_of, QueueItem};
use crate::selection::SelectionPolicy;
use crate::store::BoxStore;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueState {
    index: ScoredIndex,
    last_served: Option<String>,
}

struct Shared {
    state: Mutex<QueueState>,
    ready: AtomicBool,
    store: Arc<dyn BoxStore>,
}

impl Shared {
    /// Rebuild the index from the store and swap it in. Scores only move
    /// forward: an id the live index holds at a newer score keeps it.
    ///
    /// Returns the number of items installed.
    async fn reconcile(&self) -> Result<usize> {
        let served = self.store.list_served_items().await?;
        let mut fresh = ScoredIndex::from_items(served.into_iter().map(QueueItem::from));
        let mut state = self.state.lock().await;
        // Views recorded after the snapshot was read must not be rolled back.
        fresh.keep_newer_from(&state.index);
        let count = fresh.len();
        state.index = fresh;
        drop(state);
        if self
            .ready
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(items = count, "queue is ready");
        }
        Ok(count)
    }

    async fn apply(&self, item: QueueItem) {
        debug!(id = %item.id, score = item.score, "sync item received");
        self.state.lock().await.index.upsert(&item.id, item.score);
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Handle to the retrieval queue.
#[derive(Clone)]
pub struct Queue {
    shared: Arc<Shared>,
    events: mpsc::Sender<QueueItem>,
    policy: SelectionPolicy,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("ready", &self.is_ready())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Queue {
    /// Create a queue over `store`. Nothing happens until the returned
    /// [`Reconciler`] is run.
    pub fn new(store: Arc<dyn BoxStore>, config: &QueueConfig) -> (Self, Reconciler) {
        let (tx, rx) = mpsc::channel(config.buffer_capacity.max(1));
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            ready: AtomicBool::new(false),
            store,
        });
        let queue = Self {
            shared: Arc::clone(&shared),
            events: tx,
            policy: SelectionPolicy::new(config.selection_window),
        };
        let reconciler = Reconciler {
            shared,
            events: rx,
            resync_interval: config.resync_interval(),
            retry_interval: config.retry_interval(),
        };
        (queue, reconciler)
    }

    /// Create a queue and run its loop on the current runtime until `cancel`
    /// fires.
    pub fn spawn(
        store: Arc<dyn BoxStore>,
        config: &QueueConfig,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (queue, reconciler) = Self::new(store, config);
        let handle = tokio::spawn(reconciler.run(cancel));
        (queue, handle)
    }

    /// Whether the first rebuild has completed. Never goes back to false.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Queue a score update for the loop to apply.
    ///
    /// Never blocks. The update is dropped before the queue is ready and
    /// when the buffer is full; the periodic rebuild picks up anything lost.
    /// Returns whether the update was buffered.
    pub fn submit(&self, item: QueueItem) -> bool {
        if !self.is_ready() {
            debug!(id = %item.id, "queue not ready, dropping sync item");
            return false;
        }
        match self.events.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                warn!(id = %item.id, "sync buffer full, dropping item");
                false
            }
            Err(TrySendError::Closed(item)) => {
                warn!(id = %item.id, "queue loop has stopped, dropping item");
                false
            }
        }
    }

    /// Pick a box to serve, record the view in the store and rescore it.
    ///
    /// Retrievals are serialized. The index only changes after the store
    /// confirms the view, so a failed or abandoned call leaves it as it was.
    /// A box the store no longer knows is dropped from the index.
    pub async fn retrieve_next(&self) -> Result<String> {
        if !self.is_ready() {
            return Err(KeeperError::NotReady);
        }
        let mut state = self.shared.state.lock().await;
        let id = {
            let mut rng = rand::thread_rng();
            self.policy
                .select(&state.index, state.last_served.as_deref(), &mut rng)?
                .to_string()
        };

        let viewed_at = Utc::now();
        match self.shared.store.record_view(&id, viewed_at).await {
            Ok(()) => {}
            Err(KeeperError::BoxNotFound(_)) => {
                warn!(id = %id, "box vanished from the store, dropping it from the queue");
                state.index.remove(&id);
                return Err(KeeperError::BoxNotFound(id));
            }
            Err(e) => return Err(e),
        }

        state.index.upsert(&id, score_of(viewed_at));
        state.last_served = Some(id.clone());
        Ok(id)
    }

    /// [`Queue::retrieve_next`] bounded by `deadline`.
    pub async fn retrieve_next_within(&self, deadline: Duration) -> Result<String> {
        tokio::time::timeout(deadline, self.retrieve_next())
            .await
            .map_err(|_| KeeperError::Timeout)?
    }

    /// Number of boxes currently in the pool.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current score of `id`, if it is in the pool.
    pub async fn score(&self, id: &str) -> Option<i64> {
        self.shared.state.lock().await.index.get(id)
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// The queue's event loop. See [`Reconciler::run`].
pub struct Reconciler {
    shared: Arc<Shared>,
    events: mpsc::Receiver<QueueItem>,
    resync_interval: Duration,
    retry_interval: Duration,
}

impl Reconciler {
    /// Drive the queue until `cancel` fires or every [`Queue`] handle is
    /// dropped.
    ///
    /// A rebuild starts immediately, then again `resync_interval` after each
    /// success or `retry_interval` after each failure. Rebuilds run as
    /// separate tasks so sync items keep flowing while the store is slow; at
    /// most one rebuild is in flight. An in-flight rebuild is not awaited on
    /// shutdown.
    pub async fn run(mut self, cancel: CancellationToken) {
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut in_flight: Option<JoinHandle<Result<usize>>> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("queue loop stopped");
                    return;
                }

                _ = &mut timer, if in_flight.is_none() => {
                    info!("resync initialized");
                    let shared = Arc::clone(&self.shared);
                    in_flight = Some(tokio::spawn(async move { shared.reconcile().await }));
                }

                joined = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    let next = match joined {
                        Ok(Ok(count)) => {
                            info!(items = count, "resync successful");
                            self.resync_interval
                        }
                        Ok(Err(e)) => {
                            warn!(error = %e, "resync failed");
                            self.retry_interval
                        }
                        Err(e) => {
                            warn!(error = %e, "resync task aborted");
                            self.retry_interval
                        }
                    };
                    timer.as_mut().reset(tokio::time::Instant::now() + next);
                }

                maybe = self.events.recv() => match maybe {
                    Some(item) => self.shared.apply(item).await,
                    None => {
                        info!("all queue handles dropped, queue loop exiting");
                        return;
                    }
                },
            }
        }
    }
}

/// Resolves when the in-flight rebuild finishes; pending forever when none
/// is running.
async fn join_in_flight(
    task: &mut Option<JoinHandle<Result<usize>>>,
) -> std::result::Result<Result<usize>, tokio::task::JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
