//! RefreshController — the full-resync path that bypasses the stream.
//!
//! Exists precisely because the stream offers no replay: events published
//! while a channel was down are gone, and a refresh is how visibility is
//! recovered. Each cycle fetches the three watched collections
//! independently; a failed fetch is reported but never blocks applying the
//! ones that succeeded.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::RequestError;
use crate::remote::RemoteStore;
use crate::store::live::LiveStateStore;
use crate::store::notify::StoreEvent;
use crate::types::Collection;

// ============================================================================
// RefreshReport
// ============================================================================

/// Outcome of one refresh cycle. Never an `Err` — per-collection failures
/// are collected here, partial replacement is documented behavior.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Collections whose contents were replaced with fresh data.
    pub refreshed: Vec<Collection>,
    /// Collections whose fetch failed; their previous contents were kept.
    pub errors: Vec<(Collection, RequestError)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed_collections(&self) -> Vec<Collection> {
        self.errors.iter().map(|(c, _)| *c).collect()
    }
}

// ============================================================================
// RefreshController
// ============================================================================

struct Slot {
    running: bool,
    /// Callers that arrived while a cycle was running — they all share that
    /// cycle's report instead of stampeding the remote store.
    waiters: Vec<oneshot::Sender<RefreshReport>>,
}

pub struct RefreshController {
    store: Arc<LiveStateStore>,
    remote: Arc<dyn RemoteStore>,
    slot: Mutex<Slot>,
    interval_task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshController {
    pub fn new(store: Arc<LiveStateStore>, remote: Arc<dyn RemoteStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            remote,
            slot: Mutex::new(Slot {
                running: false,
                waiters: Vec::new(),
            }),
            interval_task: Mutex::new(None),
        })
    }

    /// Re-fetch all three collections and replace in-memory state with the
    /// results, regardless of what the subscriptions are doing.
    ///
    /// Overlapping calls coalesce: a caller arriving mid-cycle awaits the
    /// running cycle's report.
    pub async fn refresh(self: &Arc<Self>) -> RefreshReport {
        let waiting = {
            let mut slot = self.slot.lock();
            if slot.running {
                let (tx, rx) = oneshot::channel();
                slot.waiters.push(tx);
                Some(rx)
            } else {
                slot.running = true;
                None
            }
        };

        if let Some(rx) = waiting {
            return rx.await.unwrap_or_default();
        }

        let report = self.run_cycle().await;

        let waiters = {
            let mut slot = self.slot.lock();
            slot.running = false;
            std::mem::take(&mut slot.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(report.clone());
        }

        report
    }

    async fn run_cycle(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        for collection in Collection::ALL {
            match self.remote.fetch_all(collection.name()).await {
                Ok(rows) => {
                    let count = self.store.replace_all(collection, rows);
                    tracing::debug!(collection = %collection, count, "collection refreshed");
                    report.refreshed.push(collection);
                }
                Err(e) => {
                    tracing::warn!(
                        collection = %collection,
                        error = %e,
                        "refresh fetch failed, keeping previous contents"
                    );
                    report.errors.push((collection, e));
                }
            }
        }

        self.store.emit(&StoreEvent::RefreshFinished {
            refreshed: report.refreshed.clone(),
            failed: report.failed_collections(),
        });
        report
    }

    // -----------------------------------------------------------------------
    // Periodic resync (opt-in)
    // -----------------------------------------------------------------------

    /// Run `refresh()` every `period` until [`stop_interval`] is called.
    /// Replaces any previously started interval.
    ///
    /// [`stop_interval`]: RefreshController::stop_interval
    pub fn start_interval(self: &Arc<Self>, period: Duration) {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the seed/snapshot already covers
            // "now", so skip the zeroth tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                controller.refresh().await;
            }
        });

        let mut slot = self.interval_task.lock();
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Stop the periodic resync. The spawned task holds a reference to the
    /// controller, so this must be called for the controller to be dropped.
    pub fn stop_interval(&self) {
        if let Some(task) = self.interval_task.lock().take() {
            task.abort();
        }
    }
}
