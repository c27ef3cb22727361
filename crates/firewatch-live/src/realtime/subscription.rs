//! ChangeSubscription — one collection's change feed, kept alive through a
//! reconnect-with-backoff state machine.
//!
//! # Threading model
//!
//! All mutable state lives in a single `parking_lot::Mutex<Inner>`. The lock
//! is never held while invoking a callback, awaiting the transport, or
//! closing a channel handle. Retry timers are spawned tokio tasks; a
//! superseding attempt aborts the pending timer before opening a new channel,
//! so at most one timer is pending and at most one channel is live per
//! subscription.
//!
//! Attempts are epoch-numbered: callbacks wired into a channel capture the
//! epoch of the attempt that opened it, and transitions carrying a stale
//! epoch are ignored. A channel that loses the race to a newer attempt is
//! closed instead of stored. Events published while a channel is down are
//! lost, not replayed — the refresh path recovers from that gap.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::RealtimeError;
use crate::realtime::types::{
    ChangeCallback, ChannelHandle, ChannelSpec, ChannelStatus, ChannelStatusCallback,
    ConnectionState, RealtimeTransport, RetryPolicy, StatusCallback, SubscriptionStatus,
};

// ============================================================================
// Pure transition planning
// ============================================================================

/// What a channel status means for the subscription, given its retry budget.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Channel is live: reset retry state.
    Connected,
    /// Transient failure: schedule a reconnect after `delay`.
    Retry {
        failure: ConnectionState,
        delay: Duration,
    },
    /// Retries exhausted: stop trying for the rest of the session.
    Exhausted { failure: ConnectionState },
    /// Channel closed without error: no implicit retry.
    Closed,
}

pub(crate) fn plan_transition(
    status: ChannelStatus,
    retry_count: u32,
    policy: &RetryPolicy,
) -> Transition {
    match status {
        ChannelStatus::Subscribed => Transition::Connected,
        ChannelStatus::TimedOut | ChannelStatus::ChannelError => {
            let failure = if status == ChannelStatus::TimedOut {
                ConnectionState::TimedOut
            } else {
                ConnectionState::Error
            };
            if retry_count < policy.max_retries {
                Transition::Retry {
                    failure,
                    delay: policy.delay_for(retry_count),
                }
            } else {
                Transition::Exhausted { failure }
            }
        }
        ChannelStatus::Closed => Transition::Closed,
    }
}

// ============================================================================
// ChangeSubscription
// ============================================================================

struct Inner {
    state: ConnectionState,
    retry_count: u32,
    last_error: Option<String>,
    exhausted: bool,
    channel: Option<Box<dyn ChannelHandle>>,
    retry_task: Option<JoinHandle<()>>,
    /// Bumped on every attempt; callbacks carrying an older value are stale.
    epoch: u64,
    disposed: bool,
}

pub struct ChangeSubscription {
    spec: ChannelSpec,
    transport: Arc<dyn RealtimeTransport>,
    policy: RetryPolicy,
    on_event: Arc<ChangeCallback>,
    on_status: Arc<StatusCallback>,
    inner: Mutex<Inner>,
}

impl ChangeSubscription {
    pub fn new(
        spec: ChannelSpec,
        transport: Arc<dyn RealtimeTransport>,
        policy: RetryPolicy,
        on_event: Arc<ChangeCallback>,
        on_status: Arc<StatusCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            spec,
            transport,
            policy,
            on_event,
            on_status,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                retry_count: 0,
                last_error: None,
                exhausted: false,
                channel: None,
                retry_task: None,
                epoch: 0,
                disposed: false,
            }),
        })
    }

    /// Open the first channel. Further attempts are driven by the state
    /// machine; callers never call this twice.
    pub async fn start(self: &Arc<Self>) {
        self.attempt().await;
    }

    /// Current status snapshot.
    pub fn status(&self) -> SubscriptionStatus {
        self.snapshot(&self.inner.lock())
    }

    /// Cancel any pending retry and close the current channel. Late
    /// transport callbacks become no-ops. Idempotent.
    pub fn dispose(&self) {
        let channel = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.state = ConnectionState::Closed;
            if let Some(task) = inner.retry_task.take() {
                task.abort();
            }
            inner.channel.take()
        };
        close_if_open(channel);
        tracing::debug!(collection = %self.spec.collection, "subscription disposed");
    }

    // -----------------------------------------------------------------------
    // Attempt lifecycle
    // -----------------------------------------------------------------------

    /// Supersede any previous attempt and open a fresh channel.
    async fn attempt(self: &Arc<Self>) {
        let (epoch, stale_channel) = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            if let Some(task) = inner.retry_task.take() {
                task.abort();
            }
            inner.epoch += 1;
            inner.state = ConnectionState::Connecting;
            (inner.epoch, inner.channel.take())
        };
        close_if_open(stale_channel);
        self.notify();

        let on_event: Arc<ChangeCallback> = {
            let sub = Arc::clone(self);
            Arc::new(move |event| {
                {
                    let inner = sub.inner.lock();
                    if inner.disposed || inner.epoch != epoch {
                        return;
                    }
                }
                (sub.on_event)(event);
            })
        };
        let on_status: Arc<ChannelStatusCallback> = {
            let sub = Arc::clone(self);
            Arc::new(move |status| sub.handle_channel_status(epoch, status))
        };

        let channel = self
            .transport
            .subscribe(self.spec.clone(), on_event, on_status)
            .await;

        // A newer attempt (or dispose) may have won the race while we were
        // awaiting the transport; its channel must not stay live.
        let mut opened = Some(channel);
        {
            let mut inner = self.inner.lock();
            if !inner.disposed && inner.epoch == epoch {
                inner.channel = opened.take();
            }
        }
        close_if_open(opened);
    }

    /// Apply one transport status to the state machine.
    fn handle_channel_status(self: &Arc<Self>, epoch: u64, status: ChannelStatus) {
        {
            let mut inner = self.inner.lock();
            if inner.disposed || inner.epoch != epoch {
                return;
            }
            match plan_transition(status, inner.retry_count, &self.policy) {
                Transition::Connected => {
                    inner.state = ConnectionState::Subscribed;
                    inner.retry_count = 0;
                    inner.last_error = None;
                }
                Transition::Retry { failure, delay } => {
                    inner.state = failure;
                    inner.last_error = Some(self.failure_error(status).to_string());
                    inner.retry_count += 1;
                    tracing::debug!(
                        collection = %self.spec.collection,
                        retry = inner.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "realtime channel lost, reconnect scheduled"
                    );
                    // Registered under the lock so a concurrent supersede
                    // cannot miss it. The task re-checks the epoch: if a
                    // newer attempt started while it slept, it must not
                    // tear that attempt down.
                    let sub = Arc::clone(self);
                    inner.retry_task = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        {
                            let inner = sub.inner.lock();
                            if inner.disposed || inner.epoch != epoch {
                                return;
                            }
                        }
                        sub.attempt().await;
                    }));
                }
                Transition::Exhausted { failure } => {
                    inner.state = failure;
                    inner.exhausted = true;
                    let last = inner
                        .last_error
                        .take()
                        .unwrap_or_else(|| self.failure_error(status).to_string());
                    inner.last_error = Some(
                        RealtimeError::RetriesExhausted {
                            collection: self.spec.collection,
                            retries: self.policy.max_retries,
                            last_error: last,
                        }
                        .to_string(),
                    );
                }
                Transition::Closed => {
                    inner.state = ConnectionState::Closed;
                }
            }
        }

        self.notify();
    }

    fn failure_error(&self, status: ChannelStatus) -> RealtimeError {
        match status {
            ChannelStatus::TimedOut => RealtimeError::Timeout {
                collection: self.spec.collection,
            },
            _ => RealtimeError::Channel {
                collection: self.spec.collection,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Status reporting
    // -----------------------------------------------------------------------

    fn snapshot(&self, inner: &Inner) -> SubscriptionStatus {
        SubscriptionStatus {
            collection: self.spec.collection,
            state: inner.state,
            connected: inner.state == ConnectionState::Subscribed,
            error: inner.last_error.clone(),
            retry_count: inner.retry_count,
            exhausted: inner.exhausted,
        }
    }

    /// Push the current snapshot to the owner. Lock is released first.
    fn notify(&self) {
        let snapshot = {
            let inner = self.inner.lock();
            self.snapshot(&inner)
        };
        (self.on_status)(&snapshot);
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.retry_task.take() {
            task.abort();
        }
        close_if_open(inner.channel.take());
    }
}

fn close_if_open(channel: Option<Box<dyn ChannelHandle>>) {
    if let Some(channel) = channel {
        if !channel.is_closed() {
            channel.close();
        }
    }
}

// ============================================================================
// Tests — pure transition function
// ============================================================================
