//! ChangeSubscription tests — the reconnect state machine driven through a
//! scripted mock transport, with the tokio clock paused so backoff timing is
//! exact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use firewatch_live::realtime::types::{
    ChangeCallback, ChannelHandle, ChannelSpec, ChannelStatus, ChannelStatusCallback,
    ConnectionState, RealtimeTransport, RetryPolicy, StatusCallback, SubscriptionStatus,
};
use firewatch_live::realtime::ChangeSubscription;
use firewatch_live::types::{ChangeAction, ChangeEvent, Collection};

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Default)]
struct ChannelFlag {
    closed: AtomicBool,
}

struct MockHandle(Arc<ChannelFlag>);

impl ChannelHandle for MockHandle {
    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct Opened {
    flag: Arc<ChannelFlag>,
    on_event: Arc<ChangeCallback>,
    on_status: Arc<ChannelStatusCallback>,
}

#[derive(Default)]
struct MockTransport {
    opened: Mutex<Vec<Opened>>,
}

impl MockTransport {
    fn opened_count(&self) -> usize {
        self.opened.lock().len()
    }

    fn live_count(&self) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|c| !c.flag.closed.load(Ordering::SeqCst))
            .count()
    }

    fn is_closed(&self, index: usize) -> bool {
        self.opened.lock()[index].flag.closed.load(Ordering::SeqCst)
    }

    fn send_status(&self, index: usize, status: ChannelStatus) {
        let on_status = Arc::clone(&self.opened.lock()[index].on_status);
        on_status(status);
    }

    fn send_event(&self, index: usize, event: ChangeEvent) {
        let on_event = Arc::clone(&self.opened.lock()[index].on_event);
        on_event(event);
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn subscribe(
        &self,
        _spec: ChannelSpec,
        on_event: Arc<ChangeCallback>,
        on_status: Arc<ChannelStatusCallback>,
    ) -> Box<dyn ChannelHandle> {
        let flag = Arc::new(ChannelFlag::default());
        self.opened.lock().push(Opened {
            flag: Arc::clone(&flag),
            on_event,
            on_status,
        });
        Box::new(MockHandle(flag))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    transport: Arc<MockTransport>,
    subscription: Arc<ChangeSubscription>,
    events: Arc<Mutex<Vec<ChangeEvent>>>,
    statuses: Arc<Mutex<Vec<SubscriptionStatus>>>,
}

async fn start_subscription(policy: RetryPolicy) -> Harness {
    let transport = Arc::new(MockTransport::default());
    let events: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let statuses: Arc<Mutex<Vec<SubscriptionStatus>>> = Arc::new(Mutex::new(Vec::new()));

    let on_event: Arc<ChangeCallback> = {
        let events = Arc::clone(&events);
        Arc::new(move |event| events.lock().push(event))
    };
    let on_status: Arc<StatusCallback> = {
        let statuses = Arc::clone(&statuses);
        Arc::new(move |status| statuses.lock().push(status.clone()))
    };

    let subscription = ChangeSubscription::new(
        ChannelSpec::all(Collection::FireZones),
        Arc::clone(&transport) as Arc<dyn RealtimeTransport>,
        policy,
        on_event,
        on_status,
    );
    subscription.start().await;

    Harness {
        transport,
        subscription,
        events,
        statuses,
    }
}

fn insert_event(id: &str) -> ChangeEvent {
    ChangeEvent {
        action: ChangeAction::Insert,
        new_record: Some(json!({ "id": id })),
        old_record: None,
    }
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn start_opens_one_channel_and_reports_connecting() {
    let h = start_subscription(RetryPolicy::default()).await;

    assert_eq!(h.transport.opened_count(), 1);
    let status = h.subscription.status();
    assert_eq!(status.state, ConnectionState::Connecting);
    assert!(!status.connected);
    assert_eq!(h.statuses.lock()[0].state, ConnectionState::Connecting);
}

#[tokio::test]
async fn subscribed_marks_connected_and_clears_retry_state() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.transport.send_status(0, ChannelStatus::Subscribed);

    let status = h.subscription.status();
    assert_eq!(status.state, ConnectionState::Subscribed);
    assert!(status.connected);
    assert_eq!(status.retry_count, 0);
    assert!(status.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn closed_status_disconnects_without_retrying() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.transport.send_status(0, ChannelStatus::Closed);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.transport.opened_count(), 1, "closed must not reconnect");
    let status = h.subscription.status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert_eq!(status.retry_count, 0);
}

// ============================================================================
// Backoff schedule
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_reconnect_on_the_backoff_schedule() {
    let h = start_subscription(RetryPolicy::default()).await;

    // First failure: retry after 5s.
    h.transport.send_status(0, ChannelStatus::ChannelError);
    assert_eq!(h.subscription.status().retry_count, 1);
    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.transport.opened_count(), 1, "too early for retry 1");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.opened_count(), 2);

    // Second failure: retry after 10s.
    h.transport.send_status(1, ChannelStatus::TimedOut);
    tokio::time::sleep(Duration::from_millis(9_900)).await;
    assert_eq!(h.transport.opened_count(), 2, "too early for retry 2");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.opened_count(), 3);

    // Third failure: retry after 20s.
    h.transport.send_status(2, ChannelStatus::ChannelError);
    tokio::time::sleep(Duration::from_millis(19_900)).await;
    assert_eq!(h.transport.opened_count(), 3, "too early for retry 3");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.opened_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn a_timeout_reports_the_timed_out_state() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.transport.send_status(0, ChannelStatus::TimedOut);

    let status = h.subscription.status();
    assert_eq!(status.state, ConnectionState::TimedOut);
    assert!(status.error.unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn a_successful_subscribe_resets_the_retry_budget() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.transport.send_status(0, ChannelStatus::ChannelError);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.transport.opened_count(), 2);

    h.transport.send_status(1, ChannelStatus::Subscribed);
    assert_eq!(h.subscription.status().retry_count, 0);

    // After a reset, the next failure starts the schedule over at 5s.
    h.transport.send_status(1, ChannelStatus::ChannelError);
    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.transport.opened_count(), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.opened_count(), 3);
}

// ============================================================================
// Exhaustion
// ============================================================================

#[tokio::test(start_paused = true)]
async fn the_fourth_consecutive_failure_is_terminal() {
    let h = start_subscription(RetryPolicy::default()).await;

    for attempt in 0..3 {
        h.transport.send_status(attempt, ChannelStatus::ChannelError);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.opened_count(), attempt + 2);
    }

    h.transport.send_status(3, ChannelStatus::ChannelError);
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(h.transport.opened_count(), 4, "no retry after exhaustion");
    let status = h.subscription.status();
    assert!(status.exhausted);
    assert!(!status.connected);
    assert_eq!(status.retry_count, 3);
    assert!(
        status.error.unwrap().contains("gave up after 3 retries"),
        "terminal error should describe exhaustion"
    );
}

// ============================================================================
// Channel exclusivity
// ============================================================================

#[tokio::test(start_paused = true)]
async fn at_most_one_channel_is_live_across_reconnect_churn() {
    let h = start_subscription(RetryPolicy::default()).await;

    for attempt in 0..3 {
        h.transport.send_status(attempt, ChannelStatus::ChannelError);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(
            h.transport.is_closed(attempt),
            "superseded channel {attempt} should be closed"
        );
        assert_eq!(h.transport.live_count(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn stale_channels_no_longer_deliver_events() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.transport.send_event(0, insert_event("z-1"));
    assert_eq!(h.events.lock().len(), 1);

    h.transport.send_status(0, ChannelStatus::ChannelError);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.transport.opened_count(), 2);

    // The old channel's callbacks are epoch-stale now.
    h.transport.send_event(0, insert_event("z-2"));
    assert_eq!(h.events.lock().len(), 1, "stale channel must be muted");

    h.transport.send_event(1, insert_event("z-3"));
    assert_eq!(h.events.lock().len(), 2);
    assert_eq!(h.events.lock()[1].record_id(), Some("z-3"));
}

#[tokio::test]
async fn events_are_forwarded_verbatim() {
    let h = start_subscription(RetryPolicy::default()).await;

    let event = ChangeEvent {
        action: ChangeAction::Update,
        new_record: Some(json!({ "id": "z-1", "status": "Contained" })),
        old_record: Some(json!({ "id": "z-1", "status": "Active" })),
    };
    h.transport.send_event(0, event.clone());

    assert_eq!(h.events.lock().as_slice(), &[event]);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn dispose_cancels_the_pending_retry_and_closes_the_channel() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.transport.send_status(0, ChannelStatus::ChannelError);
    h.subscription.dispose();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(h.transport.opened_count(), 1, "retry should be cancelled");
    assert!(h.transport.is_closed(0));
    assert_eq!(h.subscription.status().state, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn late_transport_callbacks_after_dispose_are_ignored() {
    let h = start_subscription(RetryPolicy::default()).await;

    h.subscription.dispose();
    h.transport.send_status(0, ChannelStatus::Subscribed);
    h.transport.send_event(0, insert_event("z-9"));

    assert!(!h.subscription.status().connected);
    assert!(h.events.lock().is_empty());
}
