use chrono::{Days, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use dinewatch::db;
use dinewatch::dispatch::{DeliveryOutcome, Dispatcher};
use dinewatch::model::{
    Criteria, MealPeriod, NewSubscription, PollResult, ResourceRef, Slot, SubscriptionStatus,
};
use dinewatch::notify::{Notifier, NotifyError};
use dinewatch::poller::{Poller, PollerSettings};
use dinewatch::source::{AvailabilitySource, SourceError};

async fn setup_pool() -> sqlx::SqlitePool {
    // One connection: pooled in-memory databases are per-connection.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn new_subscription(owner: &str) -> NewSubscription {
    NewSubscription {
        owner: owner.to_string(),
        resource: ResourceRef {
            venue_id: "venue-1".into(),
            location_id: "loc-1".into(),
        },
        venue_name: "Chez Test".into(),
        location_name: "Lakeside".into(),
        criteria: Criteria {
            party_size: 4,
            date: Utc::now().date_naive() + Days::new(30),
            meal_period: MealPeriod::Dinner,
        },
    }
}

fn slot(time: &str, external_ref: &str) -> Slot {
    Slot {
        time: time.into(),
        external_ref: external_ref.into(),
    }
}

/// Source fed from a response queue; an exhausted queue answers "no slots".
#[derive(Clone, Default)]
struct ScriptedSource {
    responses: Arc<Mutex<VecDeque<Result<Vec<Slot>, SourceError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    fn with_responses(responses: Vec<Result<Vec<Slot>, SourceError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait::async_trait]
impl AvailabilitySource for ScriptedSource {
    async fn check_availability(
        &self,
        resource: &ResourceRef,
        _criteria: &Criteria,
    ) -> Result<Vec<Slot>, SourceError> {
        self.calls.lock().await.push(resource.venue_id.clone());
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Notifier that records every send; an exhausted response queue delivers.
#[derive(Clone, Default)]
struct RecordingNotifier {
    responses: Arc<Mutex<VecDeque<Result<(), NotifyError>>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    fn with_responses(responses: Vec<Result<(), NotifyError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, owner: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((owner.to_string(), message.to_string()));
        self.responses.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

fn build_poller(
    pool: &sqlx::SqlitePool,
    source: &ScriptedSource,
    notifier: &RecordingNotifier,
) -> Poller {
    let dispatcher = Dispatcher::new(pool.clone(), Arc::new(notifier.clone()), 5);
    Poller::new(
        pool.clone(),
        Arc::new(source.clone()),
        dispatcher,
        PollerSettings {
            interval: Duration::from_millis(10),
            max_concurrent_checks: 4,
            check_timeout: Duration::from_secs(5),
            cycle_deadline: Duration::from_secs(30),
        },
    )
}

#[tokio::test]
async fn match_resolves_subscription_exactly_once() {
    let pool = setup_pool().await;
    let id = db::add_subscription(&pool, &new_subscription("1001"))
        .await
        .unwrap();

    let source = ScriptedSource::with_responses(vec![Ok(vec![]), Ok(vec![slot("6:30 PM", "x1")])]);
    let notifier = RecordingNotifier::default();
    let poller = build_poller(&pool, &source, &notifier);

    // First cycle: no availability yet.
    let stats = poller.run_cycle().await.unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.delivered, 0);
    let sub = db::get_subscription(&pool, id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.last_checked_at.is_some());

    // Second cycle: a slot opened up.
    let stats = poller.run_cycle().await.unwrap();
    assert_eq!(stats.matched, 1);
    assert_eq!(stats.delivered, 1);
    let sub = db::get_subscription(&pool, id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Resolved);
    assert!(sub.resolved_at.is_some());

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "1001");
    assert!(sent[0].1.contains("Chez Test"));
    assert!(sent[0].1.contains("6:30 PM"));

    // Third cycle: the resolved subscription is skipped entirely.
    let stats = poller.run_cycle().await.unwrap();
    assert_eq!(stats.checked, 0);
    assert_eq!(source.call_count().await, 2);
    assert_eq!(notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn delivery_failure_keeps_subscription_active() {
    let pool = setup_pool().await;
    let id = db::add_subscription(&pool, &new_subscription("1001"))
        .await
        .unwrap();

    let source = ScriptedSource::with_responses(vec![
        Ok(vec![slot("6:30 PM", "x1")]),
        Ok(vec![slot("7:15 PM", "x2")]),
    ]);
    let notifier = RecordingNotifier::with_responses(vec![
        Err(NotifyError::Send("recipient unreachable".into())),
        Ok(()),
    ]);
    let poller = build_poller(&pool, &source, &notifier);

    // Delivery fails: the subscription must stay eligible for retry.
    let stats = poller.run_cycle().await.unwrap();
    assert_eq!(stats.matched, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 0);
    let sub = db::get_subscription(&pool, id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);

    // Next cycle re-checks and re-notifies; this time delivery sticks.
    let stats = poller.run_cycle().await.unwrap();
    assert_eq!(stats.delivered, 1);
    let sub = db::get_subscription(&pool, id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Resolved);
    assert_eq!(notifier.sent().await.len(), 2);
}

#[tokio::test]
async fn duplicate_dispatch_is_a_noop() {
    let pool = setup_pool().await;
    let id = db::add_subscription(&pool, &new_subscription("1001"))
        .await
        .unwrap();
    let sub = db::get_subscription(&pool, id).await.unwrap().unwrap();

    let notifier = RecordingNotifier::default();
    let dispatcher = Dispatcher::new(pool.clone(), Arc::new(notifier.clone()), 5);
    let result = PollResult {
        subscription_id: id,
        slots: vec![slot("6:30 PM", "x1")],
    };

    let outcome = dispatcher.dispatch(&sub, &result).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    // A forced duplicate dispatch must not send a second message.
    let outcome = dispatcher.dispatch(&sub, &result).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::AlreadyResolved);
    assert_eq!(notifier.sent().await.len(), 1);

    // The store-level transition is idempotent too.
    assert!(!db::mark_resolved(&pool, id, Utc::now()).await.unwrap());
}

#[tokio::test]
async fn source_failure_reads_as_no_availability() {
    let pool = setup_pool().await;
    let id = db::add_subscription(&pool, &new_subscription("1001"))
        .await
        .unwrap();

    let source = ScriptedSource::with_responses(vec![
        Err(SourceError::Unavailable("status 503".into())),
        Err(SourceError::Malformed("unexpected body".into())),
    ]);
    let notifier = RecordingNotifier::default();
    let poller = build_poller(&pool, &source, &notifier);

    for _ in 0..2 {
        let stats = poller.run_cycle().await.unwrap();
        assert_eq!(stats.checked, 1);
        assert_eq!(stats.failed, 1);
    }

    // Failed checks never fabricate a match and never notify.
    let sub = db::get_subscription(&pool, id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.last_checked_at.is_some());
    assert!(notifier.sent().await.is_empty());
}

#[tokio::test]
async fn invalid_request_is_rejected_before_persisting() {
    let pool = setup_pool().await;

    let mut bad = new_subscription("1001");
    bad.criteria.party_size = 0;
    assert!(db::add_subscription(&pool, &bad).await.is_err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
