//! Poll scheduler: one bounded-concurrency pass over every Active
//! subscription per cycle, on a fixed cadence. Cycles never overlap and a
//! failing check never takes the rest of the cycle down with it.

use crate::db::{self, Pool, StoreError};
use crate::dispatch::{DeliveryOutcome, Dispatcher};
use crate::model::{PollResult, Subscription};
use crate::source::AvailabilitySource;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub max_concurrent_checks: usize,
    pub check_timeout: Duration,
    pub cycle_deadline: Duration,
}

/// Counters for one completed cycle, logged at cycle end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub checked: usize,
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

enum CheckOutcome {
    NoMatch,
    Delivered,
    AlreadyResolved,
    CheckFailed,
    DispatchFailed,
}

pub struct Poller {
    pool: Pool,
    source: Arc<dyn AvailabilitySource>,
    dispatcher: Dispatcher,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(
        pool: Pool,
        source: Arc<dyn AvailabilitySource>,
        dispatcher: Dispatcher,
        settings: PollerSettings,
    ) -> Self {
        Self {
            pool,
            source,
            dispatcher,
            settings,
        }
    }

    /// Recurring poll loop; returns when `shutdown` fires. The current cycle
    /// is awaited (bounded by the cycle deadline) before the ticker is polled
    /// again, so two cycles can never run concurrently. A shutdown signalled
    /// mid-cycle lets the cycle finish; the lifecycle controller bounds that
    /// wait with the grace period.
    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        let mut ticker = time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            match time::timeout(self.settings.cycle_deadline, self.run_cycle()).await {
                Ok(Ok(stats)) => info!(
                    checked = stats.checked,
                    matched = stats.matched,
                    delivered = stats.delivered,
                    failed = stats.failed,
                    "poll cycle complete"
                ),
                Ok(Err(err)) => error!(?err, "poll cycle aborted: subscription store unreachable"),
                Err(_) => warn!(
                    deadline = ?self.settings.cycle_deadline,
                    "cycle deadline exceeded; unfinished checks retry next cycle"
                ),
            }

            if shutdown.has_changed().unwrap_or(true) {
                break;
            }
        }
        info!("poller stopped");
    }

    /// One full pass over the Active set. The snapshot is taken once, so a
    /// subscription added mid-cycle is picked up next cycle. Only a failure
    /// to read the snapshot escalates; everything per-subscription is
    /// contained and counted.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> Result<CycleStats, StoreError> {
        let snapshot = db::active_subscriptions(&self.pool).await?;
        if snapshot.is_empty() {
            return Ok(CycleStats::default());
        }
        info!(subscriptions = snapshot.len(), "starting poll cycle");

        let stats = stream::iter(snapshot)
            .map(|sub| self.check_one(sub))
            .buffer_unordered(self.settings.max_concurrent_checks)
            .fold(CycleStats::default(), |mut acc, outcome| async move {
                acc.checked += 1;
                match outcome {
                    CheckOutcome::NoMatch | CheckOutcome::AlreadyResolved => {}
                    CheckOutcome::Delivered => {
                        acc.matched += 1;
                        acc.delivered += 1;
                    }
                    CheckOutcome::DispatchFailed => {
                        acc.matched += 1;
                        acc.failed += 1;
                    }
                    CheckOutcome::CheckFailed => acc.failed += 1,
                }
                acc
            })
            .await;
        Ok(stats)
    }

    async fn check_one(&self, sub: Subscription) -> CheckOutcome {
        // Every attempt is recorded, success or failure.
        if let Err(err) = db::touch_checked(&self.pool, sub.id, Utc::now()).await {
            warn!(?err, subscription = %sub.id, "failed to record check attempt");
        }

        let check = self.source.check_availability(&sub.resource, &sub.criteria);
        let slots = match time::timeout(self.settings.check_timeout, check).await {
            Err(_) => {
                warn!(subscription = %sub.id, "availability check timed out");
                return CheckOutcome::CheckFailed;
            }
            Ok(Err(err)) => {
                warn!(?err, subscription = %sub.id, "availability check failed");
                return CheckOutcome::CheckFailed;
            }
            Ok(Ok(slots)) => slots,
        };

        if slots.is_empty() {
            return CheckOutcome::NoMatch;
        }

        info!(
            subscription = %sub.id,
            venue = %sub.venue_name,
            slots = slots.len(),
            "availability match found"
        );
        let result = PollResult {
            subscription_id: sub.id,
            slots,
        };
        match self.dispatcher.dispatch(&sub, &result).await {
            Ok(DeliveryOutcome::Delivered) => CheckOutcome::Delivered,
            Ok(DeliveryOutcome::AlreadyResolved) => CheckOutcome::AlreadyResolved,
            Err(err) => {
                warn!(?err, subscription = %sub.id, "dispatch failed; subscription stays active");
                CheckOutcome::DispatchFailed
            }
        }
    }
}
