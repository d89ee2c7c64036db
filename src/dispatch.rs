//! Notification dispatcher: delivers a found match at most once per
//! subscription and records the resolution only after confirmed delivery.

use crate::db::{self, Pool, StoreError};
use crate::model::{PollResult, Slot, Subscription, SubscriptionStatus};
use crate::notify::{Notifier, NotifyError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load subscription state: {0}")]
    Lookup(#[source] StoreError),
    #[error(transparent)]
    Delivery(#[from] NotifyError),
    #[error("notification delivered but resolution not recorded: {0}")]
    Resolution(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    AlreadyResolved,
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: Pool,
    notifier: Arc<dyn Notifier>,
    max_slots_shown: usize,
}

impl Dispatcher {
    pub fn new(pool: Pool, notifier: Arc<dyn Notifier>, max_slots_shown: usize) -> Self {
        Self {
            pool,
            notifier,
            max_slots_shown,
        }
    }

    /// Deliver one found-match notification. The stored status is re-read
    /// first so a repeated dispatch for an already-resolved subscription
    /// never sends a second message. A delivery failure leaves the
    /// subscription Active; it will be re-notified on a later match.
    #[instrument(skip_all, fields(subscription = %subscription.id))]
    pub async fn dispatch(
        &self,
        subscription: &Subscription,
        result: &PollResult,
    ) -> Result<DeliveryOutcome, DispatchError> {
        let current = db::get_subscription(&self.pool, subscription.id)
            .await
            .map_err(DispatchError::Lookup)?;
        match current {
            Some(sub) if sub.status == SubscriptionStatus::Resolved => {
                info!("subscription already resolved; skipping notification");
                return Ok(DeliveryOutcome::AlreadyResolved);
            }
            Some(_) => {}
            None => {
                warn!("subscription no longer exists; skipping notification");
                return Ok(DeliveryOutcome::AlreadyResolved);
            }
        }

        let message = format_match_message(subscription, &result.slots, self.max_slots_shown);
        self.notifier.send(&subscription.owner, &message).await?;

        match db::mark_resolved(&self.pool, subscription.id, Utc::now()).await {
            Ok(_) => {
                info!(owner = %subscription.owner, "notification delivered; subscription resolved");
                Ok(DeliveryOutcome::Delivered)
            }
            Err(err) => {
                // The message went out but the store did not record it. The
                // subscription stays Active, so the requester may be notified
                // again on the next match.
                error!(?err, "delivered notification but could not mark subscription resolved");
                Err(DispatchError::Resolution(err))
            }
        }
    }
}

/// Human-readable match notification. Slots appear in source order, truncated
/// to `max_shown`; truncation never affects whether the dispatch succeeds.
pub fn format_match_message(sub: &Subscription, slots: &[Slot], max_shown: usize) -> String {
    let shown = &slots[..slots.len().min(max_shown)];
    let mut times = shown
        .iter()
        .map(|s| s.time.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if slots.len() > shown.len() {
        times.push_str(&format!(" (+{} more)", slots.len() - shown.len()));
    }

    format!(
        "A reservation just opened at {venue}!\n\
         Location: {location}\n\
         Date: {date}\n\
         Party size: {party}\n\
         Meal: {meal}\n\
         Times: {times}",
        venue = sub.venue_name,
        location = sub.location_name,
        date = sub.criteria.date,
        party = sub.criteria.party_size,
        meal = sub.criteria.meal_period.as_str(),
        times = times,
    )
}
