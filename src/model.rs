use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Party size bounds accepted by the booking site.
pub const MIN_PARTY_SIZE: u32 = 1;
pub const MAX_PARTY_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Resolved,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(SubscriptionStatus::Active),
            "RESOLVED" => Some(SubscriptionStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown meal period (expected Breakfast, Lunch or Dinner)")]
pub struct ParseMealPeriodError;

/// Meal windows offered by the reservation system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MealPeriod {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealPeriod::Breakfast => "Breakfast",
            MealPeriod::Lunch => "Lunch",
            MealPeriod::Dinner => "Dinner",
        }
    }
}

impl FromStr for MealPeriod {
    type Err = ParseMealPeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(MealPeriod::Breakfast),
            "lunch" => Ok(MealPeriod::Lunch),
            "dinner" => Ok(MealPeriod::Dinner),
            _ => Err(ParseMealPeriodError),
        }
    }
}

/// Identifies the venue being watched together with its parent location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRef {
    pub venue_id: String,
    pub location_id: String,
}

/// Search parameters a subscription is matched against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Criteria {
    pub party_size: u32,
    pub date: NaiveDate,
    pub meal_period: MealPeriod,
}

/// A durable watch request. `status` only ever moves Active -> Resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner: String,
    pub resource: ResourceRef,
    pub venue_name: String,
    pub location_name: String,
    pub criteria: Criteria,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Input for `db::add_subscription`; validated before anything is persisted.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub owner: String,
    pub resource: ResourceRef,
    pub venue_name: String,
    pub location_name: String,
    pub criteria: Criteria,
}

impl NewSubscription {
    pub fn validate(&self, today: NaiveDate) -> Result<(), &'static str> {
        if self.owner.trim().is_empty() {
            return Err("owner must be non-empty");
        }
        if self.resource.venue_id.trim().is_empty() {
            return Err("venue_id must be non-empty");
        }
        if self.resource.location_id.trim().is_empty() {
            return Err("location_id must be non-empty");
        }
        if self.criteria.party_size < MIN_PARTY_SIZE || self.criteria.party_size > MAX_PARTY_SIZE {
            return Err("party_size must be between 1 and 20");
        }
        if self.criteria.date < today {
            return Err("target date must not be in the past");
        }
        Ok(())
    }
}

/// An open reservation slot as reported by the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub time: String,
    pub external_ref: String,
}

/// Outcome of one availability check. Not persisted; an empty `slots` list
/// means "no match this cycle".
#[derive(Debug, Clone)]
pub struct PollResult {
    pub subscription_id: Uuid,
    pub slots: Vec<Slot>,
}
