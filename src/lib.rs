//! dinewatch: watches restaurant reservation availability for stored
//! subscriptions and notifies each requester exactly once when a match
//! appears. Intake of new subscriptions happens outside this crate through
//! `db::add_subscription`; the poller and dispatcher never see UI types.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod poller;
pub mod source;
