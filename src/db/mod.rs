//! Database module: the subscription store.
//!
//! `repo` holds SQL-only functions that map rows into the domain entities in
//! `crate::model`. External modules should import from `dinewatch::db` — the
//! repository API is re-exported here.

pub mod repo;

pub use repo::*;
