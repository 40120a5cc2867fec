//! meridian-persistence — Postgres-backed relational store and the
//! Redis-backed Signal Queue + account cache.

pub mod cache;
pub mod db;
pub mod queue;

pub use cache::AccountCache;
pub use db::Database;
pub use queue::{SignalQueue, VixyKv, VixySnapshot};
