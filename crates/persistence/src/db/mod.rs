//! Postgres-backed relational store.

pub mod calendar;
mod connection;
pub mod klines;
pub mod orders;
pub mod position_stops;
pub mod signal_history;

pub use connection::Database;
pub use klines::PgKlineStore;
