//! REST transport for the broker.

mod client;

pub use client::HttpBroker;
