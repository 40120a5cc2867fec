//! meridian-services — the two long-running binaries that wire
//! `meridian-engine`'s pure decision logic to the broker, queue, and
//! database adapters. Shared setup (broker/db/queue/cache/notifier
//! construction) lives here; each binary's loop lives in its own module
//! so `src/bin/*.rs` stays a thin `main`.

pub mod context;
pub mod order_executor;
pub mod signal_generator;

pub use context::AppContext;
