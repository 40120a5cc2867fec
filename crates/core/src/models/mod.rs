//! Domain models shared by the signal-generator and order-executor services

mod account;
mod cohort;
mod kline;
mod order;
mod position_stop;
mod signal;
mod signal_history;

pub use account::*;
pub use cohort::*;
pub use kline::*;
pub use order::*;
pub use position_stop::*;
pub use signal::*;
pub use signal_history::*;
