//! meridian-core — shared domain models, types, config, and error taxonomy
//! for the signal-generator and order-executor services.

pub mod config;
pub mod errors;
pub mod models;
pub mod types;

pub use config::Config;
pub use errors::{Error, Result};
pub use models::*;
pub use types::*;
