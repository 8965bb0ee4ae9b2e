//! `stockade-core` — configuration and top-level error types shared by every
//! Stockade crate.

pub mod config;
pub mod error;

pub use config::{LockConfig, LockStrategy, StockadeConfig, STATE_ACCESS, TRIGGER_ACCESS};
pub use error::{Result, StockadeError};
