//! # AppShell Common
//!
//! Shared ambient utilities for the AppShell cache worker crates.
//!
//! ## Features
//!
//! - Logging configuration and setup on top of `tracing`
//! - Retry with exponential backoff for network operations

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, RetryConfig};
