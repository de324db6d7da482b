//! Core utilities for the FixMyArea report sync pipeline
//!
//! This crate provides shared functionality used by the sync engine, the
//! HTTP adapters and the command-line front end:
//!
//! - **Error handling**: errors with codes, context and recovery suggestions
//! - **Retry policy**: exponential backoff with jitter, circuit breaker
//! - **Clock**: injectable time source for scheduling retries
//! - **Configuration**: TOML-based configuration with defaults and validation
//! - **Validation**: fluent, multi-error input validation
//!
//! # Example
//!
//! ```rust,no_run
//! use fixmyarea_core::config::Config;
//!
//! let config = Config::load(None).expect("invalid configuration");
//! println!("queue lives in {}", config.app.store.dir.display());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod error;
pub mod retry;
pub mod validation;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{AppConfig, Config};
    pub use crate::error::{exit_codes, Error, ErrorCode, Result, ResultExt};
    pub use crate::retry::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig};
    pub use crate::validation::{FieldError, ValidationResult, Validator};
}
