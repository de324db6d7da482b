//! HTTP adapters for the FixMyArea sync pipeline
//!
//! Implements the remote ports of `fixmyarea-sync` against real services:
//!
//! - **Photo hosting**: Cloudinary unsigned uploads ([`CloudinaryStorage`])
//! - **Issue documents**: Firestore REST `createDocument` ([`FirestoreReports`])
//! - **Circuit breaker**: stop calling a service that keeps failing
//! - **Request correlation**: every request carries an `X-Request-ID`
//!
//! Requests are attempted once. Failures are classified into
//! [`fixmyarea_sync::RemoteError`] and retried, durably, by the sync
//! coordinator.
//!
//! # Example
//!
//! ```rust,no_run
//! use fixmyarea_api_client::{ApiClient, ClientConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let client = ApiClient::with_config(config)?;
//!
//! let storage = client.cloudinary()?;
//! let documents = client.firestore()?;
//! println!("writing to {}", documents.collection_url());
//! # let _ = storage;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;

pub use client::ApiClient;
pub use config::{ClientConfig, Environment};
pub use endpoints::{CloudinaryStorage, FirestoreReports};
pub use error::{ApiError, ApiResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::client::ApiClient;
    pub use crate::config::{ClientConfig, Environment};
    pub use crate::endpoints::{CloudinaryStorage, FirestoreReports};
    pub use crate::error::{ApiError, ApiResult};
}
