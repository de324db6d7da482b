//! Remote service adapters
//!
//! Each module implements one of the sync pipeline's remote ports.
//!
//! | Module | Service | Port |
//! |--------|---------|------|
//! | `cloudinary` | Cloudinary unsigned image upload | `ObjectStorage` |
//! | `firestore` | Firestore REST `issues` collection | `DocumentStore` |

pub mod cloudinary;
pub mod firestore;

pub use cloudinary::CloudinaryStorage;
pub use firestore::{FirestoreReports, encode_document, to_firestore_value};
