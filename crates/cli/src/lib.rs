//! Terminal presentation for the FixMyArea command-line tool
//!
//! - Status messages and report listings
//! - Progress indicators while the queue drains

#![warn(missing_docs)]

pub mod output;
pub mod progress;
