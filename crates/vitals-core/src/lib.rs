//! Vitals Core Library
//!
//! Error type, input validation and the storage port implemented by every
//! backend driver.

// Re-export pure types from vitals-types
pub use vitals_types::*;

pub mod error;
pub mod ports;
pub mod validate;

pub use error::{Result, StoreError};
pub use ports::StorageBackend;
