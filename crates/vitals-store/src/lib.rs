//! Vitals storage layer
//!
//! Users, health records and settings behind one [`Storage`] facade that
//! can run on an embedded redb file or a MySQL server, switch between them
//! at runtime, and back up or restore the embedded store.

pub mod backup;
pub mod config;
pub mod facade;
pub mod services;
pub mod storage;

pub use config::{BootstrapAdmin, ConfigStore, StorageOptions};
pub use facade::Storage;
pub use services::{AuthService, IdleTimeout};

pub use vitals_core::*;
