//! Port traits (interfaces) implemented by the storage drivers

pub mod storage;

pub use storage::StorageBackend;
