//! Collaborators built on top of the storage facade

pub mod auth;
pub mod settings;

pub use auth::AuthService;
pub use settings::IdleTimeout;
