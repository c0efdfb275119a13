//! Vitals Types - Pure type definitions
//!
//! Data shared by the storage drivers, the facade and its collaborators.
//! No async runtime and no database dependencies live here.

pub mod backend;
pub mod record;
pub mod user;

pub use backend::*;
pub use record::*;
pub use user::*;
