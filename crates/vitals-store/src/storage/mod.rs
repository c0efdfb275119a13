//! Storage drivers
//!
//! redb (embedded, a single file under the data directory) or MySQL
//! (relational, over the network). Both implement [`StorageBackend`].

pub mod embedded;
pub mod relational;

pub use embedded::EmbeddedStore;
pub use relational::RelationalStore;

use std::path::Path;
use vitals_core::{BackendConfig, Result, StorageBackend};

/// Open the driver selected by `config`
pub async fn connect(
    config: &BackendConfig,
    embedded_path: &Path,
) -> Result<Box<dyn StorageBackend>> {
    match config {
        BackendConfig::Embedded => Ok(Box::new(EmbeddedStore::open(embedded_path).await?)),
        BackendConfig::Relational(relational) => {
            Ok(Box::new(RelationalStore::connect(relational).await?))
        }
    }
}
