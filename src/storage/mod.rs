//! Persistent key-value storage for session values

mod filesystem;
mod memory;
mod traits;

pub use filesystem::FileStore;
pub use memory::MemoryStore;
pub use traits::{KeyValueStore, StorageError};

use crate::config::{StorageBackendConfig, StorageConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the configured store.
///
/// Storage is allowed to be unavailable (read-only home, sandboxed runtime):
/// the session then falls back to memory and simply does not survive a restart.
pub fn open_store(config: &StorageConfig) -> Arc<dyn KeyValueStore> {
    match &config.backend {
        StorageBackendConfig::Memory => {
            info!("Session storage: memory");
            Arc::new(MemoryStore::new())
        }
        StorageBackendConfig::File { path } => match FileStore::open(path) {
            Ok(store) => {
                info!("Session storage: {}", path.display());
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    "Session storage at {} unavailable ({}), falling back to memory",
                    path.display(),
                    e
                );
                Arc::new(MemoryStore::new())
            }
        },
    }
}
