//! Storage backends for Compass.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;

use std::sync::Arc;

use compass_config::AppConfig;
use compass_core::{ConversationStore, StoreError};
use tracing::info;

/// Open the backend named in `store.backend`.
pub fn open(config: &AppConfig) -> Result<Arc<dyn ConversationStore>, StoreError> {
    let store: Arc<dyn ConversationStore> = match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "file" => Arc::new(FileStore::new(config.data_dir())),
        "none" => Arc::new(NoopStore),
        other => {
            return Err(StoreError::Unavailable(format!("unknown store backend '{other}'")));
        }
    };
    info!(backend = store.name(), "Store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_selects_backend() {
        let mut config = AppConfig::default();
        config.store.backend = "memory".into();
        assert_eq!(open(&config).unwrap().name(), "memory");

        config.store.backend = "none".into();
        assert_eq!(open(&config).unwrap().name(), "none");

        let dir = tempfile::tempdir().unwrap();
        config.store.backend = "file".into();
        config.store.path = Some(dir.path().display().to_string());
        assert_eq!(open(&config).unwrap().name(), "file");

        config.store.backend = "redis".into();
        assert!(open(&config).is_err());
    }
}
