pub mod api;
pub mod config;
pub mod datastore;
pub mod key;
pub mod lookup;
pub mod metrics_defs;
pub mod store;
#[cfg(test)]
mod testutils;

use config::StoreConfig;
use datastore::DatastoreStore;
use lookup::ProductLookup;
use std::sync::Arc;
use store::{FilesystemStore, ProductStore, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum ProductsError {
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] config::ValidationError),
    #[error("could not create store: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the store selected by the config. The handle is created once and
/// shared by every request.
pub fn get_store(config: &StoreConfig) -> Result<Arc<dyn ProductStore>, StoreError> {
    match config {
        StoreConfig::Datastore(datastore) => {
            tracing::info!(project_id = %datastore.project_id, "Using Cloud Datastore");
            Ok(Arc::new(DatastoreStore::from_config(datastore)?))
        }
        StoreConfig::Filesystem { path } => Ok(Arc::new(FilesystemStore::open(path)?)),
    }
}

pub async fn run(config: config::Config) -> Result<(), ProductsError> {
    config.validate()?;
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let store = get_store(&config.store)?;
    let lookup = ProductLookup::new(store);
    api::serve(&config, lookup).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::LookupKey;
    use std::io::Write;

    #[tokio::test]
    async fn test_get_filesystem_store() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"widget1": {{"matches": ["1"]}}}}"#).unwrap();

        let store = get_store(&StoreConfig::Filesystem {
            path: tmp.path().to_path_buf(),
        })
        .unwrap();

        let entity = store.get(&LookupKey::product("widget1")).await.unwrap();
        assert_eq!(entity.unwrap().matches, vec!["1".to_string()]);
    }

    #[test]
    fn test_get_store_errors() {
        let result = get_store(&StoreConfig::Filesystem {
            path: "/nonexistent/products.json".into(),
        });
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let config: config::Config =
            serde_yaml::from_str("listener: {host: 127.0.0.1, port: 0}\nstore: {type: filesystem, path: x.json}")
                .unwrap();
        assert!(matches!(
            run(config).await,
            Err(ProductsError::InvalidConfig(config::ValidationError::InvalidPort))
        ));
    }
}
