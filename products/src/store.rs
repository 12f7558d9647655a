//! Read access to the key-value store holding product records.
use crate::key::LookupKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("datastore request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("datastore returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not obtain access token: {0}")]
    Token(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("lookup of {0} was deferred by the datastore")]
    Deferred(String),

    #[error("malformed entity {path}: {reason}")]
    MalformedEntity { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A product record as stored. Each element of `matches` is itself a JSON
/// document encoded as a string.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductEntity {
    pub matches: Vec<String>,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Point lookup. Returns `Ok(None)` when no record exists for the key and
    /// an error only when the store itself could not be queried.
    async fn get(&self, key: &LookupKey) -> Result<Option<ProductEntity>, StoreError>;
}

/// Serves products from a JSON fixture file shaped like
/// `{"widget1": {"matches": ["\"a\""]}}`. Meant for local development.
pub struct FilesystemStore {
    path: PathBuf,
    products: HashMap<String, ProductEntity>,
}

impl FilesystemStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let reader = BufReader::new(File::open(&path)?);
        let products: HashMap<String, ProductEntity> = serde_json::from_reader(reader)?;

        tracing::info!(
            path = %path.display(),
            products = products.len(),
            "Loaded product fixtures"
        );

        Ok(FilesystemStore { path, products })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProductStore for FilesystemStore {
    async fn get(&self, key: &LookupKey) -> Result<Option<ProductEntity>, StoreError> {
        // The fixture only holds the products kind.
        if key.kind != crate::key::PRODUCTS_KIND {
            return Ok(None);
        }
        Ok(self.products.get(&key.name).cloned())
    }
}
