use crate::key::LookupKey;
use crate::metrics_defs::{LOOKUP_FAILED, LOOKUP_FOUND, LOOKUP_NOT_FOUND, STORE_LOOKUP_DURATION};
use crate::store::{ProductEntity, ProductStore, StoreError};
use serde_json::Value;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("Key not provided. Make sure you have a \"term\" parameter in your request")]
    MissingTerm,

    #[error("No entity found for key {path}.")]
    NotFound { path: String },

    #[error("invalid match {index} for key {path}: {source}")]
    InvalidMatch {
        path: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LookupError {
    /// Whether the caller is at fault rather than the service or its store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LookupError::MissingTerm)
    }
}

/// Resolves a search term to the decoded matches stored on its product.
/// Cheap to clone; all clones share the same store handle.
#[derive(Clone)]
pub struct ProductLookup {
    store: Arc<dyn ProductStore>,
}

impl ProductLookup {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        ProductLookup { store }
    }

    pub async fn lookup(&self, term: Option<&str>) -> Result<Vec<Value>, LookupError> {
        let result = self.lookup_inner(term).await;

        let metric_def = match &result {
            Ok(_) => LOOKUP_FOUND,
            Err(LookupError::NotFound { .. }) => LOOKUP_NOT_FOUND,
            Err(_) => LOOKUP_FAILED,
        };
        counter!(metric_def).increment(1);

        result
    }

    async fn lookup_inner(&self, term: Option<&str>) -> Result<Vec<Value>, LookupError> {
        let term = term
            .filter(|term| !term.is_empty())
            .ok_or(LookupError::MissingTerm)?;
        let key = LookupKey::product(term);

        let started = Instant::now();
        let entity = self.store.get(&key).await;
        histogram!(STORE_LOOKUP_DURATION).record(started.elapsed().as_secs_f64());

        let entity = entity?.ok_or_else(|| LookupError::NotFound { path: key.path() })?;
        tracing::debug!(key = %key, matches = entity.matches.len(), "Found product");

        decode_matches(&entity, &key)
    }
}

/// Decodes every stored match in order. A single invalid match fails the
/// whole lookup.
fn decode_matches(entity: &ProductEntity, key: &LookupKey) -> Result<Vec<Value>, LookupError> {
    entity
        .matches
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_str(raw).map_err(|source| LookupError::InvalidMatch {
                path: key.path(),
                index,
                source,
            })
        })
        .collect()
}
