use crate::key::LookupKey;
use crate::store::{ProductEntity, ProductStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store that records every key it is asked for.
#[derive(Default)]
pub struct MockStore {
    products: HashMap<String, ProductEntity>,
    unavailable: bool,
    requested: Mutex<Vec<LookupKey>>,
}

impl MockStore {
    pub fn with_product(mut self, name: &str, matches: &[&str]) -> Self {
        self.products.insert(
            name.to_string(),
            ProductEntity {
                matches: matches.iter().map(|m| m.to_string()).collect(),
            },
        );
        self
    }

    /// Every lookup fails as if the store could not be reached.
    pub fn unavailable() -> Self {
        MockStore {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn requested(&self) -> Vec<LookupKey> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductStore for MockStore {
    async fn get(&self, key: &LookupKey) -> Result<Option<ProductEntity>, StoreError> {
        self.requested.lock().unwrap().push(key.clone());

        if self.unavailable {
            return Err(StoreError::Status {
                status: 503,
                body: "datastore unavailable".into(),
            });
        }

        Ok(self.products.get(&key.name).cloned())
    }
}
