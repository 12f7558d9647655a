//! Cloud Datastore client speaking the v1 REST API.
//!
//! Only the `projects/{project}:lookup` method is used. A lookup for a key that
//! has no entity is reported by the datastore under `missing`, which maps to
//! `Ok(None)`.

use crate::config::{Credentials, DatastoreConfig};
use crate::key::LookupKey;
use crate::store::{ProductEntity, ProductStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_ENDPOINT: &str = "https://datastore.googleapis.com";
const EMULATOR_HOST_ENV: &str = "DATASTORE_EMULATOR_HOST";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
// Tokens are refreshed this long before the metadata server says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const MATCHES_PROPERTY: &str = "matches";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    database_id: Option<&'a str>,
    keys: Vec<Key<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Key<'a> {
    partition_id: PartitionId<'a>,
    path: Vec<PathElement<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PartitionId<'a> {
    project_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace_id: Option<&'a str>,
}

#[derive(Serialize)]
struct PathElement<'a> {
    kind: &'a str,
    name: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct LookupResponse {
    found: Vec<EntityResult>,
    deferred: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct EntityResult {
    entity: Entity,
}

#[derive(Deserialize)]
struct Entity {
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    string_value: Option<String>,
    array_value: Option<ArrayValue>,
}

#[derive(Deserialize)]
struct ArrayValue {
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

pub struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Where the bearer token attached to datastore requests comes from.
pub enum TokenSource {
    /// No authorization header, used with the emulator.
    None,
    Static(String),
    /// Fetched from the instance metadata server and cached until shortly
    /// before it expires.
    MetadataServer {
        url: String,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl TokenSource {
    pub fn metadata_server(url: impl Into<String>) -> Self {
        TokenSource::MetadataServer {
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    fn from_credentials(credentials: &Credentials) -> Result<Self, StoreError> {
        match credentials {
            Credentials::None => Ok(TokenSource::None),
            Credentials::MetadataServer => Ok(TokenSource::metadata_server(METADATA_TOKEN_URL)),
            Credentials::Token { env } => std::env::var(env)
                .map(TokenSource::Static)
                .map_err(|_| StoreError::MissingEnv(env.clone())),
        }
    }

    async fn token(&self, client: &reqwest::Client) -> Result<Option<String>, StoreError> {
        let (url, cached) = match self {
            TokenSource::None => return Ok(None),
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::MetadataServer { url, cached } => (url, cached),
        };

        // Held across the fetch so concurrent requests wait for a single refresh.
        let mut guard = cached.lock().await;
        if let Some(token) = guard.as_ref()
            && token.refresh_at > Instant::now()
        {
            return Ok(Some(token.value.clone()));
        }

        let response = client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| StoreError::Token(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Token(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| StoreError::Token(e.to_string()))?;

        tracing::debug!(expires_in = token.expires_in, "Refreshed datastore access token");

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(Some(token.access_token))
    }
}

/// Picks the endpoint to talk to. An explicitly configured endpoint wins, then
/// the emulator host, then the public API. The second value tells whether the
/// emulator was selected, in which case no credentials are sent.
fn resolve_endpoint(configured: Option<&url::Url>, emulator_host: Option<String>) -> (String, bool) {
    if let Some(endpoint) = configured {
        return (endpoint.as_str().trim_end_matches('/').to_string(), false);
    }
    match emulator_host.filter(|host| !host.is_empty()) {
        Some(host) => (format!("http://{}", host.trim_end_matches('/')), true),
        None => (DEFAULT_ENDPOINT.to_string(), false),
    }
}

pub struct DatastoreStore {
    client: reqwest::Client,
    lookup_url: String,
    project_id: String,
    namespace: Option<String>,
    database_id: Option<String>,
    token_source: TokenSource,
}

impl DatastoreStore {
    pub fn new(
        endpoint: &str,
        project_id: String,
        namespace: Option<String>,
        database_id: Option<String>,
        token_source: TokenSource,
    ) -> Self {
        let lookup_url = format!(
            "{}/v1/projects/{}:lookup",
            endpoint.trim_end_matches('/'),
            project_id
        );

        DatastoreStore {
            client: reqwest::Client::new(),
            lookup_url,
            project_id,
            namespace,
            database_id,
            token_source,
        }
    }

    pub fn from_config(config: &DatastoreConfig) -> Result<Self, StoreError> {
        let (endpoint, emulator) = resolve_endpoint(
            config.endpoint.as_ref(),
            std::env::var(EMULATOR_HOST_ENV).ok(),
        );

        let token_source = if emulator {
            tracing::info!(%endpoint, "Using the datastore emulator");
            TokenSource::None
        } else {
            TokenSource::from_credentials(&config.credentials)?
        };

        Ok(DatastoreStore::new(
            &endpoint,
            config.project_id.clone(),
            config.namespace.clone(),
            config.database_id.clone(),
            token_source,
        ))
    }

    pub fn lookup_url(&self) -> &str {
        &self.lookup_url
    }

    fn lookup_request<'a>(&'a self, key: &'a LookupKey) -> LookupRequest<'a> {
        LookupRequest {
            database_id: self.database_id.as_deref(),
            keys: vec![Key {
                partition_id: PartitionId {
                    project_id: &self.project_id,
                    database_id: self.database_id.as_deref(),
                    namespace_id: self.namespace.as_deref(),
                },
                path: vec![PathElement {
                    kind: key.kind,
                    name: &key.name,
                }],
            }],
        }
    }
}

/// Extracts the `matches` property, which must be an array of strings.
fn into_product(mut entity: Entity, key: &LookupKey) -> Result<ProductEntity, StoreError> {
    let malformed = |reason: String| StoreError::MalformedEntity {
        path: key.path(),
        reason,
    };

    let property = entity
        .properties
        .remove(MATCHES_PROPERTY)
        .ok_or_else(|| malformed(format!("missing `{MATCHES_PROPERTY}` property")))?;

    let values = property
        .array_value
        .ok_or_else(|| malformed(format!("`{MATCHES_PROPERTY}` is not an array")))?
        .values;

    let matches = values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            value
                .string_value
                .ok_or_else(|| malformed(format!("`{MATCHES_PROPERTY}[{index}]` is not a string")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProductEntity { matches })
}

#[async_trait]
impl ProductStore for DatastoreStore {
    async fn get(&self, key: &LookupKey) -> Result<Option<ProductEntity>, StoreError> {
        let mut request = self.client.post(&self.lookup_url).json(&self.lookup_request(key));
        if let Some(token) = self.token_source.token(&self.client).await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut lookup: LookupResponse = response.json().await?;
        if !lookup.deferred.is_empty() {
            return Err(StoreError::Deferred(key.path()));
        }

        match lookup.found.pop() {
            Some(result) => into_product(result.entity, key).map(Some),
            None => Ok(None),
        }
    }
}
