//! Remote REST boundary.
//!
//! The remote service returns JSON envelopes of shape
//! `{success, data, pagination?}` and speaks standard verbs per entity
//! (GET list/filtered, POST create, PUT update, DELETE by id). Auth is a
//! bearer token kept in the durable store; a missing token or a 401 surfaces
//! as a distinct [`RemoteError::AuthRequired`] condition so the UI can ask for
//! re-authentication.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use magazzino_core::{EntityType, Record, RecordId};

use crate::config::SyncConfig;
use crate::store::{keys, KeyValueStore};

/// Remote-call error taxonomy.
///
/// The retryable/permanent split drives the queue: transient failures are
/// queued and replayed, permanent rejections are surfaced once and dropped
/// instead of being retried forever.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network-level failure (unreachable, timeout, connection reset).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the API.
    #[error("API error ({0}): {1}")]
    Api(u16, String),

    /// No token available, or the API answered 401.
    #[error("authentication required")]
    AuthRequired,

    /// The envelope or record payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The API answered 2xx but the envelope carried `success: false`.
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether a retry can plausibly succeed later.
    ///
    /// 5xx and timeout-ish statuses are transient; other 4xx responses are
    /// logical rejections that will fail identically on every retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::Api(status, _) => *status >= 500 || *status == 408 || *status == 429,
            RemoteError::AuthRequired => false,
            RemoteError::Parse(_) => false,
            RemoteError::Rejected(_) => false,
        }
    }
}

/// List filters forwarded as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    filters: Vec<(String, String)>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn as_query(&self) -> &[(String, String)] {
        &self.filters
    }
}

/// The remote CRUD surface the sync engine replays against.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list(
        &self,
        entity: EntityType,
        options: &ListOptions,
    ) -> Result<Vec<Record>, RemoteError>;

    /// Returns the confirmed record carrying the remote-issued identifier.
    async fn create(&self, record: &Record) -> Result<Record, RemoteError>;

    async fn update(&self, record: &Record) -> Result<Record, RemoteError>;

    async fn delete(&self, entity: EntityType, id: &RecordId) -> Result<(), RemoteError>;
}

/// JSON envelope returned by every endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    #[allow(dead_code)]
    pagination: Option<Value>,
}

/// `reqwest`-backed remote client.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(config: &SyncConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            token: None,
        })
    }

    pub fn with_token(config: &SyncConfig, token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let mut remote = Self::new(config)?;
        remote.token = Some(token.into());
        Ok(remote)
    }

    /// Build a client whose bearer token is read from the durable store.
    pub async fn from_store(
        config: &SyncConfig,
        store: &dyn KeyValueStore,
    ) -> Result<Self, RemoteError> {
        let mut remote =
            Self::new(config).map_err(|e| RemoteError::Network(e.to_string()))?;
        remote.token = store
            .get(keys::AUTH_TOKEN)
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(remote)
    }

    fn collection_url(&self, entity: EntityType) -> String {
        format!("{}/{}", self.base_url, entity.path_segment())
    }

    fn item_url(&self, entity: EntityType, id: &RecordId) -> String {
        format!("{}/{}/{}", self.base_url, entity.path_segment(), id)
    }

    fn token(&self) -> Result<&str, RemoteError> {
        self.token.as_deref().ok_or(RemoteError::AuthRequired)
    }

    async fn read_envelope(resp: reqwest::Response) -> Result<ApiEnvelope, RemoteError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RemoteError::AuthRequired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Api(status.as_u16(), body));
        }

        let envelope: ApiEnvelope = resp
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        if !envelope.success {
            return Err(RemoteError::Rejected(envelope.data.to_string()));
        }
        Ok(envelope)
    }

    fn parse_record(entity: EntityType, value: Value) -> Result<Record, RemoteError> {
        Record::from_wire(entity, value).map_err(|e| RemoteError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn list(
        &self,
        entity: EntityType,
        options: &ListOptions,
    ) -> Result<Vec<Record>, RemoteError> {
        let token = self.token()?;
        let resp = self
            .client
            .get(self.collection_url(entity))
            .query(options.as_query())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let envelope = Self::read_envelope(resp).await?;
        let items = match envelope.data {
            Value::Array(items) => items,
            other => {
                return Err(RemoteError::Parse(format!(
                    "expected array of {}, got {}",
                    entity, other
                )))
            }
        };

        items
            .into_iter()
            .map(|item| Self::parse_record(entity, item))
            .collect()
    }

    async fn create(&self, record: &Record) -> Result<Record, RemoteError> {
        let token = self.token()?;
        let entity = record.entity_type();
        let resp = self
            .client
            .post(self.collection_url(entity))
            .bearer_auth(token)
            .json(&record.to_wire())
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let envelope = Self::read_envelope(resp).await?;
        Self::parse_record(entity, envelope.data)
    }

    async fn update(&self, record: &Record) -> Result<Record, RemoteError> {
        let token = self.token()?;
        let entity = record.entity_type();
        let resp = self
            .client
            .put(self.item_url(entity, record.id()))
            .bearer_auth(token)
            .json(&record.to_wire())
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let envelope = Self::read_envelope(resp).await?;
        Self::parse_record(entity, envelope.data)
    }

    async fn delete(&self, entity: EntityType, id: &RecordId) -> Result<(), RemoteError> {
        let token = self.token()?;
        let resp = self
            .client
            .delete(self.item_url(entity, id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        // Some delete endpoints answer an empty body; only the status and the
        // envelope's success flag (when present) matter.
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RemoteError::AuthRequired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Api(status.as_u16(), body));
        }
        if let Ok(envelope) = resp.json::<ApiEnvelope>().await {
            if !envelope.success {
                return Err(RemoteError::Rejected(envelope.data.to_string()));
            }
        }
        Ok(())
    }
}
