use std::future::Future;
use std::time::Duration;

use dbfsync_core::{Endpoint, MappedRecord};
use serde::Deserialize;
use tracing::debug;

use crate::error::{DeliveryError, DeliveryResult};

/// Trait for the remote ingestion API.
pub trait DeliveryClient: Send + Sync {
    /// Post a batch of records to the batch endpoint.
    fn post_batch(
        &self,
        endpoint: &Endpoint,
        records: &[MappedRecord],
    ) -> impl Future<Output = DeliveryResult<BatchResponse>> + Send;

    /// Post one record to the single-item endpoint.
    fn post_single(
        &self,
        endpoint: &Endpoint,
        record: &MappedRecord,
    ) -> impl Future<Output = DeliveryResult<SingleOutcome>> + Send;
}

/// Body of a successful batch response. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub success_count: Option<usize>,
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub results: Option<Vec<ItemResult>>,
}

impl BatchResponse {
    /// Per-record confirmation for a batch of `len` records.
    ///
    /// Without a `results` array the whole batch counts as accepted.
    pub fn confirmations(&self, len: usize) -> Vec<bool> {
        match &self.results {
            Some(results) => (0..len)
                .map(|i| results.get(i).map_or(true, ItemResult::is_success))
                .collect(),
            None => vec![true; len],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemResult {
    pub status: String,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        !self.status.eq_ignore_ascii_case("error")
    }
}

/// Outcome of a single-item post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleOutcome {
    Created,
    AlreadyExists,
}

/// Connection settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Fixed key/value added to every request body.
    pub context: Option<(String, String)>,
}

/// reqwest-backed client for the ingestion API.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    context: Option<(String, String)>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> DeliveryResult<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            context: config.context,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn envelope(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut body = serde_json::Map::new();
        if let Some((key, value)) = &self.context {
            body.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        body
    }

    /// `{ <context>, <list_key>: [...] }`
    pub fn batch_body(&self, endpoint: &Endpoint, records: &[MappedRecord]) -> serde_json::Value {
        let mut body = self.envelope();
        body.insert(
            endpoint.list_key.clone(),
            serde_json::Value::Array(
                records
                    .iter()
                    .cloned()
                    .map(serde_json::Value::Object)
                    .collect(),
            ),
        );
        serde_json::Value::Object(body)
    }

    /// `{ <context>, <item_key>: {...} }`
    pub fn single_body(&self, endpoint: &Endpoint, record: &MappedRecord) -> serde_json::Value {
        let mut body = self.envelope();
        body.insert(
            endpoint.item_key.clone(),
            serde_json::Value::Object(record.clone()),
        );
        serde_json::Value::Object(body)
    }
}

impl DeliveryClient for HttpClient {
    fn post_batch(
        &self,
        endpoint: &Endpoint,
        records: &[MappedRecord],
    ) -> impl Future<Output = DeliveryResult<BatchResponse>> + Send {
        let url = self.url(&endpoint.batch_path());
        let request = self.http.post(&url).json(&self.batch_body(endpoint, records));
        let count = records.len();

        async move {
            debug!(url = %url, count, "Posting batch");
            let response = request.send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;

            if !(200..300).contains(&status) {
                return Err(DeliveryError::from_status(status, &url, text));
            }

            // A 2xx body that is not the expected shape still means the batch landed.
            Ok(serde_json::from_str(&text).unwrap_or_default())
        }
    }

    fn post_single(
        &self,
        endpoint: &Endpoint,
        record: &MappedRecord,
    ) -> impl Future<Output = DeliveryResult<SingleOutcome>> + Send {
        let url = self.url(&endpoint.single_path());
        let request = self.http.post(&url).json(&self.single_body(endpoint, record));

        async move {
            let response = request.send().await?;
            let status = response.status().as_u16();

            match status {
                200..=299 => Ok(SingleOutcome::Created),
                409 => Ok(SingleOutcome::AlreadyExists),
                _ => {
                    let text = response.text().await?;
                    Err(DeliveryError::from_status(status, &url, text))
                }
            }
        }
    }
}
