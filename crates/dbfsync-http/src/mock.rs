use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use dbfsync_core::{Endpoint, MappedRecord};
use tokio_util::sync::CancellationToken;

use crate::client::{BatchResponse, DeliveryClient, ItemResult, SingleOutcome};
use crate::error::{DeliveryError, DeliveryResult};

/// Scripted reply for one request to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// 2xx with no `results` array.
    Accept,
    /// 2xx with one `results` entry per status.
    Results(Vec<String>),
    /// 409 from the single endpoint.
    AlreadyExists,
    /// Any non-2xx status.
    Status(u16),
    /// Transport failure.
    Network,
}

/// A request the mock has seen.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub records: Vec<MappedRecord>,
}

/// A mock delivery client for testing.
///
/// Replies are taken from per-endpoint queues; an empty queue accepts.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    batch_replies: VecDeque<MockReply>,
    single_replies: VecDeque<MockReply>,
    requests: Vec<RecordedRequest>,
    /// If set, every request fails with a network error.
    fail_with: Option<String>,
    batch_calls: usize,
    /// Cancel the token once this many batch requests have been answered.
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock client that simulates failures.
    pub fn failing(error_message: impl Into<String>) -> Self {
        let client = Self::new();
        client.lock().fail_with = Some(error_message.into());
        client
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue replies for the batch endpoint.
    pub fn push_batch_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        self.lock().batch_replies.extend(replies);
    }

    /// Queue replies for the single-record endpoint.
    pub fn push_single_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        self.lock().single_replies.extend(replies);
    }

    /// Cancel `token` right after the `batches`-th batch request is answered.
    pub fn cancel_after_batches(&self, batches: usize, token: CancellationToken) {
        self.lock().cancel_after = Some((batches, token));
    }

    /// Stop failing and accept everything from now on.
    pub fn recover(&self) {
        self.lock().fail_with = None;
    }

    /// All requests in the order they were made.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Total number of requests made.
    pub fn total_requests(&self) -> usize {
        self.lock().requests.len()
    }

    /// Total number of records across all requests.
    pub fn total_records(&self) -> usize {
        self.lock().requests.iter().map(|r| r.records.len()).sum()
    }

    /// Clear all recorded requests.
    pub fn clear(&self) {
        self.lock().requests.clear();
    }

    fn status_error(status: u16, path: &str) -> DeliveryError {
        DeliveryError::from_status(status, path, format!("mock status {}", status))
    }
}

impl DeliveryClient for MockClient {
    fn post_batch(
        &self,
        endpoint: &Endpoint,
        records: &[MappedRecord],
    ) -> impl Future<Output = DeliveryResult<BatchResponse>> + Send {
        let state = self.state.clone();
        let path = endpoint.batch_path();
        let records = records.to_vec();

        async move {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.requests.push(RecordedRequest {
                path: path.clone(),
                records,
            });
            state.batch_calls += 1;
            if let Some((after, token)) = &state.cancel_after {
                if state.batch_calls >= *after {
                    token.cancel();
                }
            }

            if let Some(ref error) = state.fail_with {
                return Err(DeliveryError::Network(error.clone()));
            }

            match state.batch_replies.pop_front().unwrap_or(MockReply::Accept) {
                MockReply::Accept | MockReply::AlreadyExists => Ok(BatchResponse::default()),
                MockReply::Results(statuses) => Ok(BatchResponse {
                    success_count: Some(statuses.iter().filter(|s| *s != "error").count()),
                    total_count: Some(statuses.len()),
                    results: Some(
                        statuses
                            .into_iter()
                            .map(|status| ItemResult {
                                status,
                                errors: None,
                            })
                            .collect(),
                    ),
                }),
                MockReply::Status(status) => Err(Self::status_error(status, &path)),
                MockReply::Network => Err(DeliveryError::Network("mock network error".into())),
            }
        }
    }

    fn post_single(
        &self,
        endpoint: &Endpoint,
        record: &MappedRecord,
    ) -> impl Future<Output = DeliveryResult<SingleOutcome>> + Send {
        let state = self.state.clone();
        let path = endpoint.single_path();
        let record = record.clone();

        async move {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.requests.push(RecordedRequest {
                path: path.clone(),
                records: vec![record],
            });

            if let Some(ref error) = state.fail_with {
                return Err(DeliveryError::Network(error.clone()));
            }

            match state.single_replies.pop_front().unwrap_or(MockReply::Accept) {
                MockReply::Accept | MockReply::Results(_) => Ok(SingleOutcome::Created),
                MockReply::AlreadyExists => Ok(SingleOutcome::AlreadyExists),
                MockReply::Status(status) => Err(Self::status_error(status, &path)),
                MockReply::Network => Err(DeliveryError::Network("mock network error".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(n: usize) -> Vec<MappedRecord> {
        (0..n)
            .map(|i| {
                let mut r = MappedRecord::new();
                r.insert("no_opro".into(), json!(i.to_string()));
                r
            })
            .collect()
    }

    #[tokio::test]
    async fn test_mock_client_records_requests() {
        let client = MockClient::new();
        let endpoint = Endpoint::new("production_orders");

        client.post_batch(&endpoint, &records(3)).await.unwrap();
        client.post_single(&endpoint, &records(1)[0]).await.unwrap();

        assert_eq!(client.total_requests(), 2);
        assert_eq!(client.total_records(), 4);
        let requests = client.requests();
        assert_eq!(requests[0].path, "production_orders/batch");
        assert_eq!(requests[1].path, "production_orders");
    }

    #[tokio::test]
    async fn test_mock_client_scripted_replies() {
        let client = MockClient::new();
        let endpoint = Endpoint::new("production_orders");
        client.push_batch_replies([MockReply::Status(404), MockReply::Status(503)]);
        client.push_single_replies([MockReply::AlreadyExists]);

        let first = client.post_batch(&endpoint, &records(1)).await;
        assert!(matches!(first, Err(DeliveryError::EndpointNotFound(_))));

        let second = client.post_batch(&endpoint, &records(1)).await;
        assert!(matches!(second, Err(DeliveryError::Status { status: 503, .. })));

        assert!(client.post_batch(&endpoint, &records(1)).await.is_ok());
        assert_eq!(
            client.post_single(&endpoint, &records(1)[0]).await.unwrap(),
            SingleOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_mock_client_failing() {
        let client = MockClient::failing("simulated failure");
        let endpoint = Endpoint::new("production_orders");

        assert!(client.post_batch(&endpoint, &records(1)).await.is_err());
        client.recover();
        assert!(client.post_batch(&endpoint, &records(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_client_cancels_after_batches() {
        let client = MockClient::new();
        let endpoint = Endpoint::new("production_orders");
        let token = CancellationToken::new();
        client.cancel_after_batches(2, token.clone());

        client.post_batch(&endpoint, &records(1)).await.unwrap();
        assert!(!token.is_cancelled());
        client.post_batch(&endpoint, &records(1)).await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_mock_client_clear() {
        let client = MockClient::new();
        let endpoint = Endpoint::new("production_orders");

        client.post_batch(&endpoint, &records(5)).await.unwrap();
        assert_eq!(client.total_requests(), 1);

        client.clear();
        assert_eq!(client.total_requests(), 0);
    }
}
