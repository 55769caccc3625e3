use dbfsync_core::{Batch, Batcher, Endpoint, MappedRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::DeliveryClient;
use crate::error::DeliveryError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub batch_index: usize,
    /// Position of the batch's first record in the dispatched list.
    pub offset: usize,
    pub success_count: usize,
    pub total_count: usize,
    /// Per-record confirmation, in batch order.
    pub items: Vec<bool>,
    /// Whether the batch went through the single-record endpoint.
    pub fallback_used: bool,
}

impl DispatchResult {
    fn new(batch: &Batch<'_>, items: Vec<bool>, fallback_used: bool) -> Self {
        Self {
            batch_index: batch.index,
            offset: batch.offset,
            success_count: items.iter().filter(|ok| **ok).count(),
            total_count: batch.len(),
            items,
            fallback_used,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.success_count == self.total_count
    }
}

/// All batch outcomes of one `send` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub results: Vec<DispatchResult>,
    pub record_count: usize,
    /// Set when cancellation stopped dispatch before every batch was attempted.
    pub cancelled: bool,
}

impl DispatchSummary {
    /// One flag per dispatched record; records never attempted are unconfirmed.
    pub fn confirmations(&self) -> Vec<bool> {
        let mut confirmed = vec![false; self.record_count];
        for result in &self.results {
            for (i, ok) in result.items.iter().enumerate() {
                if let Some(slot) = confirmed.get_mut(result.offset + i) {
                    *slot = *ok;
                }
            }
        }
        confirmed
    }

    pub fn confirmed_count(&self) -> usize {
        self.results.iter().map(|r| r.success_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.record_count - self.confirmed_count()
    }
}

/// Sends mapped records to one endpoint in sequential batches.
pub struct BatchDispatcher<'c, C: DeliveryClient> {
    client: &'c C,
    endpoint: Endpoint,
    policy: RetryPolicy,
}

impl<'c, C: DeliveryClient> BatchDispatcher<'c, C> {
    pub fn new(client: &'c C, endpoint: Endpoint, policy: RetryPolicy) -> Self {
        Self {
            client,
            endpoint,
            policy,
        }
    }

    pub async fn send(
        &self,
        records: &[MappedRecord],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> DispatchSummary {
        let batcher = Batcher::new(batch_size);
        let batches = batcher.partition(records);
        let total_batches = batches.len();

        let mut summary = DispatchSummary {
            record_count: records.len(),
            ..Default::default()
        };

        for batch in &batches {
            if cancel.is_cancelled() {
                warn!(
                    resource = %self.endpoint.resource,
                    remaining = total_batches - batch.index,
                    "Dispatch cancelled, remaining batches not sent"
                );
                summary.cancelled = true;
                break;
            }

            info!(
                resource = %self.endpoint.resource,
                batch = batch.index + 1,
                total_batches,
                records = batch.len(),
                "Sending batch"
            );
            let result = self.send_batch(batch).await;
            if result.is_complete() {
                info!(
                    resource = %self.endpoint.resource,
                    batch = batch.index + 1,
                    total = result.total_count,
                    fallback = result.fallback_used,
                    "Batch delivered"
                );
            } else {
                warn!(
                    resource = %self.endpoint.resource,
                    batch = batch.index + 1,
                    success = result.success_count,
                    total = result.total_count,
                    fallback = result.fallback_used,
                    "Batch partially delivered"
                );
            }
            summary.results.push(result);
        }

        summary
    }

    async fn send_batch(&self, batch: &Batch<'_>) -> DispatchResult {
        let outcome = retry_with_backoff(&self.policy, "batch", || {
            self.client.post_batch(&self.endpoint, batch.records)
        })
        .await;

        match outcome {
            Ok(response) => {
                if let Some(results) = &response.results {
                    for (i, item) in results.iter().enumerate() {
                        if !item.is_success() {
                            warn!(
                                batch = batch.index + 1,
                                item = i,
                                status = %item.status,
                                errors = ?item.errors,
                                "Record rejected by API"
                            );
                        }
                    }
                }
                DispatchResult::new(batch, response.confirmations(batch.len()), false)
            }
            Err(DeliveryError::EndpointNotFound(url)) => {
                info!(url = %url, "Batch endpoint not found, falling back to single-record posts");
                let items = self.send_singles(batch.records).await;
                DispatchResult::new(batch, items, true)
            }
            Err(DeliveryError::Validation { body }) => {
                error!(
                    batch = batch.index + 1,
                    response = %body,
                    payload = %payload_text(batch.records),
                    "Batch rejected by validation"
                );
                DispatchResult::new(batch, vec![false; batch.len()], false)
            }
            Err(e) => {
                error!(
                    batch = batch.index + 1,
                    attempts = self.policy.max_attempts,
                    error = %e,
                    "Batch failed after all retries"
                );
                DispatchResult::new(batch, vec![false; batch.len()], false)
            }
        }
    }

    async fn send_singles(&self, records: &[MappedRecord]) -> Vec<bool> {
        let mut items = Vec::with_capacity(records.len());

        for record in records {
            let outcome = retry_with_backoff(&self.policy, "single", || {
                self.client.post_single(&self.endpoint, record)
            })
            .await;

            let ok = match outcome {
                Ok(outcome) => {
                    debug!(?outcome, "Record delivered");
                    true
                }
                Err(DeliveryError::Validation { body }) => {
                    error!(
                        response = %body,
                        payload = %payload_text(std::slice::from_ref(record)),
                        "Record rejected by validation"
                    );
                    false
                }
                Err(e) => {
                    error!(error = %e, "Record failed after all retries");
                    false
                }
            };
            items.push(ok);
        }

        items
    }
}

fn payload_text(records: &[MappedRecord]) -> String {
    serde_json::to_string(records).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClient, MockReply};
    use serde_json::json;
    use std::time::Duration;

    fn records(n: usize) -> Vec<MappedRecord> {
        (0..n)
            .map(|i| {
                let mut r = MappedRecord::new();
                r.insert("no_opro".into(), json!(i.to_string()));
                r
            })
            .collect()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_and_confirm_all() {
        let client = MockClient::new();
        let dispatcher = BatchDispatcher::new(&client, Endpoint::new("production_orders"), policy());

        let summary = dispatcher.send(&records(130), 50, &CancellationToken::new()).await;

        let sizes: Vec<usize> = client.requests().iter().map(|r| r.records.len()).collect();
        assert_eq!(sizes, vec![50, 50, 30]);
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.confirmed_count(), 130);
        assert!(summary.confirmations().iter().all(|ok| *ok));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_continues_with_next() {
        let client = MockClient::new();
        client.push_batch_replies([
            MockReply::Status(500),
            MockReply::Status(500),
            MockReply::Status(500),
        ]);
        let dispatcher = BatchDispatcher::new(&client, Endpoint::new("production_orders"), policy());

        let summary = dispatcher.send(&records(4), 2, &CancellationToken::new()).await;

        assert_eq!(summary.confirmations(), vec![false, false, true, true]);
        assert_eq!(summary.failed_count(), 2);
        // three attempts for the first batch, one for the second
        assert_eq!(client.total_requests(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_falls_back_to_single_posts() {
        let client = MockClient::new();
        client.push_batch_replies([MockReply::Status(404)]);
        client.push_single_replies([MockReply::AlreadyExists, MockReply::Status(422)]);
        let dispatcher = BatchDispatcher::new(&client, Endpoint::new("inventory_codes"), policy());

        let summary = dispatcher.send(&records(3), 10, &CancellationToken::new()).await;

        let result = &summary.results[0];
        assert!(result.fallback_used);
        assert_eq!(result.items, vec![true, false, true]);
        let paths: Vec<String> = client.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "inventory_codes/batch",
                "inventory_codes",
                "inventory_codes",
                "inventory_codes"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_is_not_retried() {
        let client = MockClient::new();
        client.push_batch_replies([MockReply::Status(422)]);
        let dispatcher = BatchDispatcher::new(&client, Endpoint::new("production_orders"), policy());

        let summary = dispatcher.send(&records(2), 50, &CancellationToken::new()).await;

        assert_eq!(client.total_requests(), 1);
        assert_eq!(summary.confirmed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_item_results() {
        let client = MockClient::new();
        client.push_batch_replies([MockReply::Results(vec![
            "success".into(),
            "error".into(),
            "success".into(),
        ])]);
        let dispatcher = BatchDispatcher::new(&client, Endpoint::new("production_orders"), policy());

        let summary = dispatcher.send(&records(3), 50, &CancellationToken::new()).await;

        assert_eq!(summary.confirmations(), vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_dispatch() {
        let client = MockClient::new();
        let dispatcher = BatchDispatcher::new(&client, Endpoint::new("production_orders"), policy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = dispatcher.send(&records(3), 1, &cancel).await;

        assert!(summary.cancelled);
        assert_eq!(client.total_requests(), 0);
        assert_eq!(summary.confirmations(), vec![false, false, false]);
    }
}
