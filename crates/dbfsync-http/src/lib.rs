mod client;
mod dispatcher;
mod error;
mod mock;
mod retry;

pub use client::{BatchResponse, ClientConfig, DeliveryClient, HttpClient, ItemResult, SingleOutcome};
pub use dispatcher::{BatchDispatcher, DispatchResult, DispatchSummary};
pub use error::{DeliveryError, DeliveryResult};
pub use mock::{MockClient, MockReply, RecordedRequest};
pub use retry::{retry_with_backoff, RetryPolicy};
