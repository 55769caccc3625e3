use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use dbfsync_core::{
    DiffState, Feed, FieldMapper, Fingerprint, MappedRecord, RecordDiffEngine, Resolution,
    Transformer, Verdict,
};
use dbfsync_http::{BatchDispatcher, DeliveryClient, RetryPolicy};
use dbfsync_source::{FileChangeDetector, RecordSource};
use dbfsync_state::{StateStore, SyncState};
use tokio_util::sync::CancellationToken;

/// Log scan progress every this many records.
const PROGRESS_EVERY: usize = 100;

/// Outcome of one feed within a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub feed: String,
    /// The file gate found no modification and the scan was skipped.
    pub unchanged: bool,
    /// The file could not be stat'ed or read.
    pub error: Option<String>,
    pub scanned: usize,
    pub changed: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl FeedReport {
    fn new(feed: &Feed) -> Self {
        Self {
            feed: feed.name.clone(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed == 0
    }
}

/// Outcome of one pass over every feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub feeds: Vec<FeedReport>,
    pub state_saved: bool,
    pub cancelled: bool,
}

impl TickReport {
    pub fn is_success(&self) -> bool {
        self.state_saved && self.feeds.iter().all(FeedReport::is_success)
    }

    pub fn delivered(&self) -> usize {
        self.feeds.iter().map(|f| f.delivered).sum()
    }

    pub fn failed(&self) -> usize {
        self.feeds.iter().map(|f| f.failed).sum()
    }
}

/// Drives detect, diff, map, dispatch and commit for a set of feeds.
pub struct SyncRunner<'a, C, S, St>
where
    C: DeliveryClient,
    S: RecordSource,
    St: StateStore,
{
    client: &'a C,
    source: &'a S,
    store: &'a St,
    detector: FileChangeDetector,
    policy: RetryPolicy,
    batch_size: usize,
    force: bool,
}

impl<'a, C, S, St> SyncRunner<'a, C, S, St>
where
    C: DeliveryClient,
    S: RecordSource,
    St: StateStore,
{
    pub fn new(client: &'a C, source: &'a S, store: &'a St, policy: RetryPolicy) -> Self {
        Self {
            client,
            source,
            store,
            detector: FileChangeDetector::new(),
            policy,
            batch_size: 50,
            force: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Scan files even when their metadata is unchanged.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// One pass over every feed. State is saved after each feed.
    pub async fn run_tick(&self, feeds: &[Feed], cancel: &CancellationToken) -> TickReport {
        let mut state = self.store.load();
        let mut report = TickReport {
            state_saved: true,
            ..Default::default()
        };

        for feed in feeds {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let feed_report = self.sync_feed(feed, &mut state, cancel).await;

            if let Err(e) = self.store.save(&state) {
                error!(feed = %feed.name, error = %e, "Failed to save state, continuing with in-memory state");
                report.state_saved = false;
            }

            info!(
                feed = %feed_report.feed,
                unchanged = feed_report.unchanged,
                scanned = feed_report.scanned,
                changed = feed_report.changed,
                delivered = feed_report.delivered,
                failed = feed_report.failed,
                "Feed processed"
            );
            report.feeds.push(feed_report);
        }

        report.cancelled |= cancel.is_cancelled();
        report
    }

    async fn sync_feed(
        &self,
        feed: &Feed,
        state: &mut SyncState,
        cancel: &CancellationToken,
    ) -> FeedReport {
        let mut report = FeedReport::new(feed);
        let key = feed.state_key();
        let stored = state.file(&key).cloned().unwrap_or_default();

        let check = match self.detector.check(&feed.source, stored.meta().as_ref()) {
            Ok(check) => check,
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "Skipping feed this tick");
                report.error = Some(e.to_string());
                return report;
            }
        };

        if !check.changed && !self.force {
            debug!(feed = %feed.name, path = %key, "File unchanged");
            report.unchanged = true;
            return report;
        }

        let records = match self.source.open(&feed.source) {
            Ok(records) => records,
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "Skipping feed this tick");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.scanned = records.len();
        info!(feed = %feed.name, records = records.len(), "Scanning records");

        let mut engine = RecordDiffEngine::new(feed.diff.clone(), stored.diff_state(&feed.diff));
        let mut changed = Vec::new();
        for (i, record) in records.iter().enumerate() {
            match engine.classify(record) {
                Ok(Verdict::Changed(fingerprint)) => changed.push((fingerprint, record)),
                Ok(Verdict::Unchanged) => {}
                Err(e) => {
                    warn!(feed = %feed.name, row = i, error = %e, "Record rejected");
                    report.rejected += 1;
                }
            }
            if (i + 1) % PROGRESS_EVERY == 0 {
                info!(feed = %feed.name, scanned = i + 1, total = records.len(), changed = changed.len(), "Scan progress");
            }
        }
        engine.order_for_delivery(&mut changed);
        report.changed = changed.len();

        let mapper = FieldMapper::new(feed.profile.clone());

        // Resolution per changed record, in delivery order.
        let mut resolutions: Vec<Resolution> = vec![Resolution::Failed; changed.len()];
        let mut payloads: Vec<MappedRecord> = Vec::new();
        let mut payload_slots: Vec<usize> = Vec::new();
        for (slot, (_, record)) in changed.iter().enumerate() {
            match mapper.map(record) {
                Ok(payload) => {
                    payloads.push(payload);
                    payload_slots.push(slot);
                }
                Err(e) => {
                    warn!(feed = %feed.name, error = %e, "Skipping record");
                    resolutions[slot] = Resolution::Skipped;
                    report.skipped += 1;
                }
            }
        }

        if !payloads.is_empty() {
            let dispatcher = BatchDispatcher::new(self.client, feed.endpoint.clone(), self.policy);
            let summary = dispatcher.send(&payloads, self.batch_size, cancel).await;

            for (slot, confirmed) in payload_slots.iter().zip(summary.confirmations()) {
                if confirmed {
                    resolutions[*slot] = Resolution::Delivered;
                    report.delivered += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        let outcomes: Vec<(Fingerprint, Resolution)> = changed
            .into_iter()
            .zip(resolutions)
            .map(|((fingerprint, _), resolution)| (fingerprint, resolution))
            .collect();
        let next = engine.finish(outcomes);

        let file = state.file_mut(&key);
        log_commit(feed, &next);
        file.set_diff_state(next);
        file.records_delivered += report.delivered as u64;
        file.updated_at = Some(Utc::now());
        if report.failed == 0 {
            file.set_meta(check.current);
        } else {
            warn!(
                feed = %feed.name,
                failed = report.failed,
                "Undelivered records remain, file will be rescanned next tick"
            );
        }

        report
    }
}

fn log_commit(feed: &Feed, next: &DiffState) {
    match next {
        DiffState::Digests(set) => debug!(feed = %feed.name, digests = set.len(), "Committing snapshot"),
        DiffState::HighWater(mark) => debug!(feed = %feed.name, high_water = mark, "Committing high-water mark"),
    }
}

/// Run ticks until cancelled, sleeping `interval` between them.
///
/// With `once` set, returns after the first tick.
pub async fn run_sync_loop<C, S, St>(
    runner: &SyncRunner<'_, C, S, St>,
    feeds: &[Feed],
    interval: Duration,
    once: bool,
    cancel: &CancellationToken,
) -> TickReport
where
    C: DeliveryClient,
    S: RecordSource,
    St: StateStore,
{
    let mut tick = 0u64;
    loop {
        tick += 1;
        info!(tick, feeds = feeds.len(), "Starting tick");
        let report = runner.run_tick(feeds, cancel).await;
        info!(
            tick,
            delivered = report.delivered(),
            failed = report.failed(),
            "Tick complete"
        );

        if once || report.cancelled || cancel.is_cancelled() {
            return report;
        }

        info!(interval_secs = interval.as_secs(), "Waiting for next tick");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                info!("Interrupted, stopping");
                return report;
            }
        }
    }
}
