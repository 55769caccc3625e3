//! Record-level change detection.
//!
//! Two strategies are supported and never mixed for one feed:
//!
//! * **Content hash.** Every record is canonicalized (dates as ISO-8601,
//!   fields sorted by name, compact JSON of `[name, value]` pairs) and hashed
//!   with SHA-256. A record is changed iff its digest is absent from the
//!   snapshot stored by the previous run. The next snapshot replaces the old
//!   one entirely. Records with identical content are indistinguishable from
//!   one unchanged record, and a record reverting to an older digest counts as
//!   changed only if that digest is missing from the latest snapshot.
//! * **Monotonic sequence.** A designated integer field is compared against a
//!   high-water mark. Changed records are delivered in ascending order and the
//!   mark only moves up to the last confirmed sequence below the first failure.

use std::collections::{BTreeSet, HashSet};

use sha2::{Digest, Sha256};

use crate::error::RecordMappingError;
use crate::types::{Fingerprint, RawRecord, Value};

/// Which change-detection strategy a feed uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffStrategy {
    ContentHash,
    Sequence { field: String },
}

/// Persisted per-file diff state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffState {
    /// Digests observed in the most recent run.
    Digests(BTreeSet<String>),
    /// Highest confirmed sequence value.
    HighWater(i64),
}

impl DiffState {
    /// Empty state for a strategy: no digests, or a mark of 0.
    pub fn initial(strategy: &DiffStrategy) -> Self {
        match strategy {
            DiffStrategy::ContentHash => DiffState::Digests(BTreeSet::new()),
            DiffStrategy::Sequence { .. } => DiffState::HighWater(0),
        }
    }

    fn matches(&self, strategy: &DiffStrategy) -> bool {
        matches!(
            (self, strategy),
            (DiffState::Digests(_), DiffStrategy::ContentHash)
                | (DiffState::HighWater(_), DiffStrategy::Sequence { .. })
        )
    }
}

/// Classification of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Changed(Fingerprint),
    Unchanged,
}

/// What happened to a changed record after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote side confirmed the record.
    Delivered,
    /// The record can never be delivered (e.g. no identifier); do not retry it.
    Skipped,
    /// Delivery failed or was not attempted; retry next tick.
    Failed,
}

/// Decides which records changed since the last run and computes the state
/// to commit once dispatch outcomes are known.
pub struct RecordDiffEngine {
    strategy: DiffStrategy,
    previous: DiffState,
    retained: BTreeSet<String>,
    seen: HashSet<String>,
}

impl RecordDiffEngine {
    /// Create an engine. Stored state of the other strategy is discarded.
    pub fn new(strategy: DiffStrategy, previous: DiffState) -> Self {
        let previous = if previous.matches(&strategy) {
            previous
        } else {
            DiffState::initial(&strategy)
        };

        Self {
            strategy,
            previous,
            retained: BTreeSet::new(),
            seen: HashSet::new(),
        }
    }

    /// Classify a record against the stored state.
    pub fn classify(&mut self, record: &RawRecord) -> Result<Verdict, RecordMappingError> {
        match &self.strategy {
            DiffStrategy::ContentHash => {
                let digest = content_digest(record);
                if !self.seen.insert(digest.clone()) {
                    return Ok(Verdict::Unchanged);
                }

                let known = match &self.previous {
                    DiffState::Digests(set) => set.contains(&digest),
                    DiffState::HighWater(_) => false,
                };

                if known {
                    self.retained.insert(digest);
                    Ok(Verdict::Unchanged)
                } else {
                    Ok(Verdict::Changed(Fingerprint::Digest(digest)))
                }
            }
            DiffStrategy::Sequence { field } => {
                let seq = sequence_value(record, field)?;
                let mark = match &self.previous {
                    DiffState::HighWater(h) => *h,
                    DiffState::Digests(_) => 0,
                };

                if seq > mark {
                    Ok(Verdict::Changed(Fingerprint::Sequence(seq)))
                } else {
                    Ok(Verdict::Unchanged)
                }
            }
        }
    }

    /// Put changed records into delivery order. Sequence feeds are sorted
    /// ascending (stable for equal values); content-hash feeds keep file order.
    pub fn order_for_delivery<T>(&self, changed: &mut [(Fingerprint, T)]) {
        if matches!(self.strategy, DiffStrategy::Sequence { .. }) {
            changed.sort_by(|a, b| a.0.cmp(&b.0));
        }
    }

    /// Compute the state to persist. `outcomes` must be in delivery order.
    ///
    /// Only delivered or skipped fingerprints are committed. For sequences the
    /// mark stays strictly below the first failed sequence, so records sharing
    /// that value are classified as changed again next run.
    pub fn finish<I>(self, outcomes: I) -> DiffState
    where
        I: IntoIterator<Item = (Fingerprint, Resolution)>,
    {
        match self.previous {
            DiffState::Digests(_) => {
                let mut next = self.retained;
                for (fingerprint, resolution) in outcomes {
                    if let (Fingerprint::Digest(d), Resolution::Delivered | Resolution::Skipped) =
                        (fingerprint, resolution)
                    {
                        next.insert(d);
                    }
                }
                DiffState::Digests(next)
            }
            DiffState::HighWater(mark) => {
                let mut next = mark;
                for (fingerprint, resolution) in outcomes {
                    let Fingerprint::Sequence(seq) = fingerprint else {
                        continue;
                    };
                    if resolution == Resolution::Failed {
                        next = next.min(seq.saturating_sub(1)).max(mark);
                        break;
                    }
                    next = next.max(seq);
                }
                DiffState::HighWater(next)
            }
        }
    }
}

/// Hex SHA-256 of the canonical form of a record.
pub fn content_digest(record: &RawRecord) -> String {
    let mut pairs: Vec<(&str, serde_json::Value)> = record
        .iter()
        .map(|(name, value)| (name, value.to_canonical_json()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let canonical = serde_json::Value::Array(
        pairs
            .into_iter()
            .map(|(name, value)| serde_json::Value::Array(vec![name.into(), value]))
            .collect(),
    )
    .to_string();

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn sequence_value(record: &RawRecord, field: &str) -> Result<i64, RecordMappingError> {
    let invalid = |value: String| RecordMappingError::InvalidSequence {
        field: field.to_string(),
        value,
    };

    match record.get(field) {
        Some(Value::Int(i)) => Ok(*i),
        Some(Value::Float(f)) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i64),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .ok_or_else(|| invalid(s.clone()))
        }
        Some(other) => Err(invalid(other.to_text())),
        None => Err(invalid(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn seq_record(seq: i64) -> RawRecord {
        [("NO_OPRO", Value::Int(seq)), ("OBSERVA", Value::from("x"))]
            .into_iter()
            .collect()
    }

    fn sequence() -> DiffStrategy {
        DiffStrategy::Sequence {
            field: "NO_OPRO".into(),
        }
    }

    #[test]
    fn test_digest_ignores_field_order() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let a: RawRecord = [
            ("NO_OPRO", Value::Int(1)),
            ("FEC_OPRO", Value::Date(date)),
            ("OBSERVA", Value::from("nota")),
        ]
        .into_iter()
        .collect();
        let b: RawRecord = [
            ("OBSERVA", Value::from("nota")),
            ("NO_OPRO", Value::Int(1)),
            ("FEC_OPRO", Value::Date(date)),
        ]
        .into_iter()
        .collect();

        assert_eq!(content_digest(&a), content_digest(&b));
        assert_eq!(content_digest(&a).len(), 64);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a: RawRecord = [("NO_OPRO", Value::Int(1))].into_iter().collect();
        let b: RawRecord = [("NO_OPRO", Value::Int(2))].into_iter().collect();
        assert_ne!(content_digest(&a), content_digest(&b));
    }

    #[test]
    fn test_content_hash_classification() {
        let known: RawRecord = [("K", Value::Int(1))].into_iter().collect();
        let fresh: RawRecord = [("K", Value::Int(2))].into_iter().collect();

        let previous = DiffState::Digests([content_digest(&known)].into_iter().collect());
        let mut engine = RecordDiffEngine::new(DiffStrategy::ContentHash, previous);

        assert_eq!(engine.classify(&known).unwrap(), Verdict::Unchanged);
        match engine.classify(&fresh).unwrap() {
            Verdict::Changed(Fingerprint::Digest(d)) => assert_eq!(d, content_digest(&fresh)),
            other => panic!("expected changed digest, got {:?}", other),
        }
        // A duplicate within the same pass is not delivered twice.
        assert_eq!(engine.classify(&fresh).unwrap(), Verdict::Unchanged);
    }

    #[test]
    fn test_content_hash_snapshot_replaces_previous() {
        let stale = "0".repeat(64);
        let kept: RawRecord = [("K", Value::Int(1))].into_iter().collect();
        let sent: RawRecord = [("K", Value::Int(2))].into_iter().collect();
        let failed: RawRecord = [("K", Value::Int(3))].into_iter().collect();

        let previous =
            DiffState::Digests([stale.clone(), content_digest(&kept)].into_iter().collect());
        let mut engine = RecordDiffEngine::new(DiffStrategy::ContentHash, previous);

        engine.classify(&kept).unwrap();
        let mut outcomes = Vec::new();
        for (record, resolution) in [(&sent, Resolution::Delivered), (&failed, Resolution::Failed)] {
            if let Verdict::Changed(fp) = engine.classify(record).unwrap() {
                outcomes.push((fp, resolution));
            }
        }

        let DiffState::Digests(next) = engine.finish(outcomes) else {
            panic!("expected digests");
        };
        assert!(next.contains(&content_digest(&kept)));
        assert!(next.contains(&content_digest(&sent)));
        assert!(!next.contains(&content_digest(&failed)));
        assert!(!next.contains(&stale));
    }

    #[test]
    fn test_sequence_non_regression() {
        let mut engine = RecordDiffEngine::new(sequence(), DiffState::HighWater(4));

        let mut changed = Vec::new();
        for seq in [5, 7, 3] {
            if let Verdict::Changed(fp) = engine.classify(&seq_record(seq)).unwrap() {
                changed.push((fp, seq));
            }
        }
        engine.order_for_delivery(&mut changed);

        let delivered: Vec<i64> = changed.iter().map(|(_, seq)| *seq).collect();
        assert_eq!(delivered, vec![5, 7]);

        let next = engine.finish(
            changed
                .into_iter()
                .map(|(fp, _)| (fp, Resolution::Delivered)),
        );
        assert_eq!(next, DiffState::HighWater(7));
    }

    #[test]
    fn test_sequence_mark_stops_at_first_failure() {
        let engine = RecordDiffEngine::new(sequence(), DiffState::HighWater(10));
        let next = engine.finish(vec![
            (Fingerprint::Sequence(11), Resolution::Delivered),
            (Fingerprint::Sequence(12), Resolution::Skipped),
            (Fingerprint::Sequence(13), Resolution::Failed),
            (Fingerprint::Sequence(14), Resolution::Delivered),
        ]);
        assert_eq!(next, DiffState::HighWater(12));
    }

    #[test]
    fn test_sequence_mark_stays_below_failed_duplicate() {
        let mut engine = RecordDiffEngine::new(sequence(), DiffState::HighWater(4));
        let next = engine.finish(vec![
            (Fingerprint::Sequence(5), Resolution::Delivered),
            (Fingerprint::Sequence(5), Resolution::Failed),
        ]);
        assert_eq!(next, DiffState::HighWater(4));

        engine = RecordDiffEngine::new(sequence(), next);
        assert_eq!(
            engine.classify(&seq_record(5)).unwrap(),
            Verdict::Changed(Fingerprint::Sequence(5))
        );
    }

    #[test]
    fn test_sequence_mark_never_decreases() {
        let engine = RecordDiffEngine::new(sequence(), DiffState::HighWater(10));
        let next = engine.finish(vec![(Fingerprint::Sequence(3), Resolution::Delivered)]);
        assert_eq!(next, DiffState::HighWater(10));
    }

    #[test]
    fn test_sequence_rejects_non_numeric() {
        let mut engine = RecordDiffEngine::new(sequence(), DiffState::HighWater(0));

        let record: RawRecord = [("NO_OPRO", Value::from("A-12"))].into_iter().collect();
        assert!(matches!(
            engine.classify(&record),
            Err(RecordMappingError::InvalidSequence { .. })
        ));

        let record: RawRecord = [("OTHER", Value::Int(1))].into_iter().collect();
        assert!(engine.classify(&record).is_err());

        let record: RawRecord = [("NO_OPRO", Value::from(" 42 "))].into_iter().collect();
        assert_eq!(
            engine.classify(&record).unwrap(),
            Verdict::Changed(Fingerprint::Sequence(42))
        );

        let record: RawRecord = [("NO_OPRO", Value::Float(43.0))].into_iter().collect();
        assert_eq!(
            engine.classify(&record).unwrap(),
            Verdict::Changed(Fingerprint::Sequence(43))
        );
    }

    #[test]
    fn test_mismatched_state_is_reset() {
        let mut engine = RecordDiffEngine::new(
            sequence(),
            DiffState::Digests(["abc".to_string()].into_iter().collect()),
        );
        assert_eq!(
            engine.classify(&seq_record(1)).unwrap(),
            Verdict::Changed(Fingerprint::Sequence(1))
        );
        assert_eq!(engine.finish(Vec::new()), DiffState::HighWater(0));
    }
}
