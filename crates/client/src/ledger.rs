//! Bid history ledger for one auction.
//!
//! Merges the paginated REST history (fetched once when the view opens) with
//! live `bidPlaced` broadcasts into a single deduplicated, time-ordered list.
//! Neither source guarantees a durable bid id, so identity is derived:
//! `(bidder, price, observed-at floored to the second)` recognizes the same
//! logical bid arriving through both paths.

use chrono::{DateTime, Utc};
use mandi_shared::BidRecord;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// One observed bid, unified across the REST and broadcast shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidEntry {
    /// The new total price after this bid (not a delta).
    pub price: Decimal,
    pub bidder_user_id: i64,
    /// Server timestamp when available, client-assigned otherwise.
    pub observed_at: DateTime<Utc>,
}

impl BidEntry {
    pub fn from_record(record: &BidRecord) -> Self {
        Self {
            price: record.bid_amount,
            bidder_user_id: record.bidder_user_id,
            observed_at: record.created_at,
        }
    }

    fn dedup_key(&self) -> (i64, Decimal, i64) {
        (self.bidder_user_id, self.price, self.observed_at.timestamp())
    }
}

/// Append-as-received, deduplicated, time-ordered log of observed bids.
///
/// Internal storage is always ascending by `observed_at`; the newest-first
/// display order is derived, never stored.
#[derive(Debug, Clone, Default)]
pub struct BidHistoryLedger {
    entries: Vec<BidEntry>,
    seeded: bool,
}

impl BidHistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish the baseline from the REST history fetch. Source order is
    /// not trusted: entries are re-sorted by timestamp and deduplicated.
    pub fn seed(&mut self, mut entries: Vec<BidEntry>) {
        entries.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));
        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert(entry.dedup_key()));
        self.entries = entries;
        self.seeded = true;
    }

    /// Record a live bid, maintaining sort order by `observed_at`.
    /// An entry with an already-known dedup key replaces the existing one;
    /// returns whether the entry was new.
    pub fn observe(&mut self, entry: BidEntry) -> bool {
        let key = entry.dedup_key();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.dedup_key() == key) {
            *existing = entry;
            return false;
        }

        let pos = self
            .entries
            .binary_search_by(|e| e.observed_at.cmp(&entry.observed_at))
            .unwrap_or_else(|pos| pos);
        self.entries.insert(pos, entry);
        true
    }

    /// All observed bids, ascending by `observed_at`.
    pub fn entries(&self) -> &[BidEntry] {
        &self.entries
    }

    /// Display order for bid feeds.
    pub fn newest_first(&self) -> impl Iterator<Item = &BidEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }
}
