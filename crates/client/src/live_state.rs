//! Synchronized live view of one auction's price state.
//!
//! The server is authoritative: broadcast events overwrite the local fields
//! unconditionally, with no client-side `max()` guard. Monotonicity of the
//! price is the server's contract while the auction is open; the one legal
//! "decrease" is [`resync`](AuctionLiveState::resync), which replaces the
//! whole cached view with a fresh authoritative snapshot after a reconnect.

use mandi_shared::{AuctionSnapshot, AuctionStatus};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionLiveState {
    auction_id: i64,
    current_price: Decimal,
    min_increment: Decimal,
    status: AuctionStatus,
}

impl AuctionLiveState {
    /// Empty state for an auction whose snapshot has not arrived yet.
    pub fn new(auction_id: i64) -> Self {
        Self {
            auction_id,
            current_price: Decimal::ZERO,
            min_increment: Decimal::ZERO,
            status: AuctionStatus::Scheduled,
        }
    }

    /// Set the initial state from the snapshot fetched at join time.
    pub fn initialize(&mut self, snapshot: &AuctionSnapshot) {
        self.current_price = snapshot.current_price;
        self.min_increment = snapshot.min_increment;
        self.status = snapshot.status;
    }

    /// Apply a `bidPlaced` broadcast. Events for other auctions are ignored
    /// (cross-room leakage); returns whether the event applied.
    pub fn apply_bid_placed(
        &mut self,
        auction_id: i64,
        current_price: Decimal,
        min_increment: Decimal,
    ) -> bool {
        if auction_id != self.auction_id {
            return false;
        }
        self.current_price = current_price;
        self.min_increment = min_increment;
        true
    }

    /// Apply a partial `priceTick`; only the fields present are updated.
    pub fn apply_price_tick(
        &mut self,
        current_price: Option<Decimal>,
        min_increment: Option<Decimal>,
        status: Option<AuctionStatus>,
    ) {
        if let Some(price) = current_price {
            self.current_price = price;
        }
        if let Some(increment) = min_increment {
            self.min_increment = increment;
        }
        if let Some(status) = status {
            self.status = status;
        }
    }

    /// Replace the cached view with a fresh authoritative snapshot. Used
    /// after reconnection, when the in-memory state may have missed events;
    /// unlike broadcasts this may move the price in any direction.
    pub fn resync(&mut self, snapshot: &AuctionSnapshot) {
        self.current_price = snapshot.current_price;
        self.min_increment = snapshot.min_increment;
        self.status = snapshot.status;
    }

    pub fn auction_id(&self) -> i64 {
        self.auction_id
    }

    pub fn current_price(&self) -> Decimal {
        self.current_price
    }

    pub fn min_increment(&self) -> Decimal {
        self.min_increment
    }

    pub fn status(&self) -> AuctionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}
