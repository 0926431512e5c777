//! Data models shared between the live-auction client and its REST collaborators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an auction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuctionStatus {
    Scheduled,
    Open,
    Closed,
}

impl AuctionStatus {
    pub fn is_open(self) -> bool {
        matches!(self, AuctionStatus::Open)
    }
}

/// Authoritative auction snapshot served by the REST collaborator.
///
/// Fetched once when a join view opens and again on every resync; the live
/// price fields are superseded by broadcast events between fetches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSnapshot {
    pub auction_id: i64,
    pub current_price: Decimal,
    pub min_increment: Decimal,
    pub status: AuctionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// One historical bid row from the REST history endpoint.
///
/// The REST and broadcast sources disagree on field names for the same
/// logical bid, so the aliases accept both spellings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    #[serde(alias = "price")]
    pub bid_amount: Decimal,
    #[serde(alias = "userId")]
    pub bidder_user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub page: PageInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}
