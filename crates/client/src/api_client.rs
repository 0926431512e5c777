//! HTTP client for the auction REST collaborators.
//!
//! The live core only ever needs two reads: the auction snapshot (at join
//! time and on every resync) and the paginated bid history (to seed the
//! ledger). Everything else — CRUD, uploads, payouts — belongs to other parts
//! of the marketplace and is not represented here.

use mandi_shared::{ApiError, AuctionSnapshot, BidRecord, PagedResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::warn;

/// HTTP client for the auction service's REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Make a GET request and decode the JSON response.
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Fetch the authoritative snapshot for one auction.
    pub async fn fetch_auction_snapshot(&self, auction_id: i64) -> Result<AuctionSnapshot, ApiError> {
        self.get_json(&format!("/api/auctions/{auction_id}")).await
    }

    /// Fetch the full bid history for one auction, walking every page.
    ///
    /// Row order within and across pages is not trusted; the ledger re-sorts
    /// by timestamp when it seeds.
    pub async fn fetch_bid_history(&self, auction_id: i64) -> Result<Vec<BidRecord>, ApiError> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let path = match &cursor {
                Some(c) => format!("/api/auctions/{auction_id}/bids?cursor={c}"),
                None => format!("/api/auctions/{auction_id}/bids"),
            };
            let page: PagedResponse<BidRecord> = self.get_json(&path).await?;
            rows.extend(page.items);

            match page.page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if cursor.as_deref() == Some(next.as_str()) {
                        warn!(auction_id, cursor = %next, "history cursor did not advance; stopping");
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(rows)
    }
}
