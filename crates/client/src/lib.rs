//! Live-auction bidding core for the mandi agricultural marketplace.
//!
//! This crate is the real-time half of the auction experience: it joins an
//! auction's broadcast room over a persistent WebSocket, keeps a synchronized
//! view of `{current price, minimum increment, status}`, merges REST bid
//! history with live broadcasts into one deduplicated ledger, and validates
//! and submits bids against the moving price floor. Screens, authentication,
//! and CRUD live elsewhere and talk to this core through its typed API.
//!
//! # Quick tour
//!
//! ```rust,ignore
//! let config = LiveConfig::from_env();
//! let connection = WsConnection::connect(&config.ws_url, config.reconnect.clone()).await?;
//! let api = ApiClient::new(&config.rest_base_url);
//!
//! let session = AuctionSession::join(
//!     &connection,
//!     api,
//!     JoinParams { auction_id: 42, user_id: 7, role: ViewerRole::Bidder },
//!     SessionConfig::from(&config),
//! )
//! .await?;
//!
//! let mut live = session.live_state();
//! let receipt = session.submit_bid(Decimal::from(50)).await?;
//! ```
//!
//! One `WsConnection` may be shared by any number of sessions; each session
//! owns its per-auction state outright and tears it down on `leave`/drop.

pub mod api_client;
pub mod bidding;
pub mod config;
pub mod error;
pub mod ledger;
pub mod live_state;
pub mod session;
pub mod ws;

pub use api_client::ApiClient;
pub use bidding::{BidReceipt, ViewerRole};
pub use config::LiveConfig;
pub use error::{ApiError, BidError, ConnectError, JoinError, SendError};
pub use ledger::{BidEntry, BidHistoryLedger};
pub use live_state::AuctionLiveState;
pub use session::{AuctionSession, JoinParams, SessionConfig};
pub use ws::{ConnectionState, ReconnectConfig, WsConnection, WsHandle};

pub use mandi_shared as shared;
