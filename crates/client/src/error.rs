//! Typed failures surfaced by the live-auction core.
//!
//! Connection loss mid-session is deliberately absent here as a connection
//! error: it is a [`ConnectionState`](crate::ws::ConnectionState) transition,
//! not a failure. Only the initial handshake can fail a `connect` call.

use rust_decimal::Decimal;
use thiserror::Error;

pub use mandi_shared::ApiError;

/// Initial WebSocket handshake failure.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("websocket handshake with {url} failed")]
    Handshake {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Failure to hand a command frame to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("connection has been shut down")]
    Closed,
}

/// Failures while joining an auction room.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("join rejected by server: {0}")]
    Rejected(String),
    #[error("timed out waiting for join acknowledgment")]
    Timeout,
    #[error("connection closed while joining")]
    ConnectionLost,
    #[error("failed to load auction snapshot")]
    Snapshot(#[from] ApiError),
}

/// Failures of a single `submit_bid` attempt.
///
/// The first five are resolved locally, before any frame is sent; the rest
/// are round-trip outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BidError {
    #[error("not joined to the auction room")]
    NotJoined,
    #[error("increment {increment} is below the minimum {min_increment}")]
    BelowMinimumIncrement {
        increment: Decimal,
        min_increment: Decimal,
    },
    #[error("auction is not open for bidding")]
    AuctionClosed,
    #[error("the auction owner cannot bid on their own auction")]
    OwnerCannotBid,
    #[error("another bid submission is already in flight")]
    SubmissionInProgress,
    #[error("bid rejected by server: {message}")]
    Rejected {
        message: String,
        /// The server's current price, when it sent one, so the caller can
        /// reset its increment input against the new floor.
        current_price: Option<Decimal>,
    },
    #[error("timed out waiting for bid acknowledgment")]
    Timeout,
    #[error("connection lost while the bid was in flight")]
    ConnectionLost,
    #[error("the auction session has been closed")]
    SessionClosed,
}
