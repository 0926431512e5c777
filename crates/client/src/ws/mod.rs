//! WebSocket transport for real-time auction rooms.
//!
//! One [`WsConnection`] owns one persistent socket to the auction server and
//! may be shared by any number of auction sessions. Sessions read inbound
//! events from a broadcast stream, observe the connection state through a
//! watch channel, and send commands through cloned [`WsHandle`]s; the
//! connection itself knows nothing about auctions.
//!
//! ```text
//!   ┌──────────────┐   events (broadcast)   ┌────────────────┐
//!   │ WsConnection │ ─────────────────────▶ │ AuctionSession │  (one per
//!   │  (one task,  │   state (watch)        │ AuctionSession │   joined
//!   │  one socket) │ ◀───────────────────── │      …         │   auction)
//!   └──────────────┘   commands (WsHandle)  └────────────────┘
//! ```
//!
//! Reconnection is automatic: when the socket drops mid-session the task
//! re-dials with exponential backoff and the state channel walks through
//! `Reconnecting { attempt }` back to `Connected`. That transition is the
//! re-join/resync trigger for sessions.

mod connection;

pub use connection::{ConnectionState, ReconnectConfig, WsConnection, WsHandle};
