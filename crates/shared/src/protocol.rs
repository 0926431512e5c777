//! Real-time wire protocol between the bidding client and the auction server.
//!
//! Every frame in either direction is a [`WsEnvelope`] carrying a tagged
//! payload. Acks echo the envelope id of the request they answer in their
//! `nonce`, and server errors point back at the offending request through
//! `correlationId`, which is what lets the client run several exchanges over
//! one socket without guessing which answer belongs to which question.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::AuctionStatus;

/// Envelope wrapping every WebSocket frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Client → server invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    JoinAuction {
        auction_id: i64,
        user_id: i64,
    },
    LeaveAuction {
        auction_id: i64,
    },
    PlaceBid {
        auction_id: i64,
        bidder_user_id: i64,
        /// Absolute new total, not an increment.
        bid_amount: Decimal,
    },
}

/// Server → client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A bid was accepted; broadcast to every member of the auction room,
    /// including the bidder.
    BidPlaced {
        auction_id: i64,
        current_price: Decimal,
        min_increment: Decimal,
        user_id: i64,
    },
    /// Periodic partial state refresh. Only the fields present apply. A tick
    /// without an `auction_id` belongs to the room it was delivered on.
    PriceTick {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auction_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_price: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_increment: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<AuctionStatus>,
    },
    /// Positive acknowledgment; `nonce` echoes the request envelope id.
    Ack {
        nonce: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_price: Option<Decimal>,
    },
    /// Negative acknowledgment or standalone server error.
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_price: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_tagged_camel_case_frames() {
        let envelope = WsEnvelope {
            id: "abc".to_string(),
            payload: ClientCommand::PlaceBid {
                auction_id: 9,
                bidder_user_id: 3,
                bid_amount: Decimal::from(1050),
            },
            ts: "2026-03-01T10:00:00Z".parse().unwrap(),
            correlation_id: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "placeBid");
        assert_eq!(json["data"]["bidAmount"], "1050");
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn price_tick_fields_are_all_optional() {
        let frame = r#"{"id":"x","type":"priceTick","data":{"status":"closed"},"ts":"2026-03-01T10:00:00Z"}"#;
        let envelope: WsEnvelope<ServerEvent> = serde_json::from_str(frame).unwrap();
        match envelope.payload {
            ServerEvent::PriceTick {
                auction_id,
                current_price,
                min_increment,
                status,
            } => {
                assert_eq!(auction_id, None);
                assert_eq!(current_price, None);
                assert_eq!(min_increment, None);
                assert_eq!(status, Some(AuctionStatus::Closed));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
