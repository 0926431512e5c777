//! Bid submission rules.
//!
//! Validation is pure and local: a rejected bid never touches the network.
//! Checks run in a fixed order and short-circuit on the first failure, which
//! is what the per-kind tests below pin down. The absolute bid amount is
//! derived here, at validation time, so a broadcast that moved the price
//! while the user hesitated is reflected in what actually gets sent.

use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::BidError;
use crate::live_state::AuctionLiveState;

/// How this client participates in the auction room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerRole {
    /// May place bids.
    Bidder,
    /// The auction's owner, watching their own sale; bidding is refused.
    Owner,
}

/// Successful outcome of one `submit_bid` round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidReceipt {
    /// The absolute total that was submitted.
    pub bid_amount: Decimal,
    /// The server's price echo from the ack, when it sent one.
    pub confirmed_price: Option<Decimal>,
}

/// A submission awaiting its server verdict. At most one exists per session.
#[derive(Debug)]
pub(crate) struct InFlightBid {
    pub nonce: String,
    pub bid_amount: Decimal,
    pub deadline: Instant,
    pub reply: oneshot::Sender<Result<BidReceipt, BidError>>,
}

/// Check a proposed increment against the local session state and derive the
/// absolute amount to submit.
pub(crate) fn validate_bid(
    joined: bool,
    role: ViewerRole,
    increment: Decimal,
    live: &AuctionLiveState,
    submission_in_flight: bool,
) -> Result<Decimal, BidError> {
    if !joined {
        return Err(BidError::NotJoined);
    }
    if increment < live.min_increment() {
        return Err(BidError::BelowMinimumIncrement {
            increment,
            min_increment: live.min_increment(),
        });
    }
    if !live.is_open() {
        return Err(BidError::AuctionClosed);
    }
    if role == ViewerRole::Owner {
        return Err(BidError::OwnerCannotBid);
    }
    if submission_in_flight {
        return Err(BidError::SubmissionInProgress);
    }
    Ok(live.current_price() + increment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandi_shared::{AuctionSnapshot, AuctionStatus};

    fn open_auction() -> AuctionLiveState {
        let mut live = AuctionLiveState::new(7);
        live.initialize(&AuctionSnapshot {
            auction_id: 7,
            current_price: Decimal::from(1000),
            min_increment: Decimal::from(50),
            status: AuctionStatus::Open,
            start_time: None,
            end_time: None,
        });
        live
    }

    #[test]
    fn valid_bid_derives_the_absolute_amount() {
        let amount =
            validate_bid(true, ViewerRole::Bidder, Decimal::from(50), &open_auction(), false)
                .unwrap();
        assert_eq!(amount, Decimal::from(1050));
    }

    #[test]
    fn not_joined_takes_precedence_over_everything() {
        // Even an increment that would also fail the minimum check reports
        // the membership problem first.
        let err = validate_bid(false, ViewerRole::Owner, Decimal::from(1), &open_auction(), true)
            .unwrap_err();
        assert_eq!(err, BidError::NotJoined);
    }

    #[test]
    fn increment_below_minimum_is_rejected() {
        let err =
            validate_bid(true, ViewerRole::Bidder, Decimal::from(30), &open_auction(), false)
                .unwrap_err();
        assert_eq!(
            err,
            BidError::BelowMinimumIncrement {
                increment: Decimal::from(30),
                min_increment: Decimal::from(50),
            }
        );
    }

    #[test]
    fn closed_auction_is_rejected() {
        let mut live = open_auction();
        live.apply_price_tick(None, None, Some(AuctionStatus::Closed));
        let err = validate_bid(true, ViewerRole::Bidder, Decimal::from(50), &live, false)
            .unwrap_err();
        assert_eq!(err, BidError::AuctionClosed);
    }

    #[test]
    fn scheduled_auction_is_not_open_yet() {
        let mut live = AuctionLiveState::new(7);
        live.apply_price_tick(
            Some(Decimal::from(1000)),
            Some(Decimal::from(50)),
            Some(AuctionStatus::Scheduled),
        );
        let err = validate_bid(true, ViewerRole::Bidder, Decimal::from(50), &live, false)
            .unwrap_err();
        assert_eq!(err, BidError::AuctionClosed);
    }

    #[test]
    fn owner_cannot_bid_regardless_of_amount() {
        let err =
            validate_bid(true, ViewerRole::Owner, Decimal::from(5000), &open_auction(), false)
                .unwrap_err();
        assert_eq!(err, BidError::OwnerCannotBid);
    }

    #[test]
    fn overlapping_submission_is_rejected() {
        let err =
            validate_bid(true, ViewerRole::Bidder, Decimal::from(50), &open_auction(), true)
                .unwrap_err();
        assert_eq!(err, BidError::SubmissionInProgress);
    }
}
