//! Shared wire types for the mandi live-auction protocol.
//!
//! Both the bidding client and the auction server speak the envelope,
//! command, and event shapes defined here; the REST response shapes live
//! alongside them so a single crate owns every serialized boundary.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
