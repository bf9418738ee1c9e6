//! Shared data structures for the caption relay
//!
//! - `CaptionRecord`: one parsed caption line (timestamp, speaker, texts)
//! - `RelayStatus`: observable status surface written by the delivery worker
//! - `DeliveryFailure`: error notification raised for a surfaced send failure

mod caption;
mod status;

pub use caption::*;
pub use status::*;
