//! Event handlers for the filler engine.
//!
//! Each handler owns one part of a fulfillment's lifecycle and reports
//! progress on the event bus. The engine routes those events to the next
//! handler.

pub mod escrow;
pub mod intake;
pub mod settlement;

pub use escrow::EscrowHandler;
pub use intake::IntakeHandler;
pub use settlement::SettlementHandler;

use intent_escrow::EscrowFactory;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory handle per configured chain id.
pub type Factories = Arc<HashMap<u64, EscrowFactory>>;
