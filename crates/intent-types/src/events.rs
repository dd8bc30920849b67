//! Events published on the filler's event bus.
//!
//! Handlers react to each other's progress through these rather than calling
//! each other directly. Every event carries the fulfillment id (the source
//! escrow address).

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FillerEvent {
	Intake(IntakeEvent),
	Escrow(EscrowEvent),
	Settlement(SettlementEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntakeEvent {
	/// A payload was decoded and recorded.
	Received { fulfillment_id: String },
	/// Signatures, chains and deadlines checked out.
	Validated { fulfillment_id: String },
	/// The payload was refused before any ledger call.
	Rejected {
		fulfillment_id: Option<String>,
		reason: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EscrowEvent {
	/// Both escrows exist.
	Deployed {
		fulfillment_id: String,
		source_escrow: Address,
		destination_escrow: Address,
	},
	/// The source escrow pulled the user's funds.
	Funded { fulfillment_id: String },
	/// The beneficiary was paid on the destination chain.
	Filled { fulfillment_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementEvent {
	ProofReady { fulfillment_id: String },
	/// The source escrow released funds to the filler.
	Finalized { fulfillment_id: String },
	/// A step exhausted its attempts.
	Failed {
		fulfillment_id: String,
		step: String,
		reason: String,
	},
}
