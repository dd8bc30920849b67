//! Filler progress records.

use crate::intake::ProofTriple;
use crate::standards::bridge::{Order, Permit};
use crate::utils::with_0x_prefix;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a fulfillment stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FulfillmentStatus {
	/// Intake accepted, nothing checked yet.
	Received,
	/// Signatures and deadlines checked.
	Validated,
	/// Source and destination escrows exist.
	Deployed,
	/// The permit was applied and the source escrow holds the amount.
	Funded,
	/// The beneficiary was paid on the destination chain.
	Filled,
	/// The filler was paid on the source chain.
	Finalized,
	/// Gave up. Carries the last rejection.
	Failed(String),
}

/// [`FulfillmentStatus`] without its payload, for transition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FulfillmentStatusKind {
	Received,
	Validated,
	Deployed,
	Funded,
	Filled,
	Finalized,
	Failed,
}

impl FulfillmentStatus {
	pub fn kind(&self) -> FulfillmentStatusKind {
		match self {
			FulfillmentStatus::Received => FulfillmentStatusKind::Received,
			FulfillmentStatus::Validated => FulfillmentStatusKind::Validated,
			FulfillmentStatus::Deployed => FulfillmentStatusKind::Deployed,
			FulfillmentStatus::Funded => FulfillmentStatusKind::Funded,
			FulfillmentStatus::Filled => FulfillmentStatusKind::Filled,
			FulfillmentStatus::Finalized => FulfillmentStatusKind::Finalized,
			FulfillmentStatus::Failed(_) => FulfillmentStatusKind::Failed,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, FulfillmentStatus::Finalized | FulfillmentStatus::Failed(_))
	}
}

impl fmt::Display for FulfillmentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FulfillmentStatus::Received => write!(f, "Received"),
			FulfillmentStatus::Validated => write!(f, "Validated"),
			FulfillmentStatus::Deployed => write!(f, "Deployed"),
			FulfillmentStatus::Funded => write!(f, "Funded"),
			FulfillmentStatus::Filled => write!(f, "Filled"),
			FulfillmentStatus::Finalized => write!(f, "Finalized"),
			FulfillmentStatus::Failed(reason) => write!(f, "Failed: {}", reason),
		}
	}
}

/// Everything the filler needs to resume an order after a restart.
///
/// Keyed by the source escrow address, which is known before any ledger
/// call and does not change when the filler is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fulfillment {
	pub id: String,
	pub status: FulfillmentStatus,
	pub created_at: u64,
	pub updated_at: u64,
	/// The order exactly as the user signed it.
	pub order: Order,
	pub order_signature: Bytes,
	pub permit: Permit,
	pub permit_signature: Bytes,
	pub source_chain_id: u64,
	pub destination_chain_id: u64,
	pub source_escrow: Address,
	pub destination_escrow: Address,
	/// Identifier the escrows expect. Refreshed from ledger state when an
	/// escrow rejects it.
	pub order_id: B256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proof: Option<ProofTriple>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_error: Option<String>,
}

impl Fulfillment {
	/// Storage id of the fulfillment whose source escrow is `escrow`.
	pub fn id_for(escrow: &Address) -> String {
		with_0x_prefix(&hex::encode(escrow))
	}
}
