//! Payloads exchanged with actors outside the protocol.
//!
//! A user hands the filler an [`IntakePayload`]: the signed order and permit
//! in their wire forms. A proof pipeline hands back a [`ProofTriple`] that the
//! source escrow checks before releasing funds.

use crate::order::{decode_order, decode_permit, CodecError};
use crate::standards::bridge::{Order, Permit};
use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};

/// Signed order and permit as submitted by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakePayload {
	#[serde(rename = "ordersignature")]
	pub order_signature: Bytes,
	/// ABI parameter encoding of the order.
	#[serde(rename = "orderrawbytes")]
	pub order_bytes: Bytes,
	#[serde(rename = "permitsignature")]
	pub permit_signature: Bytes,
	/// ABI encoding of the permit.
	#[serde(rename = "permitrawbytes")]
	pub permit_bytes: Bytes,
}

/// An intake payload with its structures decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIntake {
	pub order: Order,
	pub order_signature: Bytes,
	pub permit: Permit,
	pub permit_signature: Bytes,
}

impl IntakePayload {
	pub fn new(order: &Order, order_signature: Bytes, permit: &Permit, permit_signature: Bytes) -> Self {
		Self {
			order_signature,
			order_bytes: crate::order::encode_order(order),
			permit_signature,
			permit_bytes: crate::order::encode_permit(permit),
		}
	}

	pub fn decode(&self) -> Result<DecodedIntake, CodecError> {
		Ok(DecodedIntake {
			order: decode_order(&self.order_bytes)?,
			order_signature: self.order_signature.clone(),
			permit: decode_permit(&self.permit_bytes)?,
			permit_signature: self.permit_signature.clone(),
		})
	}
}

/// Proof that a destination fill happened, as consumed by
/// `finalizeOnOrigin(programVKey, publicValues, proofBytes)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofTriple {
	#[serde(rename = "programVKey")]
	pub program_vkey: B256,
	#[serde(rename = "publicValues")]
	pub public_values: Bytes,
	#[serde(rename = "proofBytes")]
	pub proof_bytes: Bytes,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::order::tests::sample_order;
	use alloy_primitives::{Address, U256};

	fn sample_permit() -> Permit {
		Permit {
			owner: Address::repeat_byte(0x01),
			spender: Address::repeat_byte(0x02),
			value: U256::from(7u64),
			nonce: U256::ZERO,
			deadline: U256::from(1_700_000_600u64),
		}
	}

	#[test]
	fn test_intake_json_field_names() {
		let payload = IntakePayload::new(
			&sample_order(),
			Bytes::from(vec![0xaa; 65]),
			&sample_permit(),
			Bytes::from(vec![0xbb; 65]),
		);
		let json = serde_json::to_value(&payload).unwrap();

		for key in ["ordersignature", "orderrawbytes", "permitsignature", "permitrawbytes"] {
			assert!(json[key].as_str().unwrap().starts_with("0x"), "{} not hex", key);
		}
	}

	#[test]
	fn test_intake_decodes_structures() {
		let payload = IntakePayload::new(
			&sample_order(),
			Bytes::from(vec![0xaa; 65]),
			&sample_permit(),
			Bytes::from(vec![0xbb; 65]),
		);
		let json = serde_json::to_string(&payload).unwrap();
		let decoded = serde_json::from_str::<IntakePayload>(&json).unwrap().decode().unwrap();

		assert_eq!(decoded.order, sample_order());
		assert_eq!(decoded.permit, sample_permit());
	}

	#[test]
	fn test_intake_rejects_bad_permit_bytes() {
		let mut payload = IntakePayload::new(
			&sample_order(),
			Bytes::new(),
			&sample_permit(),
			Bytes::new(),
		);
		payload.permit_bytes = Bytes::from(vec![0u8; 10]);
		assert!(matches!(payload.decode(), Err(CodecError::InvalidPermit(_))));
	}

	#[test]
	fn test_proof_triple_field_names() {
		let proof = ProofTriple {
			program_vkey: B256::repeat_byte(0x01),
			public_values: Bytes::from(vec![1, 2, 3]),
			proof_bytes: Bytes::new(),
		};
		let json = serde_json::to_value(&proof).unwrap();
		assert!(json.get("programVKey").is_some());
		assert_eq!(json["publicValues"], "0x010203");
	}
}
