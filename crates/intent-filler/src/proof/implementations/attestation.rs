//! Attester-signed fill proofs.
//!
//! Stands in for a proving pipeline: it watches the destination escrow's
//! log for the fill's `Completed` event and, once that event has the
//! required number of blocks on top, signs the attestation digest over
//! `abi.encode(orderId, destinationChainId, destinationEscrow, blockNumber)`.

use crate::proof::{ProofError, ProofInterface};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use intent_account::implementations::local::LocalWallet;
use intent_account::AccountInterface;
use intent_escrow::{ChainEvent, ChainRegistry};
use intent_types::{
	ConfigSchema, Field, FieldType, Fulfillment, ProofTriple, Schema, SecretString,
	ValidationError,
};
use intent_verifier::implementations::attestation::attestation_digest;

pub struct AttestationProof {
	attester: LocalWallet,
	program_vkey: B256,
	min_confirmations: u64,
}

impl AttestationProof {
	pub fn new(
		attester_key: &SecretString,
		program_vkey: B256,
		min_confirmations: u64,
	) -> Result<Self, ProofError> {
		let attester =
			LocalWallet::new(attester_key).map_err(|e| ProofError::InvalidConfig(e.to_string()))?;
		Ok(Self {
			attester,
			program_vkey,
			min_confirmations,
		})
	}
}

/// Fields of [`public_values`], in encoding order.
type PublicValues = (B256, U256, Address, U256);

/// Public values committed to by an attestation.
pub fn public_values(
	order_id: B256,
	destination_chain_id: u64,
	destination_escrow: Address,
	block_number: u64,
) -> Bytes {
	Bytes::from(
		(
			order_id,
			U256::from(destination_chain_id),
			destination_escrow,
			U256::from(block_number),
		)
			.abi_encode(),
	)
}

pub struct AttestationProofSchema;

impl ConfigSchema for AttestationProofSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("attester_private_key", FieldType::String),
				Field::new("program_vkey", FieldType::Bytes32),
			],
			vec![Field::new(
				"min_confirmations",
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)],
		)
		.validate(config)
	}
}

#[async_trait]
impl ProofInterface for AttestationProof {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AttestationProofSchema)
	}

	async fn fetch_proof(
		&self,
		fulfillment: &Fulfillment,
		chains: &ChainRegistry,
	) -> Result<ProofTriple, ProofError> {
		let chain = chains
			.get(fulfillment.destination_chain_id)
			.map_err(|e| ProofError::Unavailable(e.to_string()))?;

		let filled_at = chain
			.logs_for(&fulfillment.destination_escrow)
			.await
			.into_iter()
			.find_map(|log| match log.event {
				ChainEvent::Completed { order_id } => Some((order_id, log.block_number)),
				_ => None,
			});
		let Some((order_id, block_number)) = filled_at else {
			return Err(ProofError::NotReady(format!(
				"no fill recorded for {} on chain {}",
				fulfillment.destination_escrow, fulfillment.destination_chain_id
			)));
		};

		let head = chain.block_number().await;
		if head < block_number.saturating_add(self.min_confirmations) {
			return Err(ProofError::NotReady(format!(
				"fill at block {} has {} of {} confirmations",
				block_number,
				head - block_number,
				self.min_confirmations
			)));
		}

		let public_values = public_values(
			order_id,
			fulfillment.destination_chain_id,
			fulfillment.destination_escrow,
			block_number,
		);
		let signature = self
			.attester
			.sign_hash(&attestation_digest(&self.program_vkey, &public_values))
			.await
			.map_err(|e| ProofError::Signing(e.to_string()))?;

		Ok(ProofTriple {
			program_vkey: self.program_vkey,
			public_values,
			proof_bytes: Bytes::from(signature.as_bytes().to_vec()),
		})
	}

	/// The destination escrow address is create2-derived from the order, so
	/// matching it and its chain pins the proof to this fulfillment.
	fn check_binding(&self, fulfillment: &Fulfillment, proof: &ProofTriple) -> Result<(), ProofError> {
		let (order_id, chain_id, escrow, _) =
			<PublicValues as SolValue>::abi_decode(&proof.public_values, true)
				.map_err(|e| ProofError::Mismatch(format!("undecodable public values: {}", e)))?;
		if chain_id != U256::from(fulfillment.destination_chain_id)
			|| escrow != fulfillment.destination_escrow
		{
			return Err(ProofError::Mismatch(format!(
				"order {} was filled by {} on chain {}, expected {} on chain {}",
				order_id, escrow, chain_id, fulfillment.destination_escrow,
				fulfillment.destination_chain_id
			)));
		}
		Ok(())
	}
}

/// Builds an attestation proof source.
///
/// Configuration parameters:
/// - `attester_private_key`: key whose signatures the source verifier accepts (required)
/// - `program_vkey`: verifying key the proofs are issued under (required)
/// - `min_confirmations`: blocks required on top of the fill (default 0)
pub fn create_proof(config: &toml::Value) -> Result<Box<dyn ProofInterface>, ProofError> {
	AttestationProofSchema
		.validate(config)
		.map_err(|e| ProofError::InvalidConfig(e.to_string()))?;

	let attester_key = config
		.get("attester_private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| ProofError::InvalidConfig("attester_private_key is required".into()))?;
	let program_vkey = config
		.get("program_vkey")
		.and_then(|v| v.as_str())
		.ok_or_else(|| ProofError::InvalidConfig("program_vkey is required".into()))?
		.parse::<B256>()
		.map_err(|e| ProofError::InvalidConfig(format!("program_vkey: {}", e)))?;
	let min_confirmations = config
		.get("min_confirmations")
		.and_then(|v| v.as_integer())
		.unwrap_or(0) as u64;

	Ok(Box::new(AttestationProof::new(
		&attester_key,
		program_vkey,
		min_confirmations,
	)?))
}

pub struct Registry;

impl intent_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "attestation";
	type Factory = crate::proof::ProofFactory;

	fn factory() -> Self::Factory {
		create_proof
	}
}

impl crate::proof::ProofRegistry for Registry {}
