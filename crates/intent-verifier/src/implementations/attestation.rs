//! Attester-signed proofs.
//!
//! A proof is a 65-byte ECDSA signature by one of a fixed set of attesters
//! over `keccak256(abi.encode(programVKey, keccak256(publicValues)))`. Only
//! programs whose verifying key is listed are accepted.

use crate::{ProofVerifierInterface, VerifierError};
use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use intent_types::{
	parse_signature, recover_signer, ConfigSchema, Field, FieldType, Schema, ValidationError,
};
use std::collections::HashSet;

/// Digest an attester signs for `(program_vkey, public_values)`.
pub fn attestation_digest(program_vkey: &B256, public_values: &[u8]) -> B256 {
	let mut encoded = Vec::with_capacity(64);
	encoded.extend_from_slice(program_vkey.as_slice());
	encoded.extend_from_slice(keccak256(public_values).as_slice());
	keccak256(encoded)
}

pub struct AttestationVerifier {
	program_vkeys: HashSet<B256>,
	attesters: HashSet<Address>,
}

impl AttestationVerifier {
	pub fn new(
		program_vkeys: impl IntoIterator<Item = B256>,
		attesters: impl IntoIterator<Item = Address>,
	) -> Self {
		Self {
			program_vkeys: program_vkeys.into_iter().collect(),
			attesters: attesters.into_iter().collect(),
		}
	}
}

pub struct AttestationVerifierSchema;

impl ConfigSchema for AttestationVerifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let non_empty = |v: &toml::Value| match v.as_array() {
			Some(items) if !items.is_empty() => Ok(()),
			_ => Err("must list at least one entry".to_string()),
		};
		Schema::new(
			vec![
				Field::new(
					"program_vkeys",
					FieldType::Array(Box::new(FieldType::Bytes32)),
				)
				.with_validator(non_empty),
				Field::new("attesters", FieldType::Array(Box::new(FieldType::Address)))
					.with_validator(non_empty),
			],
			vec![],
		)
		.validate(config)
	}
}

#[async_trait]
impl ProofVerifierInterface for AttestationVerifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AttestationVerifierSchema)
	}

	async fn verify_proof(
		&self,
		program_vkey: &B256,
		public_values: &[u8],
		proof_bytes: &[u8],
	) -> Result<(), VerifierError> {
		if !self.program_vkeys.contains(program_vkey) {
			return Err(VerifierError::UnknownProgram(*program_vkey));
		}

		let signature =
			parse_signature(proof_bytes).map_err(|e| VerifierError::Malformed(e.to_string()))?;
		let attester = recover_signer(&attestation_digest(program_vkey, public_values), &signature)
			.map_err(|e| VerifierError::Malformed(e.to_string()))?;

		if self.attesters.contains(&attester) {
			Ok(())
		} else {
			Err(VerifierError::Rejected(format!("{} is not an attester", attester)))
		}
	}
}

fn parse_list<T: std::str::FromStr>(config: &toml::Value, key: &str) -> Result<Vec<T>, VerifierError>
where
	T::Err: std::fmt::Display,
{
	config
		.get(key)
		.and_then(|v| v.as_array())
		.ok_or_else(|| VerifierError::InvalidConfig(format!("{} is required", key)))?
		.iter()
		.map(|item| {
			let s = item
				.as_str()
				.ok_or_else(|| VerifierError::InvalidConfig(format!("{} entries must be strings", key)))?;
			s.parse::<T>()
				.map_err(|e| VerifierError::InvalidConfig(format!("{} entry '{}': {}", key, s, e)))
		})
		.collect()
}

pub fn create_verifier(config: &toml::Value) -> Result<Box<dyn ProofVerifierInterface>, VerifierError> {
	AttestationVerifierSchema
		.validate(config)
		.map_err(|e| VerifierError::InvalidConfig(e.to_string()))?;

	let program_vkeys: Vec<B256> = parse_list(config, "program_vkeys")?;
	let attesters: Vec<Address> = parse_list(config, "attesters")?;
	Ok(Box::new(AttestationVerifier::new(program_vkeys, attesters)))
}

pub struct Registry;

impl intent_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "attestation";
	type Factory = crate::VerifierFactory;

	fn factory() -> Self::Factory {
		create_verifier
	}
}

impl crate::VerifierRegistry for Registry {}
