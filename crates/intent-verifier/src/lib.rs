//! Proof verification for origin-chain settlement.
//!
//! A source escrow releases funds to its filler only after a verifier
//! accepts a `(programVKey, publicValues, proofBytes)` triple. Verifiers are
//! pluggable: each implementation registers a factory under a configuration
//! name, and the ledger binds an instance to an address.

use alloy_primitives::B256;
use async_trait::async_trait;
use intent_types::{truncate_id, ConfigSchema, ImplementationRegistry};
use thiserror::Error;

pub mod implementations {
	pub mod attestation;
	pub mod mock;
}

/// Errors that can occur during proof verification.
#[derive(Debug, Error)]
pub enum VerifierError {
	/// The proof was checked and does not hold.
	#[error("Proof rejected: {0}")]
	Rejected(String),
	/// The proof bytes could not be interpreted.
	#[error("Malformed proof: {0}")]
	Malformed(String),
	/// The verifying key names a program this verifier does not accept.
	#[error("Unknown program verifying key: {0}")]
	UnknownProgram(B256),
	#[error("Invalid verifier configuration: {0}")]
	InvalidConfig(String),
}

/// A verifier for fill proofs.
///
/// Implementations must not keep per-call state: the same instance is
/// shared by every escrow on a chain. Escrows pass `public_values` through
/// without reading them, so nothing ties a proof to the escrow that submits
/// it unless the program commits to that escrow in its public values and
/// the proof pipeline checks it.
#[async_trait]
pub trait ProofVerifierInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Returns `Ok(())` if and only if the proof is valid for the program
	/// and public values.
	async fn verify_proof(
		&self,
		program_vkey: &B256,
		public_values: &[u8],
		proof_bytes: &[u8],
	) -> Result<(), VerifierError>;
}

pub type VerifierFactory = fn(&toml::Value) -> Result<Box<dyn ProofVerifierInterface>, VerifierError>;

pub trait VerifierRegistry: ImplementationRegistry<Factory = VerifierFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, VerifierFactory)> {
	use implementations::{attestation, mock};

	vec![
		(attestation::Registry::NAME, attestation::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// A named verifier with call logging.
pub struct VerifierService {
	name: String,
	implementation: Box<dyn ProofVerifierInterface>,
}

impl VerifierService {
	pub fn new(name: impl Into<String>, implementation: Box<dyn ProofVerifierInterface>) -> Self {
		Self {
			name: name.into(),
			implementation,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

#[async_trait]
impl ProofVerifierInterface for VerifierService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.implementation.config_schema()
	}

	async fn verify_proof(
		&self,
		program_vkey: &B256,
		public_values: &[u8],
		proof_bytes: &[u8],
	) -> Result<(), VerifierError> {
		let vkey = truncate_id(&program_vkey.to_string());
		match self
			.implementation
			.verify_proof(program_vkey, public_values, proof_bytes)
			.await
		{
			Ok(()) => {
				tracing::debug!(verifier = %self.name, program_vkey = %vkey, "Proof accepted");
				Ok(())
			},
			Err(e) => {
				tracing::warn!(verifier = %self.name, program_vkey = %vkey, error = %e, "Proof rejected");
				Err(e)
			},
		}
	}
}
