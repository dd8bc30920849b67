//! Verifier with a fixed answer, for local networks and tests.

use crate::{ProofVerifierInterface, VerifierError};
use alloy_primitives::B256;
use async_trait::async_trait;
use intent_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

pub struct MockVerifier {
	accept: bool,
}

impl MockVerifier {
	pub fn new(accept: bool) -> Self {
		Self { accept }
	}
}

pub struct MockVerifierSchema;

impl ConfigSchema for MockVerifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("accept", FieldType::Boolean)]).validate(config)
	}
}

#[async_trait]
impl ProofVerifierInterface for MockVerifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockVerifierSchema)
	}

	async fn verify_proof(
		&self,
		_program_vkey: &B256,
		_public_values: &[u8],
		_proof_bytes: &[u8],
	) -> Result<(), VerifierError> {
		if self.accept {
			Ok(())
		} else {
			Err(VerifierError::Rejected("mock verifier configured to reject".into()))
		}
	}
}

/// Builds a mock verifier. `accept` defaults to true.
pub fn create_verifier(config: &toml::Value) -> Result<Box<dyn ProofVerifierInterface>, VerifierError> {
	MockVerifierSchema
		.validate(config)
		.map_err(|e| VerifierError::InvalidConfig(e.to_string()))?;

	let accept = config
		.get("accept")
		.and_then(|v| v.as_bool())
		.unwrap_or(true);
	Ok(Box::new(MockVerifier::new(accept)))
}

pub struct Registry;

impl intent_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = crate::VerifierFactory;

	fn factory() -> Self::Factory {
		create_verifier
	}
}

impl crate::VerifierRegistry for Registry {}
