//! Proof sources.
//!
//! The filler does not generate proofs itself. A [`ProofInterface`]
//! implementation observes the destination chain and, once the fill is
//! final, hands back the triple the source escrow's verifier checks.

use async_trait::async_trait;
use intent_escrow::ChainRegistry;
use intent_types::{truncate_id, ConfigSchema, Fulfillment, ImplementationRegistry, ProofTriple};
use thiserror::Error;

pub mod implementations {
	pub mod attestation;
}

/// Errors from a proof source.
#[derive(Debug, Error)]
pub enum ProofError {
	/// The fill is not visible or not final yet. Poll again.
	#[error("Proof not ready: {0}")]
	NotReady(String),
	#[error("Proof source unavailable: {0}")]
	Unavailable(String),
	#[error("Signing failed: {0}")]
	Signing(String),
	#[error("Invalid proof configuration: {0}")]
	InvalidConfig(String),
	/// The proof commits to a different fill than the one asked about.
	#[error("Proof does not match fulfillment: {0}")]
	Mismatch(String),
}

/// Source of fill proofs for the settlement handler.
#[async_trait]
pub trait ProofInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Produces a proof that `fulfillment`'s destination fill happened.
	async fn fetch_proof(
		&self,
		fulfillment: &Fulfillment,
		chains: &ChainRegistry,
	) -> Result<ProofTriple, ProofError>;

	/// Checks that `proof` commits to `fulfillment`'s own fill.
	///
	/// The source escrow hands public values to its verifier untouched, so
	/// a proof for one order would also release another escrow bound to the
	/// same verifier. Sources that know their public values layout should
	/// reject such proofs here.
	fn check_binding(&self, _fulfillment: &Fulfillment, _proof: &ProofTriple) -> Result<(), ProofError> {
		Ok(())
	}
}

pub type ProofFactory = fn(&toml::Value) -> Result<Box<dyn ProofInterface>, ProofError>;

pub trait ProofRegistry: ImplementationRegistry<Factory = ProofFactory> {}

/// Every built-in proof source, by configuration name.
pub fn get_all_implementations() -> Vec<(&'static str, ProofFactory)> {
	use implementations::attestation;

	vec![(attestation::Registry::NAME, attestation::Registry::factory())]
}

/// Wraps the configured proof source, checking every proof it returns
/// against the fulfillment it was asked for.
pub struct ProofService {
	implementation: Box<dyn ProofInterface>,
}

impl ProofService {
	pub fn new(implementation: Box<dyn ProofInterface>) -> Self {
		Self { implementation }
	}

	pub async fn fetch_proof(
		&self,
		fulfillment: &Fulfillment,
		chains: &ChainRegistry,
	) -> Result<ProofTriple, ProofError> {
		let proof = self.implementation.fetch_proof(fulfillment, chains).await?;
		self.implementation.check_binding(fulfillment, &proof)?;
		tracing::debug!(
			order_id = %truncate_id(&fulfillment.order_id.to_string()),
			program = %truncate_id(&proof.program_vkey.to_string()),
			public_values_len = proof.public_values.len(),
			"Proof fetched"
		);
		Ok(proof)
	}
}
