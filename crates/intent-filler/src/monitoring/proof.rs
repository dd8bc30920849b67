//! Waits for a proof of a destination fill.
//!
//! Proofs only become available once the fill is final on the destination
//! chain, which can take arbitrarily long. The monitor polls the proof
//! source at a fixed interval until it answers or the timeout passes.

use crate::proof::{ProofError, ProofService};
use crate::retry::FulfillmentStep;
use crate::FillerError;
use intent_escrow::ChainRegistry;
use intent_types::{Fulfillment, ProofTriple};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Polls a [`ProofService`] until the proof is ready or time runs out.
pub struct ProofMonitor {
	proofs: Arc<ProofService>,
	chains: ChainRegistry,
	poll_interval: Duration,
	timeout: Duration,
}

impl ProofMonitor {
	pub fn new(
		proofs: Arc<ProofService>,
		chains: ChainRegistry,
		poll_interval: Duration,
		timeout: Duration,
	) -> Self {
		Self {
			proofs,
			chains,
			poll_interval,
			timeout,
		}
	}

	/// Returns the first proof the source produces.
	///
	/// `NotReady` and `Unavailable` answers are polled again. Any other error,
	/// or no proof before the timeout, fails the proof step.
	pub async fn wait_for_proof(&self, fulfillment: &Fulfillment) -> Result<ProofTriple, FillerError> {
		let step = FulfillmentStep::Proof;
		let deadline = Instant::now() + self.timeout;
		let mut polls = 0u32;

		loop {
			polls += 1;
			match self.proofs.fetch_proof(fulfillment, &self.chains).await {
				Ok(proof) => {
					tracing::debug!(polls, "Proof available");
					return Ok(proof);
				},
				Err(ProofError::NotReady(reason)) | Err(ProofError::Unavailable(reason)) => {
					tracing::trace!(polls, reason = %reason, "Proof pending");
				},
				Err(e) => return Err(step.failed(e.to_string())),
			}

			if Instant::now() + self.poll_interval >= deadline {
				return Err(step.failed(format!(
					"No proof within {}s after {} polls",
					self.timeout.as_secs(),
					polls
				)));
			}
			tokio::time::sleep(self.poll_interval).await;
		}
	}
}
