//! Settlement handler.
//!
//! Once the beneficiary is paid, waits for a proof of that payment and
//! presents it to the source escrow, which releases the escrowed funds to
//! the filler.

use crate::engine::event_bus::EventBus;
use crate::handlers::Factories;
use crate::monitoring::ProofMonitor;
use crate::proof::ProofService;
use crate::retry::{classify, FulfillmentStep, Recovery, RetryPolicy};
use crate::state::FulfillmentStateMachine;
use crate::FillerError;
use intent_escrow::ChainRegistry;
use intent_types::{truncate_id, FillerEvent, FulfillmentStatus, SettlementEvent};
use std::sync::Arc;
use tracing::instrument;

/// Obtains the fill proof and claims the source escrow with it.
pub struct SettlementHandler {
	factories: Factories,
	chains: ChainRegistry,
	proofs: Arc<ProofService>,
	monitor: ProofMonitor,
	state_machine: Arc<FulfillmentStateMachine>,
	event_bus: EventBus,
	retry: RetryPolicy,
}

impl SettlementHandler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		factories: Factories,
		chains: ChainRegistry,
		proofs: Arc<ProofService>,
		monitor: ProofMonitor,
		state_machine: Arc<FulfillmentStateMachine>,
		event_bus: EventBus,
		retry: RetryPolicy,
	) -> Self {
		Self {
			factories,
			chains,
			proofs,
			monitor,
			state_machine,
			event_bus,
			retry,
		}
	}

	/// Waits for the fill proof and stores it with the fulfillment.
	#[instrument(skip_all, fields(order_id = %truncate_id(fulfillment_id)))]
	pub async fn await_proof(&self, fulfillment_id: &str) -> Result<(), FillerError> {
		let fulfillment = self.state_machine.get(fulfillment_id).await?;
		if fulfillment.status != FulfillmentStatus::Filled {
			tracing::debug!(status = %fulfillment.status, "Not awaiting a proof, skipping");
			return Ok(());
		}

		if fulfillment.proof.is_none() {
			let proof = self.monitor.wait_for_proof(&fulfillment).await?;
			self.state_machine
				.update_with(fulfillment_id, |f| f.proof = Some(proof))
				.await?;
		}

		tracing::info!("Proof ready");
		self.event_bus
			.publish(FillerEvent::Settlement(SettlementEvent::ProofReady {
				fulfillment_id: fulfillment_id.to_string(),
			}))
			.ok();
		Ok(())
	}

	/// Claims the escrowed funds on the source chain.
	#[instrument(skip_all, fields(order_id = %truncate_id(fulfillment_id)))]
	pub async fn finalize(&self, fulfillment_id: &str) -> Result<(), FillerError> {
		let fulfillment = self.state_machine.get(fulfillment_id).await?;
		if fulfillment.status != FulfillmentStatus::Filled {
			tracing::debug!(status = %fulfillment.status, "Not finalizable, skipping");
			return Ok(());
		}
		let step = FulfillmentStep::Finalize;

		let escrow = self
			.factories
			.get(&fulfillment.source_chain_id)
			.ok_or_else(|| step.failed(format!("Chain {} not configured", fulfillment.source_chain_id)))?
			.escrow(fulfillment.source_escrow)
			.await?;

		let mut proof = match fulfillment.proof.clone() {
			Some(proof) => proof,
			None => self.monitor.wait_for_proof(&fulfillment).await?,
		};
		let mut attempt = 0;
		let released = loop {
			attempt += 1;
			let result = escrow
				.finalize_on_origin(proof.program_vkey, &proof.public_values, &proof.proof_bytes)
				.await;
			let e = match result {
				Ok(released) => break released,
				Err(e) => e,
			};

			let reason = e.to_string();
			match classify(&e) {
				Recovery::RefetchProof => match self.proofs.fetch_proof(&fulfillment, &self.chains).await {
					Ok(fresh) => {
						tracing::warn!("Proof rejected, refetched");
						proof = fresh;
						let stored = proof.clone();
						self.state_machine
							.update_with(fulfillment_id, |f| f.proof = Some(stored))
							.await?;
					},
					Err(fetch_error) => {
						tracing::warn!(error = %fetch_error, "Proof refetch failed");
					},
				},
				Recovery::AlreadyApplied => {
					if escrow.origin_completed().await? {
						tracing::info!("Origin already completed");
						break alloy_primitives::U256::ZERO;
					}
				},
				Recovery::Fatal => return Err(step.failed(reason)),
				Recovery::Retry | Recovery::RefreshOrderId => {},
			}
			self.retry.backoff(step, attempt, &reason).await?;
		};

		self.state_machine
			.transition(fulfillment_id, FulfillmentStatus::Finalized)
			.await?;
		tracing::info!(released = %released, "Fulfillment finalized");
		self.event_bus
			.publish(FillerEvent::Settlement(SettlementEvent::Finalized {
				fulfillment_id: fulfillment_id.to_string(),
			}))
			.ok();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::test_support::{self, Devnet};
	use alloy_primitives::Bytes;
	use intent_types::FulfillmentStatus;

	async fn filled(net: &Devnet, engine: &crate::FillerEngine) -> String {
		let id = engine.intake().handle(net.intake(&net.order()).await).await.unwrap();
		engine.intake().validate(&id).await.unwrap();
		engine.escrows().deploy(&id).await.unwrap();
		engine.escrows().fund(&id).await.unwrap();
		engine.escrows().fill(&id).await.unwrap();
		id
	}

	#[tokio::test]
	async fn test_proof_then_finalize_pays_filler() {
		let net = Devnet::new().await;
		let engine = net.engine().await;
		let id = filled(&net, &engine).await;

		engine.settlement().await_proof(&id).await.unwrap();
		assert!(engine.state().get(&id).await.unwrap().proof.is_some());

		engine.settlement().finalize(&id).await.unwrap();
		let record = engine.state().get(&id).await.unwrap();
		assert_eq!(record.status, FulfillmentStatus::Finalized);
		assert_eq!(
			net.source_chain()
				.balance_of(&test_support::source_token(), &test_support::filler_address())
				.await
				.unwrap(),
			test_support::e18(100)
		);
	}

	#[tokio::test]
	async fn test_corrupted_proof_is_refetched() {
		let net = Devnet::new().await;
		let engine = net.engine().await;
		let id = filled(&net, &engine).await;
		engine.settlement().await_proof(&id).await.unwrap();

		engine
			.state()
			.update_with(&id, |f| {
				if let Some(proof) = f.proof.as_mut() {
					proof.proof_bytes = Bytes::from(vec![0u8; 65]);
				}
			})
			.await
			.unwrap();

		engine.settlement().finalize(&id).await.unwrap();
		assert_eq!(
			engine.state().get(&id).await.unwrap().status,
			FulfillmentStatus::Finalized
		);
	}

	#[tokio::test]
	async fn test_finalize_after_user_withdrew_fails() {
		let net = Devnet::new().await;
		let engine = net.engine().await;
		let id = filled(&net, &engine).await;
		engine.settlement().await_proof(&id).await.unwrap();

		let record = engine.state().get(&id).await.unwrap();
		net.source_chain().advance_time(1_000).await;
		net.source_factory()
			.escrow(record.source_escrow)
			.await
			.unwrap()
			.withdraw(test_support::user_address(), record.order_id)
			.await
			.unwrap();

		let err = engine.settlement().finalize(&id).await.unwrap_err();
		assert!(err.to_string().contains("Step finalize failed"));
	}
}
