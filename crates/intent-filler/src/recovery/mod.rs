//! Resumes unfinished fulfillments after a restart.
//!
//! Each stored fulfillment that is not terminal gets the event its current
//! status would have produced, so the engine picks it up at the step where
//! it stopped. Handlers check ledger state before writing, which makes a
//! replayed step safe even if it had already gone through.

use crate::engine::event_bus::EventBus;
use crate::state::FulfillmentStateMachine;
use crate::FillerError;
use intent_types::{
	truncate_id, EscrowEvent, FillerEvent, Fulfillment, FulfillmentStatus, IntakeEvent,
	SettlementEvent,
};
use std::sync::Arc;
use tracing::instrument;

/// Outcome of a recovery pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Non-terminal fulfillments found in storage.
	pub total: usize,
	/// Fulfillments whose next step was republished.
	pub resumed: usize,
}

/// Republishes the pending step of stored fulfillments.
pub struct RecoveryService {
	state_machine: Arc<FulfillmentStateMachine>,
	event_bus: EventBus,
}

impl RecoveryService {
	pub fn new(state_machine: Arc<FulfillmentStateMachine>, event_bus: EventBus) -> Self {
		Self {
			state_machine,
			event_bus,
		}
	}

	/// Event that resumes `fulfillment`, or `None` if it is terminal.
	pub fn resume_event(fulfillment: &Fulfillment) -> Option<FillerEvent> {
		let fulfillment_id = fulfillment.id.clone();
		let event = match &fulfillment.status {
			FulfillmentStatus::Received => {
				FillerEvent::Intake(IntakeEvent::Received { fulfillment_id })
			},
			FulfillmentStatus::Validated => {
				FillerEvent::Intake(IntakeEvent::Validated { fulfillment_id })
			},
			FulfillmentStatus::Deployed => FillerEvent::Escrow(EscrowEvent::Deployed {
				fulfillment_id,
				source_escrow: fulfillment.source_escrow,
				destination_escrow: fulfillment.destination_escrow,
			}),
			FulfillmentStatus::Funded => FillerEvent::Escrow(EscrowEvent::Funded { fulfillment_id }),
			FulfillmentStatus::Filled if fulfillment.proof.is_some() => {
				FillerEvent::Settlement(SettlementEvent::ProofReady { fulfillment_id })
			},
			FulfillmentStatus::Filled => FillerEvent::Escrow(EscrowEvent::Filled { fulfillment_id }),
			FulfillmentStatus::Finalized | FulfillmentStatus::Failed(_) => return None,
		};
		Some(event)
	}

	/// Publishes the resume event of every non-terminal fulfillment. Runs at
	/// startup and again whenever the engine's event receiver lags.
	#[instrument(skip_all)]
	pub async fn recover(&self) -> Result<RecoveryReport, FillerError> {
		let active = self.state_machine.load_active().await?;
		let mut report = RecoveryReport {
			total: active.len(),
			..Default::default()
		};

		for fulfillment in &active {
			let Some(event) = Self::resume_event(fulfillment) else {
				continue;
			};
			tracing::info!(
				fulfillment_id = %truncate_id(&fulfillment.id),
				status = %fulfillment.status,
				"Resuming fulfillment"
			);
			if self.event_bus.publish(event).is_ok() {
				report.resumed += 1;
			}
		}
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{sample_fulfillment, Devnet};
	use intent_storage::implementations::memory::MemoryStorage;
	use intent_storage::StorageService;
	use intent_types::{Bytes, ProofTriple, B256};
	use std::time::Duration;

	#[test]
	fn test_resume_event_per_status() {
		let mut fulfillment = sample_fulfillment();

		fulfillment.status = FulfillmentStatus::Funded;
		assert!(matches!(
			RecoveryService::resume_event(&fulfillment),
			Some(FillerEvent::Escrow(EscrowEvent::Funded { .. }))
		));

		fulfillment.status = FulfillmentStatus::Filled;
		assert!(matches!(
			RecoveryService::resume_event(&fulfillment),
			Some(FillerEvent::Escrow(EscrowEvent::Filled { .. }))
		));

		fulfillment.proof = Some(ProofTriple {
			program_vkey: B256::ZERO,
			public_values: Bytes::new(),
			proof_bytes: Bytes::new(),
		});
		assert!(matches!(
			RecoveryService::resume_event(&fulfillment),
			Some(FillerEvent::Settlement(SettlementEvent::ProofReady { .. }))
		));

		fulfillment.status = FulfillmentStatus::Failed("gone".into());
		assert!(RecoveryService::resume_event(&fulfillment).is_none());
	}

	#[tokio::test]
	async fn test_recover_republishes_active_only() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let state = Arc::new(FulfillmentStateMachine::new(storage));
		let bus = EventBus::new(16);
		let mut events = bus.subscribe();

		let active = sample_fulfillment();
		let mut done = sample_fulfillment();
		done.id = "0xdone".into();
		done.status = FulfillmentStatus::Finalized;
		state.store(&active).await.unwrap();
		state.store(&done).await.unwrap();

		let report = RecoveryService::new(state, bus).recover().await.unwrap();
		assert_eq!(report, RecoveryReport { total: 1, resumed: 1 });
		assert!(matches!(
			events.recv().await.unwrap(),
			FillerEvent::Intake(IntakeEvent::Received { fulfillment_id }) if fulfillment_id == active.id
		));
	}

	#[tokio::test]
	async fn test_restart_resumes_from_stored_progress() {
		let net = Devnet::new().await;
		let first = net.engine().await;
		let id = first.intake().handle(net.intake(&net.order()).await).await.unwrap();
		first.intake().validate(&id).await.unwrap();
		first.escrows().deploy(&id).await.unwrap();
		first.escrows().fund(&id).await.unwrap();

		// a second engine over the same storage picks up at the fill
		let second = net.engine_with_storage(first.storage().clone()).await;
		let runner = second.clone();
		let handle = tokio::spawn(async move { runner.run().await });

		let settled = second
			.wait_until_settled(&id, Duration::from_secs(10))
			.await
			.unwrap();
		assert_eq!(settled.status, FulfillmentStatus::Finalized);

		second.stop();
		handle.await.unwrap().unwrap();
	}
}
