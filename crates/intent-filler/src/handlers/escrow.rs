//! Escrow handler.
//!
//! Runs the three ledger writes that lock and pay out an order: deploying
//! both escrows, funding the source escrow with the user's permit, and
//! paying the beneficiary from the filler's balance on the destination
//! chain.

use crate::engine::event_bus::EventBus;
use crate::handlers::intake::deployable_order;
use crate::handlers::Factories;
use crate::retry::{classify, FulfillmentStep, Recovery, RetryPolicy};
use crate::state::FulfillmentStateMachine;
use crate::FillerError;
use alloy_primitives::{Address, B256, U256};
use intent_escrow::{Escrow, EscrowFactory};
use intent_types::{
	split_signature, truncate_id, EscrowEvent, FillerEvent, Fulfillment, FulfillmentStatus, Order,
};
use std::sync::Arc;
use tracing::instrument;

/// Deploys, funds and fills the escrows of validated fulfillments.
pub struct EscrowHandler {
	factories: Factories,
	state_machine: Arc<FulfillmentStateMachine>,
	event_bus: EventBus,
	filler_address: Address,
	salt: B256,
	retry: RetryPolicy,
}

impl EscrowHandler {
	pub fn new(
		factories: Factories,
		state_machine: Arc<FulfillmentStateMachine>,
		event_bus: EventBus,
		filler_address: Address,
		salt: B256,
		retry: RetryPolicy,
	) -> Self {
		Self {
			factories,
			state_machine,
			event_bus,
			filler_address,
			salt,
			retry,
		}
	}

	fn factory(&self, chain_id: u64, step: FulfillmentStep) -> Result<&EscrowFactory, FillerError> {
		self.factories
			.get(&chain_id)
			.ok_or_else(|| step.failed(format!("Chain {} not configured", chain_id)))
	}

	/// Loads the fulfillment if it is still at `expected`, else `None`.
	async fn load_at(
		&self,
		fulfillment_id: &str,
		expected: FulfillmentStatus,
	) -> Result<Option<Fulfillment>, FillerError> {
		let fulfillment = self.state_machine.get(fulfillment_id).await?;
		if fulfillment.status == expected {
			Ok(Some(fulfillment))
		} else {
			tracing::debug!(status = %fulfillment.status, expected = %expected, "Stale event, skipping");
			Ok(None)
		}
	}

	/// Deploys the source and destination escrows.
	#[instrument(skip_all, fields(order_id = %truncate_id(fulfillment_id)))]
	pub async fn deploy(&self, fulfillment_id: &str) -> Result<(), FillerError> {
		let Some(fulfillment) = self.load_at(fulfillment_id, FulfillmentStatus::Validated).await? else {
			return Ok(());
		};

		let source = self.factory(fulfillment.source_chain_id, FulfillmentStep::Deploy)?;
		let destination = self.factory(fulfillment.destination_chain_id, FulfillmentStep::Deploy)?;
		let order = deployable_order(&fulfillment.order);
		let source_escrow = self
			.deploy_on(source, &order, fulfillment.source_escrow)
			.await?;
		self.deploy_on(destination, &order, fulfillment.destination_escrow)
			.await?;

		let order_id = source_escrow.order_id().await?;
		if order_id != fulfillment.order_id {
			tracing::warn!(
				expected = %truncate_id(&fulfillment.order_id.to_string()),
				actual = %truncate_id(&order_id.to_string()),
				"Escrow reports a different order id"
			);
		}
		self.state_machine
			.update_with(fulfillment_id, |f| f.order_id = order_id)
			.await?;
		self.state_machine
			.transition(fulfillment_id, FulfillmentStatus::Deployed)
			.await?;

		tracing::info!(
			source_escrow = %fulfillment.source_escrow,
			destination_escrow = %fulfillment.destination_escrow,
			"Escrows deployed"
		);
		self.event_bus
			.publish(FillerEvent::Escrow(EscrowEvent::Deployed {
				fulfillment_id: fulfillment_id.to_string(),
				source_escrow: fulfillment.source_escrow,
				destination_escrow: fulfillment.destination_escrow,
			}))
			.ok();
		Ok(())
	}

	/// Creates the escrow at `expected` unless this filler already did.
	async fn deploy_on(
		&self,
		factory: &EscrowFactory,
		order: &Order,
		expected: Address,
	) -> Result<Escrow, FillerError> {
		let step = FulfillmentStep::Deploy;
		let chain_id = factory.chain().chain_id();
		let mut attempt = 0;
		loop {
			attempt += 1;

			if let Ok(existing) = factory.escrow(expected).await {
				let bound = existing.bridge_data().await?.filler;
				if bound == self.filler_address {
					tracing::debug!(chain_id, escrow = %expected, "Escrow already deployed");
					return Ok(existing);
				}
				return Err(step.failed(format!(
					"Escrow {} on chain {} is bound to filler {}",
					expected, chain_id, bound
				)));
			}

			match factory.create_intent(self.filler_address, order, self.salt).await {
				Ok(escrow) if escrow.address() == expected => return Ok(escrow),
				Ok(escrow) => {
					return Err(step.failed(format!(
						"Escrow deployed at {} instead of {}",
						escrow.address(),
						expected
					)))
				},
				Err(e) => {
					let reason = e.to_string();
					if classify(&e) == Recovery::Fatal {
						return Err(step.failed(reason));
					}
					self.retry.backoff(step, attempt, &reason).await?;
				},
			}
		}
	}

	/// Applies the user's permit so the source escrow pulls the funds in.
	#[instrument(skip_all, fields(order_id = %truncate_id(fulfillment_id)))]
	pub async fn fund(&self, fulfillment_id: &str) -> Result<(), FillerError> {
		let Some(fulfillment) = self.load_at(fulfillment_id, FulfillmentStatus::Deployed).await? else {
			return Ok(());
		};
		let step = FulfillmentStep::Fund;

		let escrow = self
			.factory(fulfillment.source_chain_id, step)?
			.escrow(fulfillment.source_escrow)
			.await?;
		let (v, r, s) =
			split_signature(&fulfillment.permit_signature).map_err(|e| step.failed(e.to_string()))?;

		let mut order_id = fulfillment.order_id;
		let mut attempt = 0;
		loop {
			attempt += 1;
			let Err(e) = escrow.submit_permit(order_id, v, r, s).await else {
				break;
			};

			let reason = e.to_string();
			match classify(&e) {
				Recovery::RefreshOrderId => {
					order_id = escrow.order_id().await?;
					tracing::warn!(order_id = %truncate_id(&order_id.to_string()), "Refreshed order id");
					self.state_machine
						.update_with(fulfillment_id, |f| f.order_id = order_id)
						.await?;
				},
				Recovery::AlreadyApplied => {
					if escrow.funded().await? {
						tracing::info!("Escrow already funded");
						break;
					}
				},
				Recovery::Fatal => return Err(step.failed(reason)),
				_ => {},
			}
			self.retry.backoff(step, attempt, &reason).await?;
		}

		self.state_machine
			.transition(fulfillment_id, FulfillmentStatus::Funded)
			.await?;
		tracing::info!(escrow = %fulfillment.source_escrow, "Escrow funded");
		self.event_bus
			.publish(FillerEvent::Escrow(EscrowEvent::Funded {
				fulfillment_id: fulfillment_id.to_string(),
			}))
			.ok();
		Ok(())
	}

	/// Pays the beneficiary on the destination chain.
	#[instrument(skip_all, fields(order_id = %truncate_id(fulfillment_id)))]
	pub async fn fill(&self, fulfillment_id: &str) -> Result<(), FillerError> {
		let Some(fulfillment) = self.load_at(fulfillment_id, FulfillmentStatus::Funded).await? else {
			return Ok(());
		};
		let step = FulfillmentStep::Fill;

		let factory = self.factory(fulfillment.destination_chain_id, step)?;
		let escrow = factory.escrow(fulfillment.destination_escrow).await?;
		let transfer = escrow.bridge_data().await?;
		let (fee, _) = factory.get_fee_info(&transfer.destination_token).await?;
		let payout = transfer
			.payout(fee)
			.ok_or_else(|| step.failed(format!("Fee numerator {} out of range", fee)))?;

		let mut order_id = fulfillment.order_id;
		let mut attempt = 0;
		let paid = loop {
			attempt += 1;
			let result = self
				.approve_and_fill(&escrow, transfer.destination_token, payout, order_id)
				.await;
			let e = match result {
				Ok(paid) => break paid,
				Err(e) => e,
			};

			let reason = e.to_string();
			match classify(&e) {
				Recovery::RefreshOrderId => {
					order_id = escrow.order_id().await?;
					tracing::warn!(order_id = %truncate_id(&order_id.to_string()), "Refreshed order id");
				},
				Recovery::AlreadyApplied => {
					if escrow.destination_fulfilled().await? {
						tracing::info!("Destination already fulfilled");
						break U256::ZERO;
					}
				},
				Recovery::Fatal => return Err(step.failed(reason)),
				_ => {},
			}
			self.retry.backoff(step, attempt, &reason).await?;
		};

		self.state_machine
			.transition(fulfillment_id, FulfillmentStatus::Filled)
			.await?;
		tracing::info!(
			escrow = %fulfillment.destination_escrow,
			beneficiary = %transfer.beneficiary,
			paid = %paid,
			"Order filled"
		);
		self.event_bus
			.publish(FillerEvent::Escrow(EscrowEvent::Filled {
				fulfillment_id: fulfillment_id.to_string(),
			}))
			.ok();
		Ok(())
	}

	async fn approve_and_fill(
		&self,
		escrow: &Escrow,
		token: Address,
		payout: U256,
		order_id: B256,
	) -> Result<U256, intent_escrow::EscrowError> {
		escrow
			.chain()
			.approve(token, self.filler_address, escrow.address(), payout)
			.await?;
		escrow.fill(self.filler_address, order_id, &[], &[]).await
	}
}
