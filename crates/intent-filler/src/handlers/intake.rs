//! Intake handler.
//!
//! Turns a user's signed payload into a stored fulfillment and checks it
//! before any ledger write: signatures, chains, the permit's terms and the
//! open deadline.

use crate::engine::event_bus::EventBus;
use crate::handlers::Factories;
use crate::state::FulfillmentStateMachine;
use crate::FillerError;
use alloy_primitives::{Address, B256, U256};
use intent_config::Config;
use intent_escrow::{intent_address, ChainRegistry, CodeKind};
use intent_storage::StorageService;
use intent_types::{
	bridge_transfer, current_timestamp, order_id, truncate_id, verify_intake, with_filler,
	with_intent_address, BridgeLayout, FillerEvent, Fulfillment, FulfillmentStatus,
	IntakeEvent, IntakePayload, Order, StorageKey,
};
use std::sync::Arc;
use tracing::instrument;

/// Identifier an escrow at `escrow` will expect once `filler` deployed it.
pub fn expected_order_id(
	order: &Order,
	escrow: Address,
	filler: Address,
	layout: BridgeLayout,
) -> Result<B256, FillerError> {
	let bound = with_filler(&with_intent_address(order, escrow), filler, layout)
		.map_err(|e| FillerError::Validation(e.to_string()))?;
	Ok(order_id(&bound))
}

/// Form of `order` the factory accepts for `createIntent`.
///
/// Users may sign with `intentAddress` already set to the source escrow;
/// the factory only deploys orders where it is still zero.
pub fn deployable_order(order: &Order) -> Order {
	with_intent_address(order, Address::ZERO)
}

/// Validates signed intakes and records them as fulfillments.
pub struct IntakeHandler {
	config: Arc<Config>,
	factories: Factories,
	chains: ChainRegistry,
	storage: Arc<StorageService>,
	state_machine: Arc<FulfillmentStateMachine>,
	event_bus: EventBus,
	filler_address: Address,
}

impl IntakeHandler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: Arc<Config>,
		factories: Factories,
		chains: ChainRegistry,
		storage: Arc<StorageService>,
		state_machine: Arc<FulfillmentStateMachine>,
		event_bus: EventBus,
		filler_address: Address,
	) -> Self {
		Self {
			config,
			factories,
			chains,
			storage,
			state_machine,
			event_bus,
			filler_address,
		}
	}

	fn reject(&self, fulfillment_id: Option<String>, reason: String) -> FillerError {
		tracing::warn!(reason = %reason, "Intake rejected");
		self.event_bus
			.publish(FillerEvent::Intake(IntakeEvent::Rejected {
				fulfillment_id,
				reason: reason.clone(),
			}))
			.ok();
		FillerError::Validation(reason)
	}

	/// Records a new intake and returns its fulfillment id.
	///
	/// Submitting a payload that is already in progress or done returns the
	/// existing id without starting over. A failed fulfillment is restarted.
	pub async fn handle(&self, payload: IntakePayload) -> Result<String, FillerError> {
		let intake = payload
			.decode()
			.map_err(|e| self.reject(None, format!("Undecodable intake: {}", e)))?;
		let order = &intake.order;
		let layout = self.config.protocol.bridge_layout;

		let transfer = bridge_transfer(order, layout)
			.map_err(|e| self.reject(None, format!("Unsupported order: {}", e)))?;
		let source_chain_id = u64::try_from(order.sourceChainId)
			.map_err(|_| self.reject(None, format!("Source chain {} out of range", order.sourceChainId)))?;
		let destination_chain_id = transfer.destination_chain().ok_or_else(|| {
			self.reject(
				None,
				format!("Destination chain {} out of range", transfer.destination_chain_id),
			)
		})?;

		let source = self
			.factories
			.get(&source_chain_id)
			.ok_or_else(|| self.reject(None, format!("Source chain {} not configured", source_chain_id)))?;
		let destination = self.factories.get(&destination_chain_id).ok_or_else(|| {
			self.reject(
				None,
				format!("Destination chain {} not configured", destination_chain_id),
			)
		})?;

		let salt = self.config.filler.salt;
		let deployable = deployable_order(order);
		let source_escrow = intent_address(source.address(), &deployable, salt);
		let destination_escrow = intent_address(destination.address(), &deployable, salt);
		if order.intentAddress != Address::ZERO && order.intentAddress != source_escrow {
			return Err(self.reject(
				None,
				format!(
					"Order intent address {} is not the escrow {}",
					order.intentAddress, source_escrow
				),
			));
		}
		let id = Fulfillment::id_for(&source_escrow);

		if self.state_machine.exists(&id).await? {
			let existing = self.state_machine.get(&id).await?;
			if !matches!(existing.status, FulfillmentStatus::Failed(_)) {
				tracing::debug!(
					fulfillment_id = %truncate_id(&id),
					status = %existing.status,
					"Intake already known, skipping"
				);
				return Ok(id);
			}
			tracing::info!(fulfillment_id = %truncate_id(&id), "Restarting failed fulfillment");
		}

		let now = current_timestamp();
		let fulfillment = Fulfillment {
			id: id.clone(),
			status: FulfillmentStatus::Received,
			created_at: now,
			updated_at: now,
			order: order.clone(),
			order_signature: intake.order_signature.clone(),
			permit: intake.permit.clone(),
			permit_signature: intake.permit_signature.clone(),
			source_chain_id,
			destination_chain_id,
			source_escrow,
			destination_escrow,
			order_id: expected_order_id(order, source_escrow, self.filler_address, layout)?,
			proof: None,
			last_error: None,
		};

		self.storage
			.store(StorageKey::Intakes, &id, &payload)
			.await
			.map_err(|e| FillerError::Storage(e.to_string()))?;
		self.state_machine.store(&fulfillment).await?;

		tracing::info!(
			fulfillment_id = %truncate_id(&id),
			user = %order.user,
			source_chain_id,
			destination_chain_id,
			amount = %transfer.amount,
			"Intake received"
		);
		self.event_bus
			.publish(FillerEvent::Intake(IntakeEvent::Received {
				fulfillment_id: id.clone(),
			}))
			.ok();
		Ok(id)
	}

	/// Checks a received fulfillment and marks it validated or failed.
	#[instrument(skip_all, fields(order_id = %truncate_id(fulfillment_id)))]
	pub async fn validate(&self, fulfillment_id: &str) -> Result<(), FillerError> {
		let fulfillment = self.state_machine.get(fulfillment_id).await?;
		if fulfillment.status != FulfillmentStatus::Received {
			tracing::debug!(status = %fulfillment.status, "Already validated, skipping");
			return Ok(());
		}

		match self.check(&fulfillment).await {
			Ok(()) => {
				self.state_machine
					.transition(fulfillment_id, FulfillmentStatus::Validated)
					.await?;
				tracing::info!("Intake validated");
				self.event_bus
					.publish(FillerEvent::Intake(IntakeEvent::Validated {
						fulfillment_id: fulfillment_id.to_string(),
					}))
					.ok();
				Ok(())
			},
			Err(reason) => {
				self.state_machine
					.transition(fulfillment_id, FulfillmentStatus::Failed(reason.clone()))
					.await?;
				Err(self.reject(Some(fulfillment_id.to_string()), reason))
			},
		}
	}

	async fn check(&self, fulfillment: &Fulfillment) -> Result<(), String> {
		let order = &fulfillment.order;
		let permit = &fulfillment.permit;
		let transfer = bridge_transfer(order, self.config.protocol.bridge_layout)
			.map_err(|e| e.to_string())?;

		let source = self
			.factories
			.get(&fulfillment.source_chain_id)
			.ok_or_else(|| format!("Source chain {} not configured", fulfillment.source_chain_id))?;
		let source_chain = self
			.chains
			.get(fulfillment.source_chain_id)
			.map_err(|e| e.to_string())?;
		let destination_chain = self
			.chains
			.get(fulfillment.destination_chain_id)
			.map_err(|e| e.to_string())?;

		let domain = source_chain
			.token_domain(&transfer.source_token)
			.await
			.map_err(|e| format!("Source token unavailable: {}", e))?;
		verify_intake(
			order,
			&fulfillment.order_signature,
			permit,
			&fulfillment.permit_signature,
			source.address(),
			&domain,
		)
		.map_err(|e| e.to_string())?;

		if permit.spender != fulfillment.source_escrow {
			return Err(format!(
				"Permit spender {} is not the escrow {}",
				permit.spender, fulfillment.source_escrow
			));
		}
		if permit.value != transfer.amount {
			return Err(format!(
				"Permit value {} does not match order amount {}",
				permit.value, transfer.amount
			));
		}
		if permit.deadline != U256::from(order.fillDeadline) {
			return Err(format!(
				"Permit deadline {} does not match fill deadline {}",
				permit.deadline, order.fillDeadline
			));
		}

		let now = source_chain.now().await;
		if now > u64::from(order.openDeadline) {
			return Err(format!(
				"Open deadline {} passed (now {})",
				order.openDeadline, now
			));
		}

		if destination_chain.code_at(&transfer.destination_token).await != Some(CodeKind::Token) {
			return Err(format!(
				"Destination token {} not deployed on chain {}",
				transfer.destination_token, fulfillment.destination_chain_id
			));
		}
		Ok(())
	}
}
