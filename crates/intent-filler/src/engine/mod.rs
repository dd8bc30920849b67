//! Core filler engine.
//!
//! The engine owns the services a fulfillment needs and routes events from
//! the bus to the handler responsible for the next step. Handlers run as
//! separate tasks, bounded by a semaphore sized from `max_concurrent`.

pub mod event_bus;
pub mod lifecycle;

use crate::handlers::{EscrowHandler, Factories, IntakeHandler, SettlementHandler};
use crate::monitoring::ProofMonitor;
use crate::proof::ProofService;
use crate::recovery::RecoveryService;
use crate::retry::{FulfillmentStep, RetryPolicy};
use crate::state::{FulfillmentStateMachine, StateError};
use crate::FillerError;
use alloy_primitives::Address;
use intent_account::AccountService;
use intent_config::Config;
use intent_escrow::ChainRegistry;
use intent_storage::StorageService;
use intent_types::{
	truncate_id, EscrowEvent, FillerEvent, Fulfillment, FulfillmentStatus, IntakeEvent,
	IntakePayload, SettlementEvent,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, Notify, Semaphore};

/// Capacity of the engine's event bus.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Drives fulfillments from intake to settlement.
///
/// Cloning is cheap and every clone shares the same storage, bus and
/// handlers, which is how spawned handler tasks reach the engine.
#[derive(Clone)]
pub struct FillerEngine {
	config: Arc<Config>,
	storage: Arc<StorageService>,
	account: Arc<AccountService>,
	filler_address: Address,
	chains: ChainRegistry,
	event_bus: event_bus::EventBus,
	state_machine: Arc<FulfillmentStateMachine>,
	intake_handler: Arc<IntakeHandler>,
	escrow_handler: Arc<EscrowHandler>,
	settlement_handler: Arc<SettlementHandler>,
	shutdown: Arc<Notify>,
}

impl FillerEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		account: Arc<AccountService>,
		filler_address: Address,
		chains: ChainRegistry,
		factories: Factories,
		proofs: Arc<ProofService>,
	) -> Self {
		let config = Arc::new(config);
		let event_bus = event_bus::EventBus::new(EVENT_BUS_CAPACITY);
		let state_machine = Arc::new(FulfillmentStateMachine::new(storage.clone()));
		let retry = RetryPolicy::from_config(&config.filler);

		let intake_handler = Arc::new(IntakeHandler::new(
			config.clone(),
			factories.clone(),
			chains.clone(),
			storage.clone(),
			state_machine.clone(),
			event_bus.clone(),
			filler_address,
		));
		let escrow_handler = Arc::new(EscrowHandler::new(
			factories.clone(),
			state_machine.clone(),
			event_bus.clone(),
			filler_address,
			config.filler.salt,
			retry,
		));
		let monitor = ProofMonitor::new(
			proofs.clone(),
			chains.clone(),
			Duration::from_millis(config.filler.proof_poll_interval_ms),
			Duration::from_secs(config.filler.proof_timeout_seconds),
		);
		let settlement_handler = Arc::new(SettlementHandler::new(
			factories,
			chains.clone(),
			proofs,
			monitor,
			state_machine.clone(),
			event_bus.clone(),
			retry,
		));
		Self {
			config,
			storage,
			account,
			filler_address,
			chains,
			event_bus,
			state_machine,
			intake_handler,
			escrow_handler,
			settlement_handler,
			shutdown: Arc::new(Notify::new()),
		}
	}

	/// Records an intake payload. Processing continues on the event loop.
	pub async fn process_intake(&self, payload: IntakePayload) -> Result<String, FillerError> {
		self.intake_handler.handle(payload).await
	}

	/// Main execution loop. Returns after [`stop`](Self::stop) or Ctrl-C.
	pub async fn run(&self) -> Result<(), FillerError> {
		// Subscribe before recovery so replayed events are seen.
		let mut event_receiver = self.event_bus.subscribe();
		self.initialize().await?;

		let semaphore = Arc::new(Semaphore::new(self.config.filler.max_concurrent));

		loop {
			tokio::select! {
				event = event_receiver.recv() => match event {
					Ok(event) => self.dispatch(&semaphore, event),
					Err(RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "Event bus lagged, rescanning stored fulfillments");
						self.resync().await;
					},
					Err(RecvError::Closed) => break,
				},

				_ = self.shutdown.notified() => {
					break;
				}

				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Interrupt received");
					break;
				}
			}
		}

		self.shutdown().await
	}

	/// Asks the [`run`](Self::run) loop to exit, now or as soon as it starts.
	pub fn stop(&self) {
		self.shutdown.notify_one();
	}

	/// Republishes the next step of every active fulfillment.
	///
	/// Handlers skip events for a status the record has already left, so
	/// fulfillments whose events did arrive are not run twice.
	async fn resync(&self) {
		let recovery = RecoveryService::new(self.state_machine.clone(), self.event_bus.clone());
		match recovery.recover().await {
			Ok(report) => tracing::info!(
				total = report.total,
				resumed = report.resumed,
				"Rescanned after lag"
			),
			Err(e) => tracing::error!(error = %e, "Rescan after lag failed"),
		}
	}

	fn dispatch(&self, semaphore: &Arc<Semaphore>, event: FillerEvent) {
		match event {
			FillerEvent::Intake(IntakeEvent::Received { fulfillment_id }) => {
				self.spawn_handler(
					semaphore,
					FulfillmentStep::Validate,
					fulfillment_id,
					|engine, id| async move { engine.intake_handler.validate(&id).await },
				);
			},
			FillerEvent::Intake(IntakeEvent::Validated { fulfillment_id }) => {
				self.spawn_handler(
					semaphore,
					FulfillmentStep::Deploy,
					fulfillment_id,
					|engine, id| async move { engine.escrow_handler.deploy(&id).await },
				);
			},
			FillerEvent::Escrow(EscrowEvent::Deployed { fulfillment_id, .. }) => {
				self.spawn_handler(
					semaphore,
					FulfillmentStep::Fund,
					fulfillment_id,
					|engine, id| async move { engine.escrow_handler.fund(&id).await },
				);
			},
			FillerEvent::Escrow(EscrowEvent::Funded { fulfillment_id }) => {
				self.spawn_handler(
					semaphore,
					FulfillmentStep::Fill,
					fulfillment_id,
					|engine, id| async move { engine.escrow_handler.fill(&id).await },
				);
			},
			FillerEvent::Escrow(EscrowEvent::Filled { fulfillment_id }) => {
				self.spawn_handler(
					semaphore,
					FulfillmentStep::Proof,
					fulfillment_id,
					|engine, id| async move { engine.settlement_handler.await_proof(&id).await },
				);
			},
			FillerEvent::Settlement(SettlementEvent::ProofReady { fulfillment_id }) => {
				self.spawn_handler(
					semaphore,
					FulfillmentStep::Finalize,
					fulfillment_id,
					|engine, id| async move { engine.settlement_handler.finalize(&id).await },
				);
			},
			FillerEvent::Intake(IntakeEvent::Rejected { .. })
			| FillerEvent::Settlement(SettlementEvent::Finalized { .. })
			| FillerEvent::Settlement(SettlementEvent::Failed { .. }) => {},
		}
	}

	/// Spawns `handler` for one fulfillment.
	///
	/// The task waits for a semaphore permit itself, so a full pool never
	/// holds up the event loop or shutdown.
	fn spawn_handler<F, Fut>(
		&self,
		semaphore: &Arc<Semaphore>,
		step: FulfillmentStep,
		fulfillment_id: String,
		handler: F,
	) where
		F: FnOnce(FillerEngine, String) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), FillerError>> + Send + 'static,
	{
		let engine = self.clone();
		let semaphore = semaphore.clone();
		tokio::spawn(async move {
			let _permit = match semaphore.acquire_owned().await {
				Ok(permit) => permit,
				Err(e) => {
					tracing::error!("Failed to acquire semaphore permit: {}", e);
					return;
				},
			};
			if let Err(e) = handler(engine.clone(), fulfillment_id.clone()).await {
				engine.handle_failure(&fulfillment_id, step, e).await;
			}
		});
	}

	/// Marks a fulfillment failed after a handler error in `step`.
	///
	/// Rejected intakes are already recorded by the intake handler, and a
	/// lost transition race leaves the record to the run that won. Every
	/// other error ends the fulfillment, using the step the error names if
	/// it has one.
	async fn handle_failure(&self, fulfillment_id: &str, step: FulfillmentStep, error: FillerError) {
		let (step, reason) = match error {
			FillerError::StepFailed { step, reason } => (step, reason),
			FillerError::Validation(_) => return,
			// a concurrent run of the same step moved the record first
			FillerError::State(StateError::InvalidTransition { from, to }) => {
				tracing::debug!(
					fulfillment_id = %truncate_id(fulfillment_id),
					step = %step,
					from = %from,
					to = %to,
					"Step already advanced elsewhere"
				);
				return;
			},
			other => (step, other.to_string()),
		};

		tracing::error!(
			fulfillment_id = %truncate_id(fulfillment_id),
			step = %step,
			reason = %reason,
			"Fulfillment failed"
		);
		if let Err(e) = self
			.state_machine
			.transition(fulfillment_id, FulfillmentStatus::Failed(reason.clone()))
			.await
		{
			tracing::error!(error = %e, "Failed to record failure");
		}
		self.event_bus
			.publish(FillerEvent::Settlement(SettlementEvent::Failed {
				fulfillment_id: fulfillment_id.to_string(),
				step: step.as_str().to_string(),
				reason,
			}))
			.ok();
	}

	/// Polls the stored record until it reaches a terminal status.
	pub async fn wait_until_settled(
		&self,
		fulfillment_id: &str,
		timeout: Duration,
	) -> Result<Fulfillment, FillerError> {
		let poll = Duration::from_millis(self.config.filler.proof_poll_interval_ms.max(1));
		tokio::time::timeout(timeout, async {
			loop {
				let fulfillment = self.state_machine.get(fulfillment_id).await?;
				if fulfillment.status.is_terminal() {
					return Ok::<_, FillerError>(fulfillment);
				}
				tokio::time::sleep(poll).await;
			}
		})
		.await
		.map_err(|_| {
			FillerError::Timeout(format!(
				"Fulfillment {} not settled within {}s",
				truncate_id(fulfillment_id),
				timeout.as_secs()
			))
		})?
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn account(&self) -> &Arc<AccountService> {
		&self.account
	}

	pub fn filler_address(&self) -> Address {
		self.filler_address
	}

	pub fn chains(&self) -> &ChainRegistry {
		&self.chains
	}

	/// Fulfillment records and their lifecycle.
	pub fn state(&self) -> &Arc<FulfillmentStateMachine> {
		&self.state_machine
	}

	pub fn intake(&self) -> &IntakeHandler {
		&self.intake_handler
	}

	pub fn escrows(&self) -> &EscrowHandler {
		&self.escrow_handler
	}

	pub fn settlement(&self) -> &SettlementHandler {
		&self.settlement_handler
	}
}
