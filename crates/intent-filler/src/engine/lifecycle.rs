//! Startup and shutdown of the filler engine.

use super::FillerEngine;
use crate::recovery::RecoveryService;
use crate::FillerError;

impl FillerEngine {
	/// Resumes every fulfillment left unfinished by a previous run.
	pub async fn initialize(&self) -> Result<(), FillerError> {
		tracing::info!(
			filler = %self.filler_address,
			chains = ?self.chains.chain_ids(),
			"Initializing filler engine"
		);

		let recovery = RecoveryService::new(self.state_machine.clone(), self.event_bus.clone());
		let report = recovery.recover().await?;
		if report.total > 0 {
			tracing::info!(
				total = report.total,
				resumed = report.resumed,
				"Recovered unfinished fulfillments"
			);
		}
		Ok(())
	}

	/// Runs once the event loop has exited. In-flight handler tasks are left
	/// to finish on their own.
	pub async fn shutdown(&self) -> Result<(), FillerError> {
		tracing::info!("Shutting down filler engine");
		Ok(())
	}
}
