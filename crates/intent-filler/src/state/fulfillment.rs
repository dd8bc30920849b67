//! Fulfillment state machine.
//!
//! A fulfillment moves Received -> Validated -> Deployed -> Funded -> Filled
//! -> Finalized, and may drop to Failed from any non-terminal state. Every
//! change is written through to storage before the caller sees it.

use intent_storage::{StorageError, StorageService};
use intent_types::{
	current_timestamp, Fulfillment, FulfillmentStatus, FulfillmentStatusKind, StorageKey,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors from the fulfillment state machine.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from:?} to {to:?}")]
	InvalidTransition {
		from: FulfillmentStatus,
		to: FulfillmentStatus,
	},
	#[error("Fulfillment not found: {0}")]
	NotFound(String),
}

fn storage_error(id: &str, error: StorageError) -> StateError {
	match error {
		StorageError::NotFound => StateError::NotFound(id.to_string()),
		other => StateError::Storage(other.to_string()),
	}
}

static TRANSITIONS: Lazy<HashMap<FulfillmentStatusKind, HashSet<FulfillmentStatusKind>>> =
	Lazy::new(|| {
		use FulfillmentStatusKind::*;

		let mut m = HashMap::new();
		m.insert(Received, HashSet::from([Validated, Failed]));
		m.insert(Validated, HashSet::from([Deployed, Failed]));
		m.insert(Deployed, HashSet::from([Funded, Failed]));
		m.insert(Funded, HashSet::from([Filled, Failed]));
		m.insert(Filled, HashSet::from([Finalized, Failed]));
		m.insert(Finalized, HashSet::new());
		m.insert(Failed, HashSet::new());
		m
	});

/// Manages fulfillment records and their status transitions.
pub struct FulfillmentStateMachine {
	storage: Arc<StorageService>,
}

impl FulfillmentStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Whether the lifecycle allows moving from `from` to `to`. Terminal
	/// statuses allow nothing.
	pub fn is_valid_transition(from: &FulfillmentStatus, to: &FulfillmentStatus) -> bool {
		TRANSITIONS
			.get(&from.kind())
			.is_some_and(|allowed| allowed.contains(&to.kind()))
	}

	/// Applies `updater` to the stored record and persists the result.
	pub async fn update_with<F>(&self, id: &str, updater: F) -> Result<Fulfillment, StateError>
	where
		F: FnOnce(&mut Fulfillment),
	{
		let mut fulfillment = self.get(id).await?;
		updater(&mut fulfillment);
		fulfillment.updated_at = current_timestamp();

		self.storage
			.update(StorageKey::Fulfillments, id, &fulfillment)
			.await
			.map_err(|e| storage_error(id, e))?;
		Ok(fulfillment)
	}

	/// Moves a fulfillment to `status`, rejecting transitions the lifecycle
	/// does not allow.
	pub async fn transition(
		&self,
		id: &str,
		status: FulfillmentStatus,
	) -> Result<Fulfillment, StateError> {
		let current = self.get(id).await?;
		if !Self::is_valid_transition(&current.status, &status) {
			return Err(StateError::InvalidTransition {
				from: current.status,
				to: status,
			});
		}

		self.update_with(id, |f| {
			if let FulfillmentStatus::Failed(reason) = &status {
				f.last_error = Some(reason.clone());
			}
			f.status = status;
		})
		.await
	}

	pub async fn get(&self, id: &str) -> Result<Fulfillment, StateError> {
		self.storage
			.retrieve(StorageKey::Fulfillments, id)
			.await
			.map_err(|e| storage_error(id, e))
	}

	pub async fn exists(&self, id: &str) -> Result<bool, StateError> {
		self.storage
			.exists(StorageKey::Fulfillments, id)
			.await
			.map_err(|e| storage_error(id, e))
	}

	/// Creates or replaces a record.
	pub async fn store(&self, fulfillment: &Fulfillment) -> Result<(), StateError> {
		self.storage
			.store(StorageKey::Fulfillments, &fulfillment.id, fulfillment)
			.await
			.map_err(|e| storage_error(&fulfillment.id, e))
	}

	/// Every stored fulfillment that has not reached a terminal status.
	pub async fn load_active(&self) -> Result<Vec<Fulfillment>, StateError> {
		let all: Vec<(String, Fulfillment)> = self
			.storage
			.retrieve_all(StorageKey::Fulfillments)
			.await
			.map_err(|e| StateError::Storage(e.to_string()))?;

		Ok(all
			.into_iter()
			.map(|(_, f)| f)
			.filter(|f| !f.status.is_terminal())
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::sample_fulfillment;
	use intent_storage::implementations::memory::MemoryStorage;

	fn machine() -> FulfillmentStateMachine {
		FulfillmentStateMachine::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[test]
	fn test_transition_table() {
		use FulfillmentStatus::*;

		assert!(FulfillmentStateMachine::is_valid_transition(&Received, &Validated));
		assert!(FulfillmentStateMachine::is_valid_transition(&Filled, &Finalized));
		assert!(FulfillmentStateMachine::is_valid_transition(
			&Funded,
			&Failed("x".into())
		));
		assert!(!FulfillmentStateMachine::is_valid_transition(&Received, &Funded));
		assert!(!FulfillmentStateMachine::is_valid_transition(&Filled, &Funded));
		assert!(!FulfillmentStateMachine::is_valid_transition(
			&Finalized,
			&Failed("x".into())
		));
		assert!(!FulfillmentStateMachine::is_valid_transition(
			&Failed("x".into()),
			&Received
		));
	}

	#[tokio::test]
	async fn test_transition_persists_status() {
		let machine = machine();
		let fulfillment = sample_fulfillment();
		machine.store(&fulfillment).await.unwrap();

		machine
			.transition(&fulfillment.id, FulfillmentStatus::Validated)
			.await
			.unwrap();
		assert_eq!(
			machine.get(&fulfillment.id).await.unwrap().status,
			FulfillmentStatus::Validated
		);
	}

	#[tokio::test]
	async fn test_invalid_transition_leaves_record_untouched() {
		let machine = machine();
		let fulfillment = sample_fulfillment();
		machine.store(&fulfillment).await.unwrap();

		let err = machine
			.transition(&fulfillment.id, FulfillmentStatus::Filled)
			.await
			.unwrap_err();
		assert!(matches!(err, StateError::InvalidTransition { .. }));
		assert_eq!(
			machine.get(&fulfillment.id).await.unwrap().status,
			FulfillmentStatus::Received
		);
	}

	#[tokio::test]
	async fn test_failure_records_reason() {
		let machine = machine();
		let fulfillment = sample_fulfillment();
		machine.store(&fulfillment).await.unwrap();

		let failed = machine
			.transition(&fulfillment.id, FulfillmentStatus::Failed("expired".into()))
			.await
			.unwrap();
		assert_eq!(failed.last_error.as_deref(), Some("expired"));
	}

	#[tokio::test]
	async fn test_missing_record_is_not_found() {
		let err = machine().get("0xdead").await.unwrap_err();
		assert!(matches!(err, StateError::NotFound(id) if id == "0xdead"));
	}

	#[tokio::test]
	async fn test_load_active_skips_terminal() {
		let machine = machine();
		let active = sample_fulfillment();
		let mut done = sample_fulfillment();
		done.id = "0xdone".into();
		done.status = FulfillmentStatus::Finalized;
		machine.store(&active).await.unwrap();
		machine.store(&done).await.unwrap();

		let loaded = machine.load_active().await.unwrap();
		assert_eq!(loaded.len(), 1);
		assert_eq!(loaded[0].id, active.id);
	}
}
