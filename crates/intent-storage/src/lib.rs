//! Storage module for the intent filler.
//!
//! Filler progress is kept as JSON values under `<namespace>:<id>` keys so that
//! an interrupted fulfillment can be resumed. Backends only deal in raw bytes;
//! [`StorageService`] adds typed access on top.

use async_trait::async_trait;
use intent_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Byte-level key-value backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores `value`, replacing any previous value under `key`.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes `key`. Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every stored key starting with `prefix`, in ascending order.
	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Returns `(name, factory)` for every storage backend.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed storage over a byte backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Serializes `data` to JSON and stores it, creating or overwriting.
	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&namespace.key(id), bytes).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&namespace.key(id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Overwrites an existing value. Fails with `NotFound` if nothing is
	/// stored under the key yet.
	pub async fn update<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = namespace.key(id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	pub async fn remove(&self, namespace: StorageKey, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&namespace.key(id)).await
	}

	pub async fn exists(&self, namespace: StorageKey, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&namespace.key(id)).await
	}

	/// Loads every value in `namespace`.
	///
	/// Entries that no longer deserialize are skipped with a warning, so one
	/// corrupt record cannot block the rest from loading.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = namespace.prefix();
		let mut out = Vec::new();

		for key in self.backend.keys_with_prefix(&prefix).await? {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			match serde_json::from_slice::<T>(&bytes) {
				Ok(value) => {
					let id = key[prefix.len()..].to_string();
					out.push((id, value));
				},
				Err(e) => {
					tracing::warn!(key = %key, error = %e, "Skipping undecodable record");
				},
			}
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Record {
		step: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_store_and_retrieve() {
		let storage = service();
		storage
			.store(StorageKey::Fulfillments, "0xabc", &Record { step: 2 })
			.await
			.unwrap();

		let record: Record = storage.retrieve(StorageKey::Fulfillments, "0xabc").await.unwrap();
		assert_eq!(record, Record { step: 2 });
		assert!(!storage.exists(StorageKey::Intakes, "0xabc").await.unwrap());
	}

	#[tokio::test]
	async fn test_update_requires_existing_key() {
		let storage = service();
		let err = storage
			.update(StorageKey::Fulfillments, "0xabc", &Record { step: 1 })
			.await
			.unwrap_err();
		assert!(matches!(err, StorageError::NotFound));

		storage
			.store(StorageKey::Fulfillments, "0xabc", &Record { step: 1 })
			.await
			.unwrap();
		storage
			.update(StorageKey::Fulfillments, "0xabc", &Record { step: 3 })
			.await
			.unwrap();
		let record: Record = storage.retrieve(StorageKey::Fulfillments, "0xabc").await.unwrap();
		assert_eq!(record.step, 3);
	}

	#[tokio::test]
	async fn test_retrieve_all_is_scoped_to_namespace() {
		let storage = service();
		storage
			.store(StorageKey::Fulfillments, "0x01", &Record { step: 1 })
			.await
			.unwrap();
		storage
			.store(StorageKey::Fulfillments, "0x02", &Record { step: 2 })
			.await
			.unwrap();
		storage
			.store(StorageKey::Intakes, "0x03", &Record { step: 3 })
			.await
			.unwrap();

		let all: Vec<(String, Record)> =
			storage.retrieve_all(StorageKey::Fulfillments).await.unwrap();
		let ids: Vec<_> = all.iter().map(|(id, _)| id.as_str()).collect();
		assert_eq!(ids, vec!["0x01", "0x02"]);
	}

	#[tokio::test]
	async fn test_retrieve_all_skips_corrupt_entries() {
		let backend = MemoryStorage::new();
		backend
			.set_bytes("fulfillments:0xbad", b"not json".to_vec())
			.await
			.unwrap();
		let storage = StorageService::new(Box::new(backend));
		storage
			.store(StorageKey::Fulfillments, "0xgood", &Record { step: 4 })
			.await
			.unwrap();

		let all: Vec<(String, Record)> =
			storage.retrieve_all(StorageKey::Fulfillments).await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].0, "0xgood");
	}
}
