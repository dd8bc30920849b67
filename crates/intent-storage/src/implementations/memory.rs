//! In-memory storage backend.
//!
//! Values live in a map behind an async read-write lock and are lost when the
//! process exits. Suitable for tests and single-run devnets.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use intent_types::{ConfigSchema, Schema, ValidationError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MemoryStorage {
	store: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(BTreeMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.range(prefix.to_string()..)
			.take_while(|(key, _)| key.starts_with(prefix))
			.map(|(key, _)| key.clone())
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Memory storage takes no options.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl intent_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_delete_missing_key_is_ok() {
		let storage = MemoryStorage::new();
		storage.delete("fulfillments:0x01").await.unwrap();
		assert!(matches!(
			storage.get_bytes("fulfillments:0x01").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_prefix_listing_stops_at_namespace_boundary() {
		let storage = MemoryStorage::new();
		for key in ["fulfillments:0x02", "fulfillments:0x01", "intakes:0x01", "fulfillmentsX"] {
			storage.set_bytes(key, vec![1]).await.unwrap();
		}

		let keys = storage.keys_with_prefix("fulfillments:").await.unwrap();
		assert_eq!(keys, vec!["fulfillments:0x01", "fulfillments:0x02"]);
	}

	#[test]
	fn test_factory_builds_from_empty_table() {
		assert!(create_storage(&toml::Value::Table(Default::default())).is_ok());
	}
}
