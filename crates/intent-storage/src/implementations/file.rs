//! File-backed storage.
//!
//! Each key is one JSON file under `storage_path`. Writes land in a temporary
//! file first and are renamed into place, so a crash mid-write never leaves a
//! half-written record behind. The key is recovered from the file name, which
//! lets the filler list and resume fulfillments after a restart.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use intent_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use tokio::fs;

const EXTENSION: &str = "json";
const DEFAULT_STORAGE_PATH: &str = "./data/storage";

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Maps `namespace:id` to `namespace__id.json`.
	///
	/// Keys are built from namespaces and hex addresses, so `__` never occurs
	/// inside one and the mapping stays reversible.
	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(':', "__").replace('/', "_");
		self.base_path.join(format!("{}.{}", safe_key, EXTENSION))
	}

	fn key_from_file_name(name: &str) -> Option<String> {
		let stem = name.strip_suffix(&format!(".{}", EXTENSION))?;
		Some(stem.replacen("__", ":", 1))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let path = self.file_path(key);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let file_name = entry.file_name();
			let Some(name) = file_name.to_str() else {
				tracing::debug!("Skipping non UTF-8 file name {:?}", file_name);
				continue;
			};
			if let Some(key) = Self::key_from_file_name(name) {
				if key.starts_with(prefix) {
					keys.push(key);
				}
			}
		}
		keys.sort();
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)]).validate(config)
	}
}

/// Builds a file backend.
///
/// Configuration parameters:
/// - `storage_path`: directory holding the records (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);
	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

pub struct Registry;

impl intent_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_values_survive_a_new_instance() {
		let dir = TempDir::new().unwrap();
		let key = "fulfillments:0x2fd214f83d60f0eb18879c9bc9af079bc40bc3d2";

		FileStorage::new(dir.path().to_path_buf())
			.set_bytes(key, b"{\"step\":1}".to_vec())
			.await
			.unwrap();

		let reopened = FileStorage::new(dir.path().to_path_buf());
		assert!(reopened.exists(key).await.unwrap());
		assert_eq!(reopened.get_bytes(key).await.unwrap(), b"{\"step\":1}");
		assert_eq!(
			reopened.keys_with_prefix("fulfillments:").await.unwrap(),
			vec![key.to_string()]
		);
	}

	#[tokio::test]
	async fn test_listing_missing_directory_is_empty() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().join("not-created"));
		assert!(storage.keys_with_prefix("intakes:").await.unwrap().is_empty());
		assert!(matches!(
			storage.get_bytes("intakes:0x01").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_delete_removes_file() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		storage.set_bytes("intakes:0x01", vec![7]).await.unwrap();
		storage.delete("intakes:0x01").await.unwrap();
		assert!(!storage.exists("intakes:0x01").await.unwrap());
		storage.delete("intakes:0x01").await.unwrap();
	}

	#[test]
	fn test_schema_rejects_non_string_path() {
		let config: toml::Value = toml::from_str("storage_path = 5").unwrap();
		assert!(create_storage(&config).is_err());
	}
}
