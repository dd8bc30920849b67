//! Private-key account held in process memory.

use crate::{AccountError, AccountInterface};
use alloy_primitives::{Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use intent_types::{ConfigSchema, Field, FieldType, Schema, SecretString, Signature, ValidationError};

pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex private key, with or without the `0x` prefix.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key.with_exposed(|key| {
			key.parse::<PrivateKeySigner>()
				.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
		})?;
		Ok(Self { signer })
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let key_field = Field::new("private_key", FieldType::String).with_validator(|value| {
			let key = value.as_str().unwrap_or_default();
			let hex = key.strip_prefix("0x").unwrap_or(key);
			if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
				Ok(())
			} else {
				Err("must be 32 bytes of hex".to_string())
			}
		});
		Schema::new(vec![key_field], vec![]).validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		self.signer
			.sign_hash_sync(hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}
}

/// Builds a local wallet.
///
/// Configuration parameters:
/// - `private_key`: hex private key (required)
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;
	Ok(Box::new(LocalWallet::new(&private_key)?))
}

pub struct Registry;

impl intent_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::AccountService;
	use alloy_primitives::{address, U256};
	use intent_types::{
		recover_order_signer, verify_permit_signature, Bytes, Order, Permit, TokenDomain,
		ORDER_DATA_TYPE,
	};

	const USER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
	const USER: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");

	fn config(key: &str) -> toml::Value {
		toml::from_str(&format!("private_key = \"{}\"", key)).unwrap()
	}

	#[tokio::test]
	async fn test_address_from_key() {
		let account = create_account(&config(USER_KEY)).unwrap();
		assert_eq!(account.address().await.unwrap(), USER);

		let unprefixed = create_account(&config(&USER_KEY[2..])).unwrap();
		assert_eq!(unprefixed.address().await.unwrap(), USER);
	}

	#[test]
	fn test_rejects_bad_keys() {
		assert!(create_account(&config("0x1234")).is_err());
		assert!(create_account(&toml::Value::Table(Default::default())).is_err());
	}

	#[tokio::test]
	async fn test_signed_order_recovers_to_user() {
		let service = AccountService::new(create_account(&config(USER_KEY)).unwrap());
		let factory = Address::repeat_byte(0xfa);
		let order = Order {
			intentAddress: Address::ZERO,
			user: USER,
			nonce: U256::from(1u64),
			sourceChainId: U256::from(1u64),
			openDeadline: 100,
			fillDeadline: 200,
			orderDataType: ORDER_DATA_TYPE,
			orderData: Bytes::new(),
		};

		let signature = service.sign_order(&order, factory).await.unwrap();
		assert_eq!(signature.len(), 65);
		assert!(matches!(signature[64], 27 | 28));
		assert_eq!(recover_order_signer(&order, &signature, factory).unwrap(), USER);
	}

	#[tokio::test]
	async fn test_signed_permit_verifies_under_token_domain() {
		let service = AccountService::new(create_account(&config(USER_KEY)).unwrap());
		let domain = TokenDomain::new("Mock USDT", 1, Address::repeat_byte(0x11));
		let permit = Permit {
			owner: USER,
			spender: Address::repeat_byte(0x55),
			value: U256::from(1000u64),
			nonce: U256::ZERO,
			deadline: U256::from(200u64),
		};

		let signature = service.sign_permit(&permit, &domain).await.unwrap();
		assert!(verify_permit_signature(&permit, &signature, &domain));

		let other_chain = TokenDomain::new("Mock USDT", 2, Address::repeat_byte(0x11));
		assert!(!verify_permit_signature(&permit, &signature, &other_chain));
	}
}
