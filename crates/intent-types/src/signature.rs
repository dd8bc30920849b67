//! Typed-data signature recovery for orders and permits.
//!
//! Orders are signed under the `SignOrder` domain of the factory on the
//! order's source chain. Permits are signed under the token contract's own
//! domain. Both use version "1".

use crate::standards::bridge::{Order, Permit};
use crate::utils::eip712::DOMAIN_VERSION;
use alloy_primitives::{Address, PrimitiveSignature, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

/// EIP-712 domain name for orders.
pub const ORDER_DOMAIN_NAME: &str = "SignOrder";

/// Errors that can occur while recovering or checking a signer.
#[derive(Debug, Error)]
pub enum SignatureError {
	/// The signature bytes are not a 65-byte `r || s || v` value.
	#[error("Malformed signature: {0}")]
	Malformed(String),
	/// Public key recovery failed.
	#[error("Recovery failed: {0}")]
	Recovery(String),
	/// The recovered signer is not the claimed identity.
	#[error("Signer mismatch: expected {expected}, recovered {recovered}")]
	SignerMismatch { expected: Address, recovered: Address },
	/// The permit is owned by someone other than the order's user.
	#[error("Permit owner {owner} does not match order user {user}")]
	OwnerMismatch { owner: Address, user: Address },
}

/// EIP-712 domain of a token contract's permit function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDomain {
	/// Token name as returned by `name()`.
	pub name: String,
	pub chain_id: u64,
	/// The token contract itself.
	pub verifying_contract: Address,
}

impl TokenDomain {
	pub fn new(name: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
		Self {
			name: name.into(),
			chain_id,
			verifying_contract,
		}
	}

	pub fn eip712_domain(&self) -> Eip712Domain {
		Eip712Domain::new(
			Some(Cow::Owned(self.name.clone())),
			Some(Cow::Borrowed(DOMAIN_VERSION)),
			Some(U256::from(self.chain_id)),
			Some(self.verifying_contract),
			None,
		)
	}
}

/// Order domain for the factory deployed on the order's source chain.
pub fn order_domain(order: &Order, factory: Address) -> Eip712Domain {
	Eip712Domain::new(
		Some(Cow::Borrowed(ORDER_DOMAIN_NAME)),
		Some(Cow::Borrowed(DOMAIN_VERSION)),
		Some(order.sourceChainId),
		Some(factory),
		None,
	)
}

/// Digest a user signs to authorise an order.
pub fn order_signing_hash(order: &Order, factory: Address) -> B256 {
	order.eip712_signing_hash(&order_domain(order, factory))
}

/// Digest an owner signs to authorise a permit.
pub fn permit_signing_hash(permit: &Permit, domain: &TokenDomain) -> B256 {
	permit.eip712_signing_hash(&domain.eip712_domain())
}

/// Parses a 65-byte `r || s || v` signature; `v` may be 27/28 or 0/1.
pub fn parse_signature(bytes: &[u8]) -> Result<PrimitiveSignature, SignatureError> {
	if bytes.len() != 65 {
		return Err(SignatureError::Malformed(format!(
			"expected 65 bytes, got {}",
			bytes.len()
		)));
	}
	let r = U256::from_be_slice(&bytes[..32]);
	let s = U256::from_be_slice(&bytes[32..64]);
	let y_parity = parity_from_v(bytes[64])?;
	Ok(PrimitiveSignature::new(r, s, y_parity))
}

/// Rebuilds a signature from the `(v, r, s)` triple taken by `permit`.
pub fn signature_from_vrs(v: u8, r: B256, s: B256) -> Result<PrimitiveSignature, SignatureError> {
	Ok(PrimitiveSignature::new(
		U256::from_be_bytes(r.0),
		U256::from_be_bytes(s.0),
		parity_from_v(v)?,
	))
}

/// Splits a 65-byte signature into `(v, r, s)` with `v` in {27, 28}.
pub fn split_signature(bytes: &[u8]) -> Result<(u8, B256, B256), SignatureError> {
	let signature = parse_signature(bytes)?;
	let v = 27 + u8::from(signature.v());
	Ok((
		v,
		B256::from(signature.r().to_be_bytes::<32>()),
		B256::from(signature.s().to_be_bytes::<32>()),
	))
}

fn parity_from_v(v: u8) -> Result<bool, SignatureError> {
	match v {
		0 | 27 => Ok(false),
		1 | 28 => Ok(true),
		other => Err(SignatureError::Malformed(format!("invalid v value {}", other))),
	}
}

/// Recovers the address that signed `hash`.
pub fn recover_signer(hash: &B256, signature: &PrimitiveSignature) -> Result<Address, SignatureError> {
	signature
		.recover_address_from_prehash(hash)
		.map_err(|e| SignatureError::Recovery(e.to_string()))
}

/// Recovers the signer of an order under the given factory's domain.
pub fn recover_order_signer(
	order: &Order,
	signature: &[u8],
	factory: Address,
) -> Result<Address, SignatureError> {
	let signature = parse_signature(signature)?;
	recover_signer(&order_signing_hash(order, factory), &signature)
}

/// Returns true when `expected_signer` signed `order`.
pub fn verify_order_signature(
	order: &Order,
	signature: &[u8],
	factory: Address,
	expected_signer: Address,
) -> bool {
	recover_order_signer(order, signature, factory).is_ok_and(|signer| signer == expected_signer)
}

/// Recovers the signer of a permit under the token's domain.
pub fn recover_permit_signer(
	permit: &Permit,
	signature: &[u8],
	domain: &TokenDomain,
) -> Result<Address, SignatureError> {
	let signature = parse_signature(signature)?;
	recover_signer(&permit_signing_hash(permit, domain), &signature)
}

/// Returns true when the permit was signed by its owner.
pub fn verify_permit_signature(permit: &Permit, signature: &[u8], domain: &TokenDomain) -> bool {
	recover_permit_signer(permit, signature, domain).is_ok_and(|signer| signer == permit.owner)
}

/// Checks an intake pair: the order signer is the user, the permit signer
/// is the owner, and owner and user are the same address.
///
/// Returns the user on success.
pub fn verify_intake(
	order: &Order,
	order_signature: &[u8],
	permit: &Permit,
	permit_signature: &[u8],
	factory: Address,
	domain: &TokenDomain,
) -> Result<Address, SignatureError> {
	let order_signer = recover_order_signer(order, order_signature, factory)?;
	if order_signer != order.user {
		return Err(SignatureError::SignerMismatch {
			expected: order.user,
			recovered: order_signer,
		});
	}

	let permit_signer = recover_permit_signer(permit, permit_signature, domain)?;
	if permit_signer != permit.owner {
		return Err(SignatureError::SignerMismatch {
			expected: permit.owner,
			recovered: permit_signer,
		});
	}

	if permit.owner != order.user {
		return Err(SignatureError::OwnerMismatch {
			owner: permit.owner,
			user: order.user,
		});
	}

	Ok(order.user)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::order::tests::sample_order;
	use crate::utils::eip712::{compute_domain_hash, compute_final_digest, permit_struct_hash};
	use alloy_primitives::{address, b256};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;

	const USER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
	const OTHER_KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

	fn factory() -> Address {
		Address::repeat_byte(0xfa)
	}

	fn token_domain() -> TokenDomain {
		TokenDomain::new("Mock USDT", 1, Address::repeat_byte(0x11))
	}

	fn signer(key: &str) -> PrivateKeySigner {
		key.parse().unwrap()
	}

	fn sample_permit(owner: Address) -> Permit {
		Permit {
			owner,
			spender: Address::repeat_byte(0x44),
			value: U256::from(100u128 * 10u128.pow(18)),
			nonce: U256::ZERO,
			deadline: U256::from(1_700_000_600u64),
		}
	}

	fn sign(key: &str, hash: B256) -> Vec<u8> {
		signer(key).sign_hash_sync(&hash).unwrap().as_bytes().to_vec()
	}

	#[test]
	fn test_order_signing_hash_known_vector() {
		assert_eq!(
			order_signing_hash(&sample_order(), factory()),
			b256!("b68a3b283937a92c585e89ddac8b1f2175824fb4a7525331a710355672b47369")
		);
	}

	#[test]
	fn test_order_signature_recovers_user() {
		let order = sample_order();
		let signature = sign(USER_KEY, order_signing_hash(&order, factory()));

		assert_eq!(
			recover_order_signer(&order, &signature, factory()).unwrap(),
			address!("70997970c51812dc3a010c7d01b50e0d17dc79c8")
		);
		assert!(verify_order_signature(&order, &signature, factory(), order.user));
	}

	#[test]
	fn test_order_signature_bound_to_factory_and_chain() {
		let order = sample_order();
		let signature = sign(USER_KEY, order_signing_hash(&order, factory()));

		assert!(!verify_order_signature(
			&order,
			&signature,
			Address::repeat_byte(0xfb),
			order.user
		));

		let mut other_chain = order.clone();
		other_chain.sourceChainId = U256::from(5u64);
		assert!(!verify_order_signature(&other_chain, &signature, factory(), order.user));
	}

	#[test]
	fn test_manual_permit_digest_matches_typed_data() {
		let permit = sample_permit(Address::repeat_byte(0x01));
		let domain = token_domain();

		let domain_hash = compute_domain_hash(
			&domain.name,
			DOMAIN_VERSION,
			U256::from(domain.chain_id),
			&domain.verifying_contract,
		);
		let struct_hash = permit_struct_hash(
			&permit.owner,
			&permit.spender,
			permit.value,
			permit.nonce,
			permit.deadline,
		);

		assert_eq!(domain_hash, domain.eip712_domain().hash_struct());
		assert_eq!(
			compute_final_digest(&domain_hash, &struct_hash),
			permit_signing_hash(&permit, &domain)
		);
	}

	#[test]
	fn test_verify_intake_accepts_matching_pair() {
		let order = sample_order();
		let permit = sample_permit(order.user);
		let order_sig = sign(USER_KEY, order_signing_hash(&order, factory()));
		let permit_sig = sign(USER_KEY, permit_signing_hash(&permit, &token_domain()));

		let user = verify_intake(&order, &order_sig, &permit, &permit_sig, factory(), &token_domain())
			.unwrap();
		assert_eq!(user, order.user);
	}

	#[test]
	fn test_verify_intake_rejects_foreign_permit() {
		let order = sample_order();
		let other = signer(OTHER_KEY).address();
		let permit = sample_permit(other);
		let order_sig = sign(USER_KEY, order_signing_hash(&order, factory()));
		let permit_sig = sign(OTHER_KEY, permit_signing_hash(&permit, &token_domain()));

		assert!(verify_permit_signature(&permit, &permit_sig, &token_domain()));
		let err = verify_intake(&order, &order_sig, &permit, &permit_sig, factory(), &token_domain())
			.unwrap_err();
		assert!(matches!(err, SignatureError::OwnerMismatch { .. }));
	}

	#[test]
	fn test_verify_intake_rejects_forged_order() {
		let order = sample_order();
		let permit = sample_permit(order.user);
		let order_sig = sign(OTHER_KEY, order_signing_hash(&order, factory()));
		let permit_sig = sign(USER_KEY, permit_signing_hash(&permit, &token_domain()));

		let err = verify_intake(&order, &order_sig, &permit, &permit_sig, factory(), &token_domain())
			.unwrap_err();
		assert!(matches!(err, SignatureError::SignerMismatch { .. }));
	}

	#[test]
	fn test_split_signature_round_trip() {
		let hash = B256::repeat_byte(0x42);
		let bytes = sign(USER_KEY, hash);
		let (v, r, s) = split_signature(&bytes).unwrap();
		assert!(v == 27 || v == 28);

		let rebuilt = signature_from_vrs(v, r, s).unwrap();
		assert_eq!(rebuilt.as_bytes().to_vec(), bytes);
		assert_eq!(recover_signer(&hash, &rebuilt).unwrap(), signer(USER_KEY).address());
	}

	#[test]
	fn test_malformed_signature_rejected() {
		assert!(matches!(parse_signature(&[0u8; 64]), Err(SignatureError::Malformed(_))));

		let mut bytes = [0u8; 65];
		bytes[64] = 29;
		assert!(matches!(parse_signature(&bytes), Err(SignatureError::Malformed(_))));
	}
}
