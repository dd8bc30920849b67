//! Hand-rolled EIP-712 hashing for static structs.
//!
//! These helpers mirror what an ERC-2612 token computes on a ledger:
//! - Domain hash with name, version, chain id and verifying contract
//! - Permit struct hash
//! - Final digest (0x1901 || domainHash || structHash)

use alloy_primitives::{keccak256, Address, B256, U256};

pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const PERMIT_TYPE: &str =
	"Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)";
/// Version string used by both the order domain and permit token domains.
pub const DOMAIN_VERSION: &str = "1";

/// Compute EIP-712 domain hash
/// (keccak256(abi.encode(typeHash, nameHash, versionHash, chainId, verifyingContract))).
pub fn compute_domain_hash(
	name: &str,
	version: &str,
	chain_id: U256,
	verifying_contract: &Address,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
	enc.push_b256(&keccak256(name.as_bytes()));
	enc.push_b256(&keccak256(version.as_bytes()));
	enc.push_u256(chain_id);
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Struct hash of an ERC-2612 permit.
pub fn permit_struct_hash(
	owner: &Address,
	spender: &Address,
	value: U256,
	nonce: U256,
	deadline: U256,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(PERMIT_TYPE.as_bytes()));
	enc.push_address(owner);
	enc.push_address(spender);
	enc.push_u256(value);
	enc.push_u256(nonce);
	enc.push_u256(deadline);
	keccak256(enc.finish())
}

/// Minimal ABI encoder for static types used in EIP-712 struct hashing.
#[derive(Default)]
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		self.buf.extend_from_slice(&v.to_be_bytes::<32>());
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}
