//! Common types module for the intent settlement system.
//!
//! This module defines the data model shared by the escrow contracts, the
//! proof verifiers and the filler: the signed order and permit structures,
//! their canonical encodings, typed-data signature recovery, and the records
//! and events the filler uses while driving an order to completion.

/// Typed-data signature helpers (EIP-712 domain and digest).
pub mod utils;
/// Filler event types for inter-handler communication.
pub mod events;
/// Filler progress records.
pub mod fulfillment;
/// Intake and proof payloads exchanged with off-protocol actors.
pub mod intake;
/// Network and token configuration types.
pub mod networks;
/// Canonical order encoding and identity.
pub mod order;
/// Base trait for self-registering implementations.
pub mod registry;
/// Zeroizing wrapper for key material.
pub mod secret_string;
/// Signature recovery for orders and permits.
pub mod signature;
/// Solidity-compatible struct declarations.
pub mod standards;
/// Storage key namespaces.
pub mod storage;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, PrimitiveSignature as Signature, B256, U256};
pub use events::*;
pub use fulfillment::*;
pub use intake::*;
pub use networks::{NetworkConfig, NetworksConfig, TokenConfig};
pub use order::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use signature::*;
pub use standards::bridge::{
	BridgeData, BridgeLayout, BridgeReceiveData, BridgeTransfer, Order, Permit, FEE_MULTIPLIER,
};
pub use storage::*;
pub use utils::{current_timestamp, format_token_amount, truncate_id, with_0x_prefix};
pub use validation::*;
