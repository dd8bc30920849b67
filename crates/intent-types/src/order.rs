//! Canonical encoding and identity of orders.
//!
//! Two encodings are in play. The wire form handed between users and fillers
//! is the ABI parameter encoding of the eight order fields. The order
//! identifier hashes the single-value ABI encoding, which is what
//! `abi.encode(order)` produces on a ledger (a leading offset word followed
//! by the tuple).

use crate::standards::bridge::{
	BridgeData, BridgeLayout, BridgeReceiveData, BridgeTransfer, Order, Permit,
};
use alloy_primitives::{b256, keccak256, Address, Bytes, B256};
use alloy_sol_types::SolValue;
use thiserror::Error;

/// Tag string whose hash identifies bridge transfer payloads.
pub const BRIDGE_TRANSFER_ORDER: &str = "BRIDGE_TRANSFER_ORDER";

/// `keccak256("BRIDGE_TRANSFER_ORDER")`.
pub const ORDER_DATA_TYPE: B256 =
	b256!("e7916c0abb18c8d4e936c90c4b274f18cfea48ab9203ec4dd4e48f45a126d482");

/// Encoded length of a permit: five static words.
const PERMIT_ENCODED_LEN: usize = 5 * 32;

/// Errors that can occur while encoding or decoding protocol structures.
#[derive(Debug, Error)]
pub enum CodecError {
	/// The order bytes are not a valid ABI parameter encoding.
	#[error("Invalid order encoding: {0}")]
	InvalidOrder(String),
	/// The bridge payload does not match the expected layout.
	#[error("Invalid bridge data encoding: {0}")]
	InvalidBridgeData(String),
	/// The permit bytes are not five ABI words.
	#[error("Invalid permit encoding: {0}")]
	InvalidPermit(String),
	/// The order carries a payload this system does not understand.
	#[error("Unsupported order data type: {0}")]
	UnsupportedOrderDataType(B256),
}

/// Encodes an order into its wire form.
pub fn encode_order(order: &Order) -> Bytes {
	Bytes::from(order.abi_encode_params())
}

/// Decodes an order from its wire form.
pub fn decode_order(data: &[u8]) -> Result<Order, CodecError> {
	Order::abi_decode_params(data, true).map_err(|e| CodecError::InvalidOrder(e.to_string()))
}

/// Computes the order identifier, `keccak256(abi.encode(order))`.
///
/// The identifier covers `intentAddress`, so it changes once the escrow
/// address is fixed. Always hash the order in its current form.
pub fn order_id(order: &Order) -> B256 {
	keccak256(order.abi_encode())
}

/// Encodes a bridge transfer, choosing the layout from `receive_amount`.
pub fn encode_bridge_data(transfer: &BridgeTransfer) -> Bytes {
	let encoded = match transfer.receive_amount {
		Some(receive_amount) => BridgeReceiveData {
			filler: transfer.filler,
			sourceToken: transfer.source_token,
			amount: transfer.amount,
			destinationChainId: transfer.destination_chain_id,
			destinationToken: transfer.destination_token,
			receiveAmount: receive_amount,
			beneficiary: transfer.beneficiary,
		}
		.abi_encode(),
		None => BridgeData {
			filler: transfer.filler,
			sourceToken: transfer.source_token,
			amount: transfer.amount,
			destinationChainId: transfer.destination_chain_id,
			destinationToken: transfer.destination_token,
			beneficiary: transfer.beneficiary,
		}
		.abi_encode(),
	};
	Bytes::from(encoded)
}

/// Decodes a bridge payload that must be in `layout`.
pub fn decode_bridge_data(data: &[u8], layout: BridgeLayout) -> Result<BridgeTransfer, CodecError> {
	if data.len() != layout.encoded_len() {
		return Err(CodecError::InvalidBridgeData(format!(
			"expected {} bytes for {} layout, got {}",
			layout.encoded_len(),
			layout.as_str(),
			data.len()
		)));
	}

	let transfer = match layout {
		BridgeLayout::Proportional => BridgeData::abi_decode(data, true)
			.map(BridgeTransfer::from)
			.map_err(|e| CodecError::InvalidBridgeData(e.to_string()))?,
		BridgeLayout::ExplicitReceive => BridgeReceiveData::abi_decode(data, true)
			.map(BridgeTransfer::from)
			.map_err(|e| CodecError::InvalidBridgeData(e.to_string()))?,
	};
	Ok(transfer)
}

/// Decodes the bridge payload of an order after checking its data type tag.
pub fn bridge_transfer(order: &Order, layout: BridgeLayout) -> Result<BridgeTransfer, CodecError> {
	if order.orderDataType != ORDER_DATA_TYPE {
		return Err(CodecError::UnsupportedOrderDataType(order.orderDataType));
	}
	decode_bridge_data(&order.orderData, layout)
}

/// Returns a copy of the order whose bridge payload names `filler`.
pub fn with_filler(
	order: &Order,
	filler: Address,
	layout: BridgeLayout,
) -> Result<Order, CodecError> {
	let mut transfer = bridge_transfer(order, layout)?;
	transfer.filler = filler;

	let mut updated = order.clone();
	updated.orderData = encode_bridge_data(&transfer);
	Ok(updated)
}

/// Returns a copy of the order with `intentAddress` set.
pub fn with_intent_address(order: &Order, intent_address: Address) -> Order {
	let mut updated = order.clone();
	updated.intentAddress = intent_address;
	updated
}

/// Resets both post-deployment placeholders (`intentAddress` and the
/// bridge filler) to zero, giving the form the user signed.
pub fn zeroed(order: &Order, layout: BridgeLayout) -> Result<Order, CodecError> {
	let mut cleared = with_filler(order, Address::ZERO, layout)?;
	cleared.intentAddress = Address::ZERO;
	Ok(cleared)
}

/// Encodes a permit into its wire form.
pub fn encode_permit(permit: &Permit) -> Bytes {
	Bytes::from(permit.abi_encode())
}

/// Decodes a permit from its wire form.
pub fn decode_permit(data: &[u8]) -> Result<Permit, CodecError> {
	if data.len() != PERMIT_ENCODED_LEN {
		return Err(CodecError::InvalidPermit(format!(
			"expected {} bytes, got {}",
			PERMIT_ENCODED_LEN,
			data.len()
		)));
	}
	Permit::abi_decode(data, true).map_err(|e| CodecError::InvalidPermit(e.to_string()))
}
