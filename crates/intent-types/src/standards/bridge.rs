//! Bridge transfer order types.
//!
//! The ABI layout of these structs is the signed wire format. Field order and
//! widths must stay exactly as declared, otherwise already-signed orders stop
//! hashing to the same identifiers.

use alloy_primitives::{Address, U256};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fixed denominator for fee numerators stored in the factory fee table.
pub const FEE_MULTIPLIER: u64 = 10_000;

sol! {
	/// Chain-agnostic description of a cross-chain transfer, signed by the user.
	///
	/// `intentAddress` is a placeholder until the escrow is created, after which
	/// it holds the escrow's own address.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct Order {
		address intentAddress;
		address user;
		uint256 nonce;
		uint256 sourceChainId;
		uint32 openDeadline;
		uint32 fillDeadline;
		bytes32 orderDataType;
		bytes orderData;
	}

	/// Bridge payload whose destination payout is derived from the fee table.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct BridgeData {
		address filler;
		address sourceToken;
		uint256 amount;
		uint256 destinationChainId;
		address destinationToken;
		address beneficiary;
	}

	/// Bridge payload carrying an explicit, signed destination receive amount.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct BridgeReceiveData {
		address filler;
		address sourceToken;
		uint256 amount;
		uint256 destinationChainId;
		address destinationToken;
		uint256 receiveAmount;
		address beneficiary;
	}

	/// EIP-2612 spending approval signed by the token owner.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct Permit {
		address owner;
		address spender;
		uint256 value;
		uint256 nonce;
		uint256 deadline;
	}
}

/// Selects which BridgeData layout an `orderData` payload uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeLayout {
	/// Six fields; the beneficiary receives `amount - fee`.
	#[default]
	Proportional,
	/// Seven fields; the beneficiary receives `receiveAmount`.
	ExplicitReceive,
}

impl BridgeLayout {
	/// Exact ABI-encoded length of a payload in this layout.
	pub fn encoded_len(&self) -> usize {
		match self {
			BridgeLayout::Proportional => 6 * 32,
			BridgeLayout::ExplicitReceive => 7 * 32,
		}
	}

	/// Returns the configuration name of the layout.
	pub fn as_str(&self) -> &'static str {
		match self {
			BridgeLayout::Proportional => "proportional",
			BridgeLayout::ExplicitReceive => "explicit_receive",
		}
	}
}

impl FromStr for BridgeLayout {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"proportional" => Ok(Self::Proportional),
			"explicit_receive" => Ok(Self::ExplicitReceive),
			other => Err(format!("Unknown bridge layout '{}'", other)),
		}
	}
}

/// Layout-independent view of a decoded bridge payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransfer {
	pub filler: Address,
	pub source_token: Address,
	pub amount: U256,
	pub destination_chain_id: U256,
	pub destination_token: Address,
	/// Present only in the explicit-receive layout.
	pub receive_amount: Option<U256>,
	pub beneficiary: Address,
}

impl BridgeTransfer {
	/// The layout this transfer encodes to.
	pub fn layout(&self) -> BridgeLayout {
		if self.receive_amount.is_some() {
			BridgeLayout::ExplicitReceive
		} else {
			BridgeLayout::Proportional
		}
	}

	/// Amount the beneficiary receives for a given fee numerator.
	///
	/// An explicit receive amount takes precedence over the fee formula.
	/// Returns `None` when the numerator exceeds [`FEE_MULTIPLIER`] or the
	/// multiplication overflows.
	pub fn payout(&self, fee_numerator: U256) -> Option<U256> {
		if let Some(receive_amount) = self.receive_amount {
			return Some(receive_amount);
		}
		let multiplier = U256::from(FEE_MULTIPLIER);
		if fee_numerator > multiplier {
			return None;
		}
		let fee = self.amount.checked_mul(fee_numerator)? / multiplier;
		self.amount.checked_sub(fee)
	}

	/// Destination chain id as a native integer, if it fits.
	pub fn destination_chain(&self) -> Option<u64> {
		u64::try_from(self.destination_chain_id).ok()
	}
}

impl From<BridgeData> for BridgeTransfer {
	fn from(data: BridgeData) -> Self {
		Self {
			filler: data.filler,
			source_token: data.sourceToken,
			amount: data.amount,
			destination_chain_id: data.destinationChainId,
			destination_token: data.destinationToken,
			receive_amount: None,
			beneficiary: data.beneficiary,
		}
	}
}

impl From<BridgeReceiveData> for BridgeTransfer {
	fn from(data: BridgeReceiveData) -> Self {
		Self {
			filler: data.filler,
			source_token: data.sourceToken,
			amount: data.amount,
			destination_chain_id: data.destinationChainId,
			destination_token: data.destinationToken,
			receive_amount: Some(data.receiveAmount),
			beneficiary: data.beneficiary,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn transfer(amount: u128) -> BridgeTransfer {
		BridgeTransfer {
			filler: Address::ZERO,
			source_token: Address::repeat_byte(0x11),
			amount: U256::from(amount),
			destination_chain_id: U256::from(2u64),
			destination_token: Address::repeat_byte(0x22),
			receive_amount: None,
			beneficiary: Address::repeat_byte(0x33),
		}
	}

	#[test]
	fn test_payout_with_one_basis_point() {
		let amount = 100u128 * 10u128.pow(18);
		let payout = transfer(amount).payout(U256::from(1u64)).unwrap();
		assert_eq!(payout, U256::from(amount * 9999 / 10000));
	}

	#[test]
	fn test_payout_zero_fee_is_full_amount() {
		let t = transfer(12345);
		assert_eq!(t.payout(U256::ZERO), Some(U256::from(12345u64)));
	}

	#[test]
	fn test_payout_rounds_fee_down() {
		// 9999 * 1 / 10000 == 0, so nothing is withheld
		let t = transfer(9999);
		assert_eq!(t.payout(U256::from(1u64)), Some(U256::from(9999u64)));
	}

	#[test]
	fn test_explicit_receive_overrides_fee() {
		let mut t = transfer(1000);
		t.receive_amount = Some(U256::from(990u64));
		assert_eq!(t.layout(), BridgeLayout::ExplicitReceive);
		assert_eq!(t.payout(U256::from(5000u64)), Some(U256::from(990u64)));
	}

	#[test]
	fn test_fee_above_multiplier_rejected() {
		assert_eq!(transfer(1000).payout(U256::from(FEE_MULTIPLIER + 1)), None);
	}

	#[test]
	fn test_layout_names() {
		assert_eq!(
			"explicit_receive".parse::<BridgeLayout>().unwrap(),
			BridgeLayout::ExplicitReceive
		);
		assert_eq!(BridgeLayout::default().as_str(), "proportional");
		assert!("weird".parse::<BridgeLayout>().is_err());
	}
}
