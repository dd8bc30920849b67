//! Signs the `[demo]` order on behalf of a local user.

use alloy_primitives::U256;
use intent_account::implementations::local::create_account;
use intent_account::{AccountError, AccountService};
use intent_config::{Config, DemoConfig};
use intent_escrow::{intent_address, ChainRegistry, EscrowError};
use intent_types::{
	encode_bridge_data, BridgeTransfer, IntakePayload, Order, Permit, ORDER_DATA_TYPE,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemoError {
	#[error("Demo user: {0}")]
	Account(#[from] AccountError),
	#[error(transparent)]
	Ledger(#[from] EscrowError),
	#[error("Network {0} is not configured")]
	UnknownNetwork(u64),
	#[error("Deadline {0} does not fit in uint32")]
	DeadlineOverflow(u64),
}

fn deadline(now: u64, window: u32) -> Result<u32, DemoError> {
	let at = now + u64::from(window);
	u32::try_from(at).map_err(|_| DemoError::DeadlineOverflow(at))
}

/// Builds and signs the demo intake against the current source chain state.
///
/// Deadlines are relative to the source chain's clock, and the permit uses
/// the user's current token nonce.
pub async fn signed_intake(
	demo: &DemoConfig,
	config: &Config,
	chains: &ChainRegistry,
) -> Result<IntakePayload, DemoError> {
	let user = AccountService::new(create_account(&demo.user)?);
	let user_address = user.get_address().await?;
	let source = chains.get(demo.source_chain_id)?;
	let factory = config
		.network(demo.source_chain_id)
		.map(|network| network.factory_address)
		.ok_or(DemoError::UnknownNetwork(demo.source_chain_id))?;

	let now = source.now().await;
	let order = Order {
		intentAddress: Default::default(),
		user: user_address,
		nonce: demo.nonce,
		sourceChainId: U256::from(demo.source_chain_id),
		openDeadline: deadline(now, demo.open_window_seconds)?,
		fillDeadline: deadline(now, demo.fill_window_seconds)?,
		orderDataType: ORDER_DATA_TYPE,
		orderData: encode_bridge_data(&BridgeTransfer {
			filler: Default::default(),
			source_token: demo.source_token,
			amount: demo.amount,
			destination_chain_id: U256::from(demo.destination_chain_id),
			destination_token: demo.destination_token,
			receive_amount: demo.receive_amount,
			beneficiary: demo.beneficiary,
		}),
	};

	let permit = Permit {
		owner: user_address,
		spender: intent_address(factory, &order, config.filler.salt),
		value: demo.amount,
		nonce: source.nonces(&demo.source_token, &user_address).await?,
		deadline: U256::from(order.fillDeadline),
	};
	let domain = source.token_domain(&demo.source_token).await?;

	let order_signature = user.sign_order(&order, factory).await?;
	let permit_signature = user.sign_permit(&permit, &domain).await?;
	tracing::info!(
		user = %user_address,
		amount = %demo.amount,
		source_chain_id = demo.source_chain_id,
		destination_chain_id = demo.destination_chain_id,
		"Signed demo order"
	);
	Ok(IntakePayload::new(&order, order_signature, &permit, permit_signature))
}
