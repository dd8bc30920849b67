//! Escrow contracts for cross-chain intent settlement.
//!
//! An [`EscrowFactory`] deploys one [`Escrow`] per order per chain at an
//! address derived from the order and a salt. The source-chain escrow holds
//! the user's funds until a proof of the destination fill releases them to
//! the filler, or until the user withdraws after the fill deadline. Both run
//! on a simulated [`Chain`].

use alloy_primitives::{Address, U256};
use intent_types::CodecError;
use intent_verifier::VerifierError;
use thiserror::Error;

pub mod chain;
pub mod escrow;
pub mod factory;
pub mod ledger;
pub mod token;


pub use chain::{Chain, ChainEvent, ChainRegistry, CodeKind, LogEntry};
pub use escrow::{Escrow, EscrowStatus};
pub use factory::{
	intent_address, EscrowFactory, FactoryConfig, FactoryDeployment,
	DEFAULT_WITHDRAW_GRACE_SECONDS, ESCROW_CODE_HASH, MULTIPLIER,
};
pub use ledger::Ledger;
pub use token::{PermitCall, TokenError, TokenInfo};

/// Broad classes of rejection.
///
/// Every rejection is atomic. The filler uses the class to decide whether a
/// retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// A recovered signer disagrees with the claimed identity.
	Signature,
	/// Wrong order id, or the guarded transition already happened.
	Idempotency,
	/// Wrong caller for a restricted operation.
	Authorization,
	/// Outside the operation's valid time window.
	Temporal,
	/// The proof verifier rejected the proof.
	Proof,
	/// Missing code, unknown chain, or an out-of-range setting.
	Configuration,
	/// Insufficient balance or allowance.
	Ledger,
}

/// Errors raised by factory and escrow calls.
#[derive(Debug, Error)]
pub enum EscrowError {
	#[error("Invalid order")]
	InvalidOrder,
	/// `createIntent` requires the zero placeholder.
	#[error("Order intentAddress must be zero, got {0}")]
	IntentAddressSet(Address),
	#[error("Escrow already deployed at {0}")]
	AlreadyDeployed(Address),
	#[error("Order already funded")]
	AlreadyFunded,
	#[error("Order already fulfilled")]
	AlreadyFulfilled,
	#[error("Order already completed by filler")]
	AlreadyCompleted,
	#[error("Order already withdrawn")]
	AlreadyWithdrawn,
	#[error("Nothing escrowed")]
	NothingEscrowed,
	#[error("Already initialized")]
	AlreadyInitialized,
	#[error("OwnableUnauthorizedAccount({0})")]
	Unauthorized(Address),
	#[error("OwnableInvalidOwner({0})")]
	InvalidOwner(Address),
	#[error("Only user can call this function")]
	OnlyUser,
	#[error("Only factory can call this function")]
	OnlyFactory,
	#[error("Can withdraw after {unlocks_at}, now {now}")]
	WithdrawTooEarly { now: u64, unlocks_at: u64 },
	#[error("Order is for chain {expected}, called on chain {actual}")]
	WrongChain { expected: U256, actual: u64 },
	#[error("Proof verification failed: {0}")]
	Proof(#[from] VerifierError),
	#[error("Fee numerator {0} exceeds multiplier")]
	InvalidFee(U256),
	#[error("No verifier code at {0}")]
	MissingVerifier(Address),
	#[error("No contract at {0}")]
	NoCode(Address),
	#[error("Unknown chain {0}")]
	UnknownChain(u64),
	#[error(transparent)]
	Codec(#[from] CodecError),
	#[error(transparent)]
	Token(#[from] TokenError),
}

impl EscrowError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			EscrowError::InvalidOrder
			| EscrowError::IntentAddressSet(_)
			| EscrowError::AlreadyDeployed(_)
			| EscrowError::AlreadyFunded
			| EscrowError::AlreadyFulfilled
			| EscrowError::AlreadyCompleted
			| EscrowError::AlreadyWithdrawn
			| EscrowError::NothingEscrowed
			| EscrowError::AlreadyInitialized => ErrorKind::Idempotency,
			EscrowError::Unauthorized(_)
			| EscrowError::InvalidOwner(_)
			| EscrowError::OnlyUser
			| EscrowError::OnlyFactory => ErrorKind::Authorization,
			EscrowError::WithdrawTooEarly { .. } => ErrorKind::Temporal,
			EscrowError::Proof(_) => ErrorKind::Proof,
			EscrowError::WrongChain { .. }
			| EscrowError::InvalidFee(_)
			| EscrowError::MissingVerifier(_)
			| EscrowError::NoCode(_)
			| EscrowError::UnknownChain(_)
			| EscrowError::Codec(_) => ErrorKind::Configuration,
			EscrowError::Token(e) => e.kind(),
		}
	}
}
