//! Filler engine for cross-chain intent settlement.
//!
//! The filler takes a signed order and permit from an intake payload and
//! drives it to completion: it deploys the escrow on both chains, funds the
//! source escrow with the user's permit, pays the beneficiary on the
//! destination chain, waits for a proof of that fill and finally claims the
//! escrowed funds on the source chain.
//!
//! Every step is a handler reacting to an event on the [`EventBus`], and
//! progress is persisted as a [`Fulfillment`](intent_types::Fulfillment)
//! record so an interrupted run resumes where it stopped.

use intent_escrow::EscrowError;
use thiserror::Error;

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod monitoring;
pub mod proof;
pub mod recovery;
pub mod retry;
pub mod state;

#[cfg(test)]
mod test_support;

pub use builder::{FillerBuilder, FillerFactories};
pub use engine::{event_bus::EventBus, FillerEngine};
pub use proof::{ProofError, ProofInterface, ProofService};
pub use retry::{FulfillmentStep, RetryPolicy};
pub use state::{FulfillmentStateMachine, StateError};

/// Errors surfaced by filler handlers.
#[derive(Debug, Error)]
pub enum FillerError {
	/// The intake was refused before any ledger call.
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("State error: {0}")]
	State(#[from] StateError),
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Proof error: {0}")]
	Proof(#[from] ProofError),
	#[error(transparent)]
	Escrow(#[from] EscrowError),
	#[error("Timed out: {0}")]
	Timeout(String),
	/// A step gave up after a fatal rejection or its last attempt.
	#[error("Step {step} failed: {reason}")]
	StepFailed { step: FulfillmentStep, reason: String },
}
