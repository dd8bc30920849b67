//! Bounded retries for ledger steps.
//!
//! Escrow rejections are atomic, so a failed call can always be attempted
//! again. What changes between attempts depends on why it was rejected: a
//! stale order id gets refreshed from the escrow, a rejected proof gets
//! refetched, and a guard that already fired is confirmed from ledger state
//! and counted as done.

use crate::FillerError;
use intent_config::FillerConfig;
use intent_escrow::{ErrorKind, EscrowError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Steps of a fulfillment after intake, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FulfillmentStep {
	Validate,
	Deploy,
	Fund,
	Fill,
	Proof,
	Finalize,
}

impl FulfillmentStep {
	pub fn as_str(&self) -> &'static str {
		match self {
			FulfillmentStep::Validate => "validate",
			FulfillmentStep::Deploy => "deploy",
			FulfillmentStep::Fund => "fund",
			FulfillmentStep::Fill => "fill",
			FulfillmentStep::Proof => "proof",
			FulfillmentStep::Finalize => "finalize",
		}
	}

	pub(crate) fn failed(self, reason: impl Into<String>) -> FillerError {
		FillerError::StepFailed {
			step: self,
			reason: reason.into(),
		}
	}
}

impl fmt::Display for FulfillmentStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What to do before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
	/// Try the same call again after the delay.
	Retry,
	/// Re-read the order id from the escrow's stored order.
	RefreshOrderId,
	/// Ask the proof source for a new proof.
	RefetchProof,
	/// The guarded transition already happened, if ledger state agrees.
	AlreadyApplied,
	/// Nothing the filler can change will make this call succeed.
	Fatal,
}

/// Decides how a step reacts to a rejected ledger call.
pub fn classify(error: &EscrowError) -> Recovery {
	match error {
		EscrowError::InvalidOrder => Recovery::RefreshOrderId,
		EscrowError::AlreadyFunded
		| EscrowError::AlreadyFulfilled
		| EscrowError::AlreadyCompleted
		| EscrowError::AlreadyDeployed(_)
		| EscrowError::AlreadyInitialized => Recovery::AlreadyApplied,
		// Withdrawn or empty escrows never come back.
		EscrowError::AlreadyWithdrawn | EscrowError::NothingEscrowed => Recovery::Fatal,
		other => match other.kind() {
			ErrorKind::Proof => Recovery::RefetchProof,
			// Balances and allowances can change between attempts.
			ErrorKind::Ledger => Recovery::Retry,
			ErrorKind::Signature
			| ErrorKind::Authorization
			| ErrorKind::Temporal
			| ErrorKind::Configuration
			| ErrorKind::Idempotency => Recovery::Fatal,
		},
	}
}

/// Attempt limit shared by every step.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub delay: Duration,
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, delay: Duration) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			delay,
		}
	}

	pub fn from_config(config: &FillerConfig) -> Self {
		Self::new(config.max_attempts, Duration::from_millis(config.retry_delay_ms))
	}

	/// Called after attempt number `attempt` (1-based) was rejected.
	///
	/// Waits out the delay when attempts remain, otherwise fails the step
	/// with the last rejection.
	pub async fn backoff(
		&self,
		step: FulfillmentStep,
		attempt: u32,
		reason: &str,
	) -> Result<(), FillerError> {
		if attempt >= self.max_attempts {
			tracing::error!(
				step = %step,
				attempts = attempt,
				reason = %reason,
				"Giving up"
			);
			return Err(step.failed(reason));
		}

		tracing::warn!(
			step = %step,
			attempt,
			max_attempts = self.max_attempts,
			reason = %reason,
			"Rejected, retrying"
		);
		tokio::time::sleep(self.delay).await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, U256};
	use intent_escrow::TokenError;
	use intent_verifier::VerifierError;

	#[test]
	fn test_classification() {
		assert_eq!(classify(&EscrowError::InvalidOrder), Recovery::RefreshOrderId);
		assert_eq!(classify(&EscrowError::AlreadyFunded), Recovery::AlreadyApplied);
		assert_eq!(classify(&EscrowError::AlreadyCompleted), Recovery::AlreadyApplied);
		assert_eq!(classify(&EscrowError::AlreadyWithdrawn), Recovery::Fatal);
		assert_eq!(
			classify(&EscrowError::Proof(VerifierError::Rejected("bad".into()))),
			Recovery::RefetchProof
		);
		assert_eq!(
			classify(&EscrowError::Token(TokenError::InsufficientAllowance {
				spender: Address::ZERO,
				allowance: U256::ZERO,
				needed: U256::from(1u64),
			})),
			Recovery::Retry
		);
		assert_eq!(
			classify(&EscrowError::Token(TokenError::ExpiredSignature {
				deadline: U256::ZERO
			})),
			Recovery::Fatal
		);
		assert_eq!(classify(&EscrowError::OnlyFactory), Recovery::Fatal);
	}

	#[tokio::test]
	async fn test_backoff_gives_up_on_last_attempt() {
		let policy = RetryPolicy::new(2, Duration::from_millis(1));

		assert!(policy.backoff(FulfillmentStep::Fill, 1, "busy").await.is_ok());
		match policy.backoff(FulfillmentStep::Fill, 2, "busy").await {
			Err(FillerError::StepFailed { step, reason }) => {
				assert_eq!(step, FulfillmentStep::Fill);
				assert_eq!(reason, "busy");
			},
			other => panic!("expected step failure, got {:?}", other),
		}
	}

	#[test]
	fn test_zero_attempts_still_tries_once() {
		assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
	}
}
