//! Polling monitors for conditions on other chains.

pub mod proof;

pub use proof::ProofMonitor;
