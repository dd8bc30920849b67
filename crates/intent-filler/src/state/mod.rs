//! Persistent fulfillment state.

pub mod fulfillment;

pub use fulfillment::{FulfillmentStateMachine, StateError};
