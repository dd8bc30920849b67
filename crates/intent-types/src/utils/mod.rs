//! Utility functions shared across the intent settlement crates.

pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use eip712::{
	compute_domain_hash, compute_final_digest, permit_struct_hash, Eip712AbiEncoder,
	DOMAIN_TYPE, DOMAIN_VERSION, PERMIT_TYPE,
};
pub use formatting::{format_token_amount, truncate_id, with_0x_prefix};
pub use helpers::current_timestamp;
