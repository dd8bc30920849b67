//! Naming contract for pluggable backends.
//!
//! Storage, account, verifier and proof backends are all chosen by name from
//! configuration. Each backend module exposes a `Registry` unit struct that
//! ties its configuration key to the factory that builds it.

/// Associates a configuration key with a factory function.
pub trait ImplementationRegistry {
	/// Key under `<section>.implementations` that selects this backend,
	/// such as `"memory"` or `"attestation"`.
	const NAME: &'static str;

	/// Factory signature defined by the owning crate.
	type Factory;

	/// Returns the factory that builds this backend from its TOML table.
	fn factory() -> Self::Factory;
}
