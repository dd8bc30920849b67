//! Solidity struct declarations shared by the escrow contracts and the filler.

pub mod bridge;
