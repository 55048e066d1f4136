//! # graphite-tests
//!
//! Integration tests spanning the Graphite crates: chain scenarios, mempool
//! interplay, pow pipeline end-to-end and two-peer protocol exchanges.

pub mod harness;

#[cfg(test)]
mod chain_tests;


#[cfg(test)]
mod network_tests;

#[cfg(test)]
mod pow_tests;

pub use harness::*;
