//! Independent auditor for ledger-recorded, homomorphically encrypted elections.
//!
//! The crate replays contract transactions exported from the ledger, checks every
//! cryptographic claim the voting protocol makes (transaction signatures, blind-signature
//! eligibility, ballot range proofs, decryption proofs), sums the valid ballots under
//! encryption, and recovers the plaintext tally for comparison with the published one.
use crypto_bigint::{Uint, U256};

/// Use the same big integer type for every curve coordinate and scalar
pub const LIMBS: usize = U256::LIMBS;
pub type BigInt = Uint<LIMBS>;

pub mod arithmetics;
pub mod ballot;
pub mod config;
pub mod error;
pub mod hash;
pub mod keys;
pub mod ledger;
pub mod pipeline;
pub mod proofs;
pub mod signatures;
pub mod state;
pub mod tally;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
