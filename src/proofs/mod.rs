//! Zero-knowledge proofs checked by the audit
pub mod ballot;
pub mod decryption;
