//! Contract state reconstructed from the ledger.
//!
//! The state is folded once from the diffs of every valid, state-relevant transaction, later
//! writes to a key replacing earlier ones. The reserved keys the audit depends on are then
//! parsed into typed values; everything else is kept as raw data entries.
use crate::{
    arithmetics::Point,
    ballot::Dimension,
    error::{AuditError, Result},
    keys::{RsaKey, TeZhuKey},
    ledger::{DataValue, Transaction},
    proofs::decryption::Decryption,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const MAIN_KEY: &str = "MAIN_KEY";
pub const VOTING_BASE: &str = "VOTING_BASE";
pub const DKG_KEY: &str = "DKG_KEY";
pub const COMMISSION_KEY: &str = "COMMISSION_KEY";
pub const DECRYPTION_PREFIX: &str = "DECRYPTION_";
pub const COMMISSION_DECRYPTION: &str = "COMMISSION_DECRYPTION";
pub const RESULTS: &str = "RESULTS";

/// Blind signature schemes a poll may certify its voters with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindSignatureScheme {
    TeZhu,
    Rsa,
}

/// Poll configuration published at the start of voting
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingBase {
    #[serde(default)]
    pub poll_id: String,
    pub dimension: Dimension,
    pub blind_sig_type: String,
    #[serde(default)]
    pub blind_sig_params: Vec<String>,
    #[serde(default)]
    pub blind_sig_modulo: Option<String>,
    #[serde(default)]
    pub blind_sig_exponent: Option<String>,
}

impl VotingBase {
    pub fn get_scheme(&self) -> Result<BlindSignatureScheme> {
        match self.blind_sig_type.as_str() {
            "TeZhu" => Ok(BlindSignatureScheme::TeZhu),
            "RSA" => Ok(BlindSignatureScheme::Rsa),
            other => Err(AuditError::UnknownScheme(other.to_string())),
        }
    }

    pub fn get_tezhu_key(&self) -> Result<TeZhuKey> {
        let encoded = self
            .blind_sig_params
            .first()
            .ok_or_else(|| malformed(VOTING_BASE, "blindSigParams is empty"))?;
        return TeZhuKey::from_hex(encoded).map_err(|e| malformed(VOTING_BASE, &e.to_string()));
    }

    pub fn get_rsa_key(&self) -> Result<RsaKey> {
        match (&self.blind_sig_modulo, &self.blind_sig_exponent) {
            (Some(modulus), Some(exponent)) => RsaKey::from_hex(modulus, exponent)
                .map_err(|e| malformed(VOTING_BASE, &e.to_string())),
            _ => Err(malformed(
                VOTING_BASE,
                "blindSigModulo and blindSigExponent are required",
            )),
        }
    }

    /// Context string of the decryption proofs
    pub fn get_context(&self) -> &[u8] {
        self.poll_id.as_bytes()
    }
}

fn malformed(key: &str, reason: &str) -> AuditError {
    return AuditError::MalformedState {
        key: key.to_string(),
        reason: reason.to_string(),
    };
}

fn missing(key: &str) -> AuditError {
    return AuditError::MissingState(key.to_string());
}

/// Reserved values are JSON or hex carried in string entries
fn text<'a>(key: &str, value: &'a DataValue) -> Result<&'a str> {
    return value
        .as_str()
        .ok_or_else(|| malformed(key, "expected a string entry"));
}

fn parse_point(key: &str, value: &DataValue) -> Result<Point> {
    return Point::from_hex(text(key, value)?).map_err(|e| malformed(key, &e.to_string()));
}

fn parse_json<T: serde::de::DeserializeOwned>(key: &str, value: &DataValue) -> Result<T> {
    return serde_json::from_str(text(key, value)?).map_err(|e| malformed(key, &e.to_string()));
}

#[derive(Debug, Clone, Default)]
pub struct ContractState {
    entries: BTreeMap<String, DataValue>,
    main_key: Option<Point>,
    voting_base: Option<VotingBase>,
    dkg_key: Option<Point>,
    commission_key: Option<Point>,
    master_decryption: Option<Decryption>,
    commission_decryption: Option<Decryption>,
    results: Option<Vec<Vec<u64>>>,
}

impl ContractState {
    /// Fold the diffs of the valid, state-relevant transactions in ledger order
    pub fn from_transactions<'a, I>(transactions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut entries = BTreeMap::new();
        let mut folded = 0;
        for tx in transactions {
            if !tx.valid || !tx.is_state_relevant() {
                continue;
            }
            folded += 1;
            for (key, value) in &tx.diff {
                entries.insert(key.clone(), value.clone());
            }
        }
        debug!("contract state folded from {} transactions", folded);
        return Self::from_entries(entries);
    }

    /// Parse the reserved keys out of the raw entries
    pub fn from_entries(entries: BTreeMap<String, DataValue>) -> Result<Self> {
        let mut state = Self::default();
        let mut master_decryptions = Vec::new();
        for (key, value) in &entries {
            match key.as_str() {
                MAIN_KEY => state.main_key = Some(parse_point(key, value)?),
                VOTING_BASE => {
                    let base: VotingBase = parse_json(key, value)?;
                    base.dimension.validate().map_err(|reason| malformed(key, &reason))?;
                    state.voting_base = Some(base);
                }
                DKG_KEY => state.dkg_key = Some(parse_point(key, value)?),
                COMMISSION_KEY => state.commission_key = Some(parse_point(key, value)?),
                COMMISSION_DECRYPTION => {
                    let decryption = Decryption::from_json(text(key, value)?)
                        .map_err(|reason| malformed(key, &reason))?;
                    state.commission_decryption = Some(decryption);
                }
                RESULTS => state.results = Some(parse_json(key, value)?),
                _ if key.starts_with(DECRYPTION_PREFIX) => {
                    let decryption = Decryption::from_json(text(key, value)?)
                        .map_err(|reason| malformed(key, &reason))?;
                    master_decryptions.push((key.clone(), decryption));
                }
                _ => {}
            }
        }
        if master_decryptions.len() > 1 {
            warn!(
                "{} master decryptions published, using {}",
                master_decryptions.len(),
                master_decryptions[master_decryptions.len() - 1].0
            );
        }
        // keys iterate in order, so the greatest key is the one kept
        state.master_decryption = master_decryptions.pop().map(|(_, decryption)| decryption);
        state.entries = entries;
        return Ok(state);
    }

    pub fn get_entry(&self, key: &str) -> Option<&DataValue> {
        return self.entries.get(key);
    }

    pub fn get_entries(&self) -> &BTreeMap<String, DataValue> {
        &self.entries
    }

    pub fn get_main_key(&self) -> Result<&Point> {
        return self.main_key.as_ref().ok_or_else(|| missing(MAIN_KEY));
    }

    pub fn get_voting_base(&self) -> Result<&VotingBase> {
        return self.voting_base.as_ref().ok_or_else(|| missing(VOTING_BASE));
    }

    pub fn get_dimension(&self) -> Result<&Dimension> {
        return self.get_voting_base().map(|base| &base.dimension);
    }

    pub fn get_dkg_key(&self) -> Result<&Point> {
        return self.dkg_key.as_ref().ok_or_else(|| missing(DKG_KEY));
    }

    pub fn get_commission_key(&self) -> Result<&Point> {
        return self.commission_key.as_ref().ok_or_else(|| missing(COMMISSION_KEY));
    }

    pub fn get_master_decryption(&self) -> Result<&Decryption> {
        return self
            .master_decryption
            .as_ref()
            .ok_or_else(|| missing("DECRYPTION_*"));
    }

    pub fn get_commission_decryption(&self) -> Result<&Decryption> {
        return self
            .commission_decryption
            .as_ref()
            .ok_or_else(|| missing(COMMISSION_DECRYPTION));
    }

    pub fn get_results(&self) -> Result<&Vec<Vec<u64>>> {
        return self.results.as_ref().ok_or_else(|| missing(RESULTS));
    }
}
