//! The audit: replay, verify, tally, decrypt and compare.
use crate::{
    ballot::{Bulletin, CiphertextGrid},
    config::ValidationConfig,
    error::{AuditError, Result},
    ledger::{LedgerSource, Transaction},
    proofs::{ballot::verify_bulletin, decryption::verify_decryption},
    signatures::{verify_transaction_signature, EligibilityKey},
    state::ContractState,
    tally::{recover_counts, residuals, tally},
    worker::WorkerPool,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, error, info, warn};

/// A transaction or ballot excluded from the audit, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub tx_id: String,
    pub error: AuditError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub active_transactions: usize,
    pub rejected: Vec<Rejection>,
    /// Later votes of a sender who had already voted
    pub duplicate_votes: usize,
    pub valid_ballots: usize,
    pub master_decryption_valid: bool,
    pub commission_decryption_valid: bool,
    /// The tally written to the contract, if any
    pub published: Option<Vec<Vec<u64>>>,
    pub calculated: Vec<Vec<u64>>,
}

impl AuditReport {
    pub fn results_match(&self) -> bool {
        return self.published.as_ref() == Some(&self.calculated);
    }

    /// Both decryptions proven correct and the recovered tally equal to the published one
    pub fn is_consistent(&self) -> bool {
        return self.results_match()
            && self.master_decryption_valid
            && self.commission_decryption_valid;
    }
}

pub struct Auditor {
    config: ValidationConfig,
    pool: WorkerPool,
}

impl Auditor {
    pub fn new(config: ValidationConfig, pool: WorkerPool) -> Self {
        return Self { config, pool };
    }

    pub fn get_config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn get_pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Replay a directory of ledger exports and audit the result
    pub fn audit_source(&self, source: &LedgerSource, contract_id: &str) -> Result<AuditReport> {
        info!("replaying ledger of contract {}", contract_id);
        let ledger = source.replay(contract_id)?;
        return self.audit(ledger.into_active());
    }

    /// Audit the active transactions of a replayed ledger
    pub fn audit(&self, transactions: Vec<Transaction>) -> Result<AuditReport> {
        let active_transactions = transactions.len();
        let mut rejected = Vec::new();

        let transactions = self.check_transactions(transactions, &mut rejected)?;
        let state = ContractState::from_transactions(&transactions)?;
        if let Err(e) = state.get_main_key() {
            error!("{}", e);
        }
        if let Err(e) = state.get_voting_base() {
            error!("{}", e);
        }

        let (votes, duplicate_votes) = unique_votes(&transactions);
        info!("{} votes to check, {} repeated votes ignored", votes.len(), duplicate_votes);
        let grids = self.check_ballots(&state, votes, &mut rejected)?;
        let valid_ballots = grids.len();

        let option_counts = state.get_dimension()?.get_option_counts();
        let sums = tally(&self.pool, &option_counts, grids)?;
        info!("encrypted sum computed over {} valid ballots", valid_ballots);

        if self.config.debug {
            match state.get_results() {
                Ok(results) => {
                    let totals: Vec<u64> = results.iter().map(|row| row.iter().sum()).collect();
                    info!("per-question sums of the published results: {:?}", totals);
                }
                Err(e) => warn!("{}", e),
            }
        }

        let dkg_key = *state.get_dkg_key()?;
        let commission_key = *state.get_commission_key()?;
        let master = state.get_master_decryption()?.clone();
        let commission = state.get_commission_decryption()?.clone();
        let ctx = state.get_voting_base()?.get_context().to_vec();

        let sums = Arc::new(sums);
        let shared = Arc::clone(&sums);
        let verdicts = self.pool.map(
            "validateDecryption",
            vec![(dkg_key, master.clone()), (commission_key, commission.clone())],
            move |(key, decryption)| verify_decryption(&ctx, &shared, &key, &decryption),
        )?;
        let master_decryption_valid = report_decryption("master", &verdicts[0]);
        let commission_decryption_valid = report_decryption("commission", &verdicts[1]);

        let points = residuals(&sums, &dkg_key, &master, &commission_key, &commission)?;
        let calculated = recover_counts(&self.pool, &points, valid_ballots as u64)?;

        let published = state.get_results().ok().cloned();
        let report = AuditReport {
            active_transactions,
            rejected,
            duplicate_votes,
            valid_ballots,
            master_decryption_valid,
            commission_decryption_valid,
            published,
            calculated,
        };
        info!("published result:  {:?}", report.published);
        info!("calculated result: {:?}", report.calculated);
        if report.results_match() {
            info!("results are equal");
        } else {
            error!("results differ");
        }
        return Ok(report);
    }

    /// Verify sender signatures and mark the transactions that pass as valid
    fn check_transactions(
        &self,
        mut transactions: Vec<Transaction>,
        rejected: &mut Vec<Rejection>,
    ) -> Result<Vec<Transaction>> {
        if !self.config.verify_tx_signatures {
            for tx in transactions.iter_mut() {
                tx.valid = true;
            }
            return Ok(transactions);
        }

        info!("checking {} transaction signatures", transactions.len());
        let shared = Arc::new(transactions);
        let view = Arc::clone(&shared);
        let verdicts = self.pool.map(
            "validateTxSignature",
            (0..shared.len()).collect::<Vec<usize>>(),
            move |idx| verify_transaction_signature(&view[idx]),
        )?;
        let mut transactions = Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone());
        for (tx, verdict) in transactions.iter_mut().zip(verdicts) {
            match verdict {
                Ok(()) => tx.valid = true,
                Err(e) => {
                    error!("{:>44}: {}", tx.id, e);
                    rejected.push(Rejection {
                        tx_id: tx.id.clone(),
                        error: e,
                    });
                }
            }
        }
        return Ok(transactions);
    }

    /// Check eligibility and well-formedness of every vote; the ballots that pass are returned
    /// as ciphertext grids
    fn check_ballots(
        &self,
        state: &ContractState,
        votes: Vec<Transaction>,
        rejected: &mut Vec<Rejection>,
    ) -> Result<Vec<CiphertextGrid>> {
        let base = state.get_voting_base()?;
        let dimension = base.dimension.clone();
        let eligibility = if self.config.verify_blind_signatures {
            Some(EligibilityKey::from_voting_base(base)?)
        } else {
            None
        };
        let main_key = if self.config.verify_proofs {
            Some(*state.get_main_key()?)
        } else {
            None
        };

        let ids: Vec<String> = votes.iter().map(|tx| tx.id.clone()).collect();
        let verdicts = self.pool.map("validateBulletin", votes, move |tx: Transaction| -> Result<CiphertextGrid> {
            if let Some(key) = &eligibility {
                key.verify(&tx)?;
            }
            let bulletin = Bulletin::from_transaction(&tx)?;
            match &main_key {
                Some(key) => verify_bulletin(key, &dimension, &bulletin)?,
                None if !bulletin.matches(&dimension) => {
                    return Err(AuditError::Shape(
                        "bulletin does not match the poll dimension".to_string(),
                    ))
                }
                None => {}
            }
            Ok(bulletin.to_grid())
        })?;

        let mut grids = Vec::with_capacity(verdicts.len());
        for (id, verdict) in ids.into_iter().zip(verdicts) {
            match verdict {
                Ok(grid) => {
                    debug!("{:>44}: ballot accepted", id);
                    grids.push(grid);
                }
                Err(e) => {
                    error!("{:>44}: {}", id, e);
                    rejected.push(Rejection { tx_id: id, error: e });
                }
            }
        }
        return Ok(grids);
    }
}

/// Valid votes in ledger order, keeping only the first vote of each sender
fn unique_votes(transactions: &[Transaction]) -> (Vec<Transaction>, usize) {
    let mut voted = HashSet::new();
    let mut votes = Vec::new();
    let mut duplicates = 0;
    for tx in transactions.iter().filter(|tx| tx.valid && tx.is_vote()) {
        if voted.insert(tx.sender_public_key.as_str()) {
            votes.push(tx.clone());
        } else {
            debug!("{:>44}: repeated vote of {} ignored", tx.id, tx.sender_public_key);
            duplicates += 1;
        }
    }
    return (votes, duplicates);
}

fn report_decryption(authority: &str, verdict: &Result<()>) -> bool {
    match verdict {
        Ok(()) => {
            info!("{} decryption is correct", authority);
            true
        }
        Err(e) => {
            error!("{} decryption is incorrect: {}", authority, e);
            false
        }
    }
}
