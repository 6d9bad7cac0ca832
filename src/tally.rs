//! Homomorphic tally of the accepted ballots and recovery of the plaintext counts.
//!
//! The option grids of all ballots are summed by a level-wise reduction on the worker pool.
//! Both authorities' partial decryptions of the sum are then removed from the B components,
//! leaving kG per option, and k is found by baby-step giant-step over [0, n].
use crate::{
    arithmetics::{Point, RAW_LEN},
    ballot::CiphertextGrid,
    error::{AuditError, Result},
    hash::binding_coefficient,
    proofs::decryption::Decryption,
    worker::WorkerPool,
    BigInt,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Sum every grid into one, batch by batch, until a single grid remains. No ballots yield the
/// encryption of zero.
pub fn tally(
    pool: &WorkerPool,
    option_counts: &[usize],
    mut grids: Vec<CiphertextGrid>,
) -> Result<CiphertextGrid> {
    let counts: Arc<Vec<usize>> = Arc::new(option_counts.to_vec());
    let batch = pool.chunk_size().max(2);
    let mut level = 0;
    while grids.len() > 1 {
        let batches: Vec<Vec<CiphertextGrid>> = grids.chunks(batch).map(|chunk| chunk.to_vec()).collect();
        debug!("tally level {}: {} grids in {} batches", level, grids.len(), batches.len());
        let counts = Arc::clone(&counts);
        grids = pool
            .map("addVotesChunk", batches, move |chunk| {
                CiphertextGrid::sum(&counts, &chunk)
            })?
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        level += 1;
    }
    return match grids.pop() {
        Some(sum) => CiphertextGrid::sum(option_counts, &[sum]),
        None => Ok(CiphertextGrid::identity(option_counts)),
    };
}

/// Strip both partial decryptions from every B component of the tally:
/// B - h1 * P_master - h2 * P_commission, with h1 = h(Y_master || Y_commission) and
/// h2 = h(Y_commission || Y_master)
pub fn residuals(
    sums: &CiphertextGrid,
    master_key: &Point,
    master: &Decryption,
    commission_key: &Point,
    commission: &Decryption,
) -> Result<Vec<Vec<Point>>> {
    let counts = sums.get_option_counts();
    for decryption in [master, commission] {
        if decryption.get_option_counts() != counts {
            return Err(AuditError::Shape(format!(
                "decryption shaped {:?}, tally shaped {:?}",
                decryption.get_option_counts(),
                counts
            )));
        }
    }
    let h1 = binding_coefficient(master_key, commission_key)?;
    let h2 = binding_coefficient(commission_key, master_key)?;

    let mut out = Vec::with_capacity(counts.len());
    for (q, row) in sums.get_rows().iter().enumerate() {
        let mut residual_row = Vec::with_capacity(row.len());
        for (o, sum) in row.iter().enumerate() {
            let (p1, p2) = match (master.get(q, o), commission.get(q, o)) {
                (Some(p1), Some(p2)) => (p1.p, p2.p),
                _ => return Err(AuditError::Shape(format!("no share for {}:{}", q, o))),
            };
            let combined = p1.mul_scalar(&h1) + p2.mul_scalar(&h2);
            residual_row.push(sum.b - combined);
        }
        out.push(residual_row);
    }
    return Ok(out);
}

/// Baby-step table j*G -> j for j < m, shared by all searches of one batch
struct BabySteps {
    table: HashMap<[u8; RAW_LEN], u64>,
    width: u64,
}

impl BabySteps {
    fn new(bound: u64) -> Self {
        let width = integer_sqrt(bound) + 1;
        let g = Point::generator();
        let mut table = HashMap::with_capacity(width as usize);
        let mut current = Point::Identity;
        for j in 0..width {
            table.entry(current.to_le_bytes()).or_insert(j);
            current = current + g;
        }
        return Self { table, width };
    }

    /// Find k in [0, bound] with kG == target
    fn solve(&self, target: &Point, bound: u64) -> Option<u64> {
        let giant = -Point::generator().mul(&BigInt::from_u64(self.width));
        let mut gamma = *target;
        for i in 0..=(bound / self.width) {
            if let Some(j) = self.table.get(&gamma.to_le_bytes()) {
                let k = i * self.width + j;
                return if k <= bound { Some(k) } else { None };
            }
            gamma = gamma + giant;
        }
        return None;
    }
}

fn integer_sqrt(n: u64) -> u64 {
    let mut root = (n as f64).sqrt() as u64;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    return root;
}

/// Find k in [0, bound] with kG == target
pub fn discrete_log(target: &Point, bound: u64) -> Option<u64> {
    return BabySteps::new(bound).solve(target, bound);
}

/// Solve a batch of targets against one baby-step table
pub fn discrete_logs(targets: &[Point], bound: u64) -> Vec<Option<u64>> {
    let steps = BabySteps::new(bound);
    return targets.iter().map(|target| steps.solve(target, bound)).collect();
}

/// Turn residuals into counts. The identity is a count of zero and is not searched for; the
/// other residuals are deduplicated and solved in one call on the pool. A residual with no
/// logarithm in [0, bound] fails the whole recovery.
pub fn recover_counts(
    pool: &WorkerPool,
    residuals: &[Vec<Point>],
    bound: u64,
) -> Result<Vec<Vec<u64>>> {
    let mut targets: Vec<Point> = Vec::new();
    for point in residuals.iter().flatten() {
        if !point.is_identity() && !targets.contains(point) {
            targets.push(*point);
        }
    }
    debug!("solving {} distinct discrete logs up to {}", targets.len(), bound);

    let batch = targets.clone();
    let solutions = pool.call("solveDLP", move || discrete_logs(&batch, bound))?;
    let mut solved: HashMap<[u8; RAW_LEN], u64> = HashMap::with_capacity(targets.len());
    for (target, solution) in targets.iter().zip(solutions) {
        match solution {
            Some(k) => {
                solved.insert(target.to_le_bytes(), k);
            }
            None => {
                let point = target
                    .to_compressed()
                    .map(hex::encode)
                    .unwrap_or_default();
                return Err(AuditError::DlpUnsolvable { point, bound });
            }
        }
    }

    return Ok(residuals
        .iter()
        .map(|row| {
            row.iter()
                .map(|point| solved.get(&point.to_le_bytes()).copied().unwrap_or(0))
                .collect()
        })
        .collect());
}
