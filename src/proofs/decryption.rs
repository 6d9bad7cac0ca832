//! Correctness of the partial decryptions published by the two decryption authorities.
//!
//! An authority holding secret x with public key Y = xG publishes, for every option of the
//! tally, P = x * sum(A) together with a Chaum-Pedersen proof that log_G(Y) = log_sum(A)(P).
use crate::{
    arithmetics::{scalar_from_hex, Point, Scalar},
    ballot::CiphertextGrid,
    error::{AuditError, EncodingError},
    hash::challenge,
};
use serde::Deserialize;

/// Proof transcript (w, U1, U2) of equality of two discrete logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DleqProof {
    pub w: Scalar,
    pub u1: Point,
    pub u2: Point,
}

/// The claim log_G1(Y1) = log_G2(Y2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DleqStatement {
    pub g1: Point,
    pub y1: Point,
    pub g2: Point,
    pub y2: Point,
}

impl DleqStatement {
    /// The Fiat-Shamir challenge v over ctx, the commitments and the statement
    pub fn challenge(&self, ctx: &[u8], u1: &Point, u2: &Point) -> Scalar {
        return challenge(ctx, &[u1, u2, &self.g1, &self.y1, &self.g2, &self.y2]);
    }

    /// Accept iff w*G1 == v*Y1 + U1 and w*G2 == v*Y2 + U2
    pub fn verify(&self, ctx: &[u8], proof: &DleqProof) -> bool {
        let v = self.challenge(ctx, &proof.u1, &proof.u2);
        let first = self.g1.mul_scalar(&proof.w) == self.y1.mul_scalar(&v) + proof.u1;
        let second = self.g2.mul_scalar(&proof.w) == self.y2.mul_scalar(&v) + proof.u2;
        return first && second;
    }
}

/// One authority's partial decryption of one option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionShare {
    pub p: Point,
    pub proof: DleqProof,
}

#[derive(Debug, Deserialize)]
struct RawShare {
    #[serde(rename = "P")]
    p: String,
    w: String,
    #[serde(rename = "U1")]
    u1: String,
    #[serde(rename = "U2")]
    u2: String,
}

impl RawShare {
    fn decode(&self) -> Result<DecryptionShare, EncodingError> {
        return Ok(DecryptionShare {
            p: Point::from_hex(&self.p)?,
            proof: DleqProof {
                w: scalar_from_hex(&self.w)?,
                u1: Point::from_hex(&self.u1)?,
                u2: Point::from_hex(&self.u2)?,
            },
        });
    }
}

/// All shares of one authority, per question and option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decryption(Vec<Vec<DecryptionShare>>);

impl Decryption {
    pub fn new(shares: Vec<Vec<DecryptionShare>>) -> Self {
        return Self(shares);
    }

    /// Parse the published form: `[[{"P", "w", "U1", "U2"}, ...], ...]` with compressed hex
    /// points and big-endian hex w
    pub fn from_json(encoded: &str) -> Result<Self, String> {
        let raw: Vec<Vec<RawShare>> = serde_json::from_str(encoded).map_err(|e| e.to_string())?;
        let shares = raw
            .iter()
            .map(|row| row.iter().map(RawShare::decode).collect::<Result<Vec<_>, _>>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        return Ok(Self(shares));
    }

    pub fn get(&self, question: usize, option: usize) -> Option<&DecryptionShare> {
        return self.0.get(question).and_then(|row| row.get(option));
    }

    pub fn get_option_counts(&self) -> Vec<usize> {
        return self.0.iter().map(|row| row.len()).collect();
    }
}

/// Check every share of an authority with public key `key` against the encrypted tally
pub fn verify_decryption(
    ctx: &[u8],
    sums: &CiphertextGrid,
    key: &Point,
    decryption: &Decryption,
) -> Result<(), AuditError> {
    if decryption.get_option_counts() != sums.get_option_counts() {
        return Err(AuditError::DecryptionProofInvalid(format!(
            "shares shaped {:?}, tally shaped {:?}",
            decryption.get_option_counts(),
            sums.get_option_counts()
        )));
    }
    for (q, row) in sums.get_rows().iter().enumerate() {
        for (o, sum) in row.iter().enumerate() {
            let share = decryption.get(q, o).ok_or_else(|| {
                AuditError::DecryptionProofInvalid(format!("no share for question {} option {}", q, o))
            })?;
            let statement = DleqStatement {
                g1: sum.a,
                y1: share.p,
                g2: Point::generator(),
                y2: *key,
            };
            if !statement.verify(ctx, &share.proof) {
                return Err(AuditError::DecryptionProofInvalid(format!(
                    "question {} option {}",
                    q, o
                )));
            }
        }
    }
    return Ok(());
}
