//! Non-interactive proof that a ballot ciphertext encrypts one of a set of candidate values.
//!
//! The statement is an ElGamal ciphertext (A, B) = (rG, rY + mG) under the poll's main key Y.
//! For every candidate m_i the prover supplies a branch (As_i, Bs_i, c_i, r_i); all branches
//! but the true one are simulated. The verifier recomputes each branch commitment from its
//! response and challenge share, and checks that the challenge shares add up to the
//! Fiat-Shamir challenge of the whole transcript. A simulated branch can only be made to
//! satisfy its equations after its challenge share is fixed, so at most one branch is honest.
//!
//! A bulletin is well formed when every option slot proves m in {0, 1}, every per-question
//! sum slot proves m in [min, max], and each sum slot really is the sum of its options.
use crate::{
    arithmetics::{Point, Scalar},
    ballot::{Bulletin, Ciphertext, Dimension, SlotProof},
    error::AuditError,
    hash::challenge,
    BigInt,
};

/// Candidate values of an individual option
pub const OPTION_CANDIDATES: [u64; 2] = [0, 1];

impl SlotProof {
    /// The challenge the branch shares must add up to:
    /// H(Y || A || B || As_0 || Bs_0 || ... ) with every point in raw little-endian form
    pub fn expected_challenge(&self, key: &Point) -> Scalar {
        let mut points = vec![key, &self.ciphertext.a, &self.ciphertext.b];
        for (a, b) in self.commitments_a.iter().zip(self.commitments_b.iter()) {
            points.push(a);
            points.push(b);
        }
        return challenge(&[], &points);
    }

    /// Verify the disjunction "the ciphertext encrypts one of `candidates`"
    pub fn verify(&self, key: &Point, candidates: &[u64]) -> bool {
        let branches = candidates.len();
        if branches == 0
            || self.commitments_a.len() != branches
            || self.commitments_b.len() != branches
            || self.challenges.len() != branches
            || self.responses.len() != branches
        {
            return false;
        }

        let total = self
            .challenges
            .iter()
            .fold(Scalar::ZERO, |acc, share| acc.add(share));
        if total != self.expected_challenge(key) {
            return false;
        }

        let g = Point::generator();
        let Ciphertext { a, b } = self.ciphertext;
        return candidates.iter().enumerate().all(|(i, m)| {
            let c = &self.challenges[i];
            let r = &self.responses[i];
            let shifted = b - g.mul(&BigInt::from_u64(*m));
            let first = g.mul_scalar(r) == self.commitments_a[i] + a.mul_scalar(c);
            let second = key.mul_scalar(r) == self.commitments_b[i] + shifted.mul_scalar(c);
            first && second
        });
    }
}

/// Check the structure and every slot proof of a bulletin against the main key
pub fn verify_bulletin(
    key: &Point,
    dimension: &Dimension,
    bulletin: &Bulletin,
) -> Result<(), AuditError> {
    if !bulletin.matches(dimension) {
        return Err(AuditError::RangeProofInvalid(
            "bulletin does not match the poll dimension".to_string(),
        ));
    }

    for (q, (question, shape)) in bulletin
        .get_questions()
        .iter()
        .zip(dimension.get_questions())
        .enumerate()
    {
        for (o, slot) in question.options.iter().enumerate() {
            if !slot.verify(key, &OPTION_CANDIDATES) {
                return Err(AuditError::RangeProofInvalid(format!(
                    "question {} option {}",
                    q, o
                )));
            }
        }

        let a = Point::sum(question.options.iter().map(|slot| &slot.ciphertext.a));
        let b = Point::sum(question.options.iter().map(|slot| &slot.ciphertext.b));
        if question.sum.ciphertext != Ciphertext::new(a, b) {
            return Err(AuditError::RangeProofInvalid(format!(
                "question {} sum does not match its options",
                q
            )));
        }
        if !question.sum.verify(key, &shape.sum_candidates()) {
            return Err(AuditError::RangeProofInvalid(format!(
                "question {} sum out of [{}, {}]",
                q, shape.min, shape.max
            )));
        }
    }
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ballot::QuestionShape, testing};

    fn setup() -> (Scalar, Point) {
        let secret = testing::random_scalar();
        return (secret, Point::generator().mul_scalar(&secret));
    }

    #[test]
    fn test_honest_slot_verifies() {
        let (_, key) = setup();
        for m in [0u64, 1] {
            let (slot, _) = testing::prove_slot(&key, m, &OPTION_CANDIDATES);
            assert!(slot.verify(&key, &OPTION_CANDIDATES));
        }
        let (slot, _) = testing::prove_slot(&key, 3, &[1, 2, 3, 4]);
        assert!(slot.verify(&key, &[1, 2, 3, 4]));
    }

    #[test]
    fn test_out_of_range_value_fails() {
        let (_, key) = setup();
        // the prover cannot pick a true branch, so every branch is simulated
        let (slot, _) = testing::prove_slot(&key, 2, &OPTION_CANDIDATES);
        assert!(!slot.verify(&key, &OPTION_CANDIDATES));
    }

    #[test]
    fn test_tampered_slot_fails() {
        let (_, key) = setup();
        let (slot, _) = testing::prove_slot(&key, 1, &OPTION_CANDIDATES);

        let mut bad_response = slot.clone();
        bad_response.responses[0] = bad_response.responses[0].add(&Scalar::ONE);
        assert!(!bad_response.verify(&key, &OPTION_CANDIDATES));

        let mut bad_ciphertext = slot.clone();
        bad_ciphertext.ciphertext.b = bad_ciphertext.ciphertext.b + Point::generator();
        assert!(!bad_ciphertext.verify(&key, &OPTION_CANDIDATES));

        let mut short = slot.clone();
        short.challenges.pop();
        assert!(!short.verify(&key, &OPTION_CANDIDATES));

        let (_, other_key) = setup();
        assert!(!slot.verify(&other_key, &OPTION_CANDIDATES));
    }

    #[test]
    fn test_verify_bulletin() {
        let (_, key) = setup();
        let dimension = Dimension::new(vec![
            QuestionShape { min: 1, max: 1, options: 3 },
            QuestionShape { min: 0, max: 2, options: 2 },
        ]);
        let bulletin = testing::make_bulletin(&key, &dimension, &[vec![0, 1, 0], vec![1, 1]]);
        assert_eq!(verify_bulletin(&key, &dimension, &bulletin), Ok(()));

        // choosing two options where exactly one is allowed
        let overvote = testing::make_bulletin(&key, &dimension, &[vec![1, 1, 0], vec![0, 0]]);
        assert!(matches!(
            verify_bulletin(&key, &dimension, &overvote),
            Err(AuditError::RangeProofInvalid(_))
        ));

        let narrow = Dimension::new(vec![QuestionShape { min: 1, max: 1, options: 3 }]);
        assert!(matches!(
            verify_bulletin(&key, &narrow, &bulletin),
            Err(AuditError::RangeProofInvalid(_))
        ));
    }

    #[test]
    fn test_unbounded_sum_range_is_rejected() {
        let (_, key) = setup();
        let honest = Dimension::new(vec![QuestionShape { min: 1, max: 1, options: 2 }]);
        let bulletin = testing::make_bulletin(&key, &honest, &[vec![0, 1]]);
        let unbounded = Dimension::new(vec![QuestionShape { min: 0, max: u64::MAX, options: 2 }]);
        assert!(matches!(
            verify_bulletin(&key, &unbounded, &bulletin),
            Err(AuditError::RangeProofInvalid(_))
        ));
    }

    #[test]
    fn test_sum_slot_must_match_options() {
        let (_, key) = setup();
        let dimension = Dimension::new(vec![QuestionShape { min: 1, max: 1, options: 2 }]);
        let mut bulletin = testing::make_bulletin(&key, &dimension, &[vec![1, 0]]);
        // a valid proof for a sum unrelated to the options
        let (detached, _) = testing::prove_slot(&key, 1, &[1]);
        bulletin.get_questions_mut()[0].sum = detached;
        assert!(matches!(
            verify_bulletin(&key, &dimension, &bulletin),
            Err(AuditError::RangeProofInvalid(_))
        ));
    }
}
