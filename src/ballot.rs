//! Encrypted ballots: the declared dimension of a poll, ElGamal ciphertexts, the grids they
//! are tallied in, and the bulletin a voter submits.
use crate::{
    arithmetics::{scalar_from_canonical, Point, Scalar},
    error::{AuditError, EncodingError},
    ledger::{DataValue, Transaction},
};
use base64::{engine::general_purpose, Engine as _};
use crypto_bigint::Encoding;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Name of the transaction parameter that carries the bulletin
pub const VOTE_PARAM: &str = "vote";

/// Declared shape of one question: how many options it has and how many of them a voter
/// may choose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "(u64, u64, usize)", into = "(u64, u64, usize)")]
pub struct QuestionShape {
    pub min: u64,
    pub max: u64,
    pub options: usize,
}

impl From<(u64, u64, usize)> for QuestionShape {
    fn from((min, max, options): (u64, u64, usize)) -> Self {
        return Self { min, max, options };
    }
}

impl From<QuestionShape> for (u64, u64, usize) {
    fn from(shape: QuestionShape) -> Self {
        return (shape.min, shape.max, shape.options);
    }
}

impl QuestionShape {
    /// A voter can choose between `min` and `max` options, never more than there are
    pub fn is_consistent(&self) -> bool {
        return self.min <= self.max && self.max <= self.options as u64;
    }

    /// Values the sum slot may encrypt. Empty for an inconsistent shape.
    pub fn sum_candidates(&self) -> Vec<u64> {
        if !self.is_consistent() {
            return vec![];
        }
        return (self.min..=self.max).collect();
    }
}

/// The shape every bulletin of a poll must have, in question order
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Dimension(Vec<QuestionShape>);

impl Dimension {
    pub fn new(questions: Vec<QuestionShape>) -> Self {
        return Self(questions);
    }

    pub fn get_questions(&self) -> &[QuestionShape] {
        &self.0
    }

    /// Option count per question
    pub fn get_option_counts(&self) -> Vec<usize> {
        return self.0.iter().map(|q| q.options).collect();
    }

    /// Reject shapes whose bounds are inverted or exceed the option count
    pub fn validate(&self) -> Result<(), String> {
        for (index, shape) in self.0.iter().enumerate() {
            if !shape.is_consistent() {
                return Err(format!(
                    "question {} expects between {} and {} of {} options",
                    index, shape.min, shape.max, shape.options
                ));
            }
        }
        return Ok(());
    }
}

/// Exponential ElGamal ciphertext (A, B) = (rG, rY + mG)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    pub a: Point,
    pub b: Point,
}

impl Ciphertext {
    pub fn new(a: Point, b: Point) -> Self {
        return Self { a, b };
    }

    pub fn identity() -> Self {
        return Self::new(Point::Identity, Point::Identity);
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: Ciphertext) -> Ciphertext {
        return Ciphertext::new(self.a + rhs.a, self.b + rhs.b);
    }
}

/// One ciphertext per option of every question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextGrid(Vec<Vec<Ciphertext>>);

impl CiphertextGrid {
    pub fn new(rows: Vec<Vec<Ciphertext>>) -> Self {
        return Self(rows);
    }

    /// Encryption of zero with zero randomness, shaped by option counts
    pub fn identity(option_counts: &[usize]) -> Self {
        return Self(
            option_counts
                .iter()
                .map(|options| vec![Ciphertext::identity(); *options])
                .collect(),
        );
    }

    pub fn get_rows(&self) -> &[Vec<Ciphertext>] {
        &self.0
    }

    pub fn get(&self, question: usize, option: usize) -> Option<&Ciphertext> {
        return self.0.get(question).and_then(|row| row.get(option));
    }

    pub fn get_option_counts(&self) -> Vec<usize> {
        return self.0.iter().map(|row| row.len()).collect();
    }

    /// Pointwise sum of two grids of the same shape
    pub fn combine(&self, other: &Self) -> Result<Self, AuditError> {
        if self.get_option_counts() != other.get_option_counts() {
            return Err(AuditError::Shape(format!(
                "{:?} vs {:?}",
                self.get_option_counts(),
                other.get_option_counts()
            )));
        }
        let rows = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(lhs, rhs)| lhs.iter().zip(rhs.iter()).map(|(l, r)| *l + *r).collect())
            .collect();
        return Ok(Self(rows));
    }

    /// Sum many grids of the given shape, one point sum per slot
    pub fn sum(option_counts: &[usize], grids: &[CiphertextGrid]) -> Result<Self, AuditError> {
        for grid in grids {
            if grid.get_option_counts() != option_counts {
                return Err(AuditError::Shape(format!(
                    "{:?} vs {:?}",
                    grid.get_option_counts(),
                    option_counts
                )));
            }
        }
        let rows = option_counts
            .iter()
            .enumerate()
            .map(|(q, options)| {
                (0..*options)
                    .map(|o| {
                        let a = Point::sum(grids.iter().map(|grid| &grid.0[q][o].a));
                        let b = Point::sum(grids.iter().map(|grid| &grid.0[q][o].b));
                        Ciphertext::new(a, b)
                    })
                    .collect()
            })
            .collect();
        return Ok(Self(rows));
    }
}

/// A ciphertext with its disjunctive proof that it encrypts one of a set of candidate values.
/// Branch i consists of the commitments (As[i], Bs[i]), the challenge share c[i] and the
/// response r[i].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotProof {
    pub ciphertext: Ciphertext,
    pub commitments_a: Vec<Point>,
    pub commitments_b: Vec<Point>,
    pub challenges: Vec<Scalar>,
    pub responses: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletinQuestion {
    pub options: Vec<SlotProof>,
    pub sum: SlotProof,
}

/// A voter's complete encrypted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bulletin {
    questions: Vec<BulletinQuestion>,
}

// Wire messages of a bulletin:
//
//   message Bulletin { repeated Question questions = 1; }
//   message Question { repeated Slot options = 1; Slot sum = 2; }
//   message Slot {
//     bytes A = 1; bytes B = 2;
//     repeated bytes As = 3; repeated bytes Bs = 4;
//     repeated bytes c = 5; repeated bytes r = 6;
//   }
//
// Points are 33-byte compressed SEC1, c and r are 32-byte big-endian scalars.
#[derive(Clone, PartialEq, Message)]
struct RawSlot {
    #[prost(bytes = "vec", tag = "1")]
    a: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    b: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    commitments_a: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    commitments_b: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    c: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "6")]
    r: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
struct RawQuestion {
    #[prost(message, repeated, tag = "1")]
    options: Vec<RawSlot>,
    #[prost(message, optional, tag = "2")]
    sum: Option<RawSlot>,
}

#[derive(Clone, PartialEq, Message)]
struct RawBulletin {
    #[prost(message, repeated, tag = "1")]
    questions: Vec<RawQuestion>,
}

fn decode_points(encoded: &[Vec<u8>]) -> Result<Vec<Point>, EncodingError> {
    return encoded.iter().map(|point| Point::from_sec1(point)).collect();
}

fn decode_scalars(encoded: &[Vec<u8>]) -> Result<Vec<Scalar>, EncodingError> {
    return encoded.iter().map(|scalar| scalar_from_canonical(scalar)).collect();
}

fn encode_point(point: &Point) -> Result<Vec<u8>, EncodingError> {
    return Ok(point.to_compressed()?.to_vec());
}

fn encode_scalar(scalar: &Scalar) -> Vec<u8> {
    return scalar.retrieve().to_be_bytes().to_vec();
}

impl RawSlot {
    fn to_slot(&self) -> Result<SlotProof, EncodingError> {
        return Ok(SlotProof {
            ciphertext: Ciphertext::new(Point::from_sec1(&self.a)?, Point::from_sec1(&self.b)?),
            commitments_a: decode_points(&self.commitments_a)?,
            commitments_b: decode_points(&self.commitments_b)?,
            challenges: decode_scalars(&self.c)?,
            responses: decode_scalars(&self.r)?,
        });
    }

    fn from_slot(slot: &SlotProof) -> Result<Self, EncodingError> {
        return Ok(Self {
            a: encode_point(&slot.ciphertext.a)?,
            b: encode_point(&slot.ciphertext.b)?,
            commitments_a: slot.commitments_a.iter().map(encode_point).collect::<Result<_, _>>()?,
            commitments_b: slot.commitments_b.iter().map(encode_point).collect::<Result<_, _>>()?,
            c: slot.challenges.iter().map(encode_scalar).collect(),
            r: slot.responses.iter().map(encode_scalar).collect(),
        });
    }
}

impl Bulletin {
    pub fn new(questions: Vec<BulletinQuestion>) -> Self {
        return Self { questions };
    }

    /// Decode the protobuf message carried in a vote
    pub fn decode(bytes: &[u8]) -> Result<Self, AuditError> {
        let raw = RawBulletin::decode(bytes)
            .map_err(|e| AuditError::RangeProofInvalid(format!("protobuf decode error: {}", e)))?;
        let mut questions = Vec::with_capacity(raw.questions.len());
        for (index, question) in raw.questions.iter().enumerate() {
            let sum = question.sum.as_ref().ok_or_else(|| {
                AuditError::RangeProofInvalid(format!("question {} has no sum slot", index))
            })?;
            questions.push(BulletinQuestion {
                options: question
                    .options
                    .iter()
                    .map(RawSlot::to_slot)
                    .collect::<Result<_, _>>()?,
                sum: sum.to_slot()?,
            });
        }
        return Ok(Self::new(questions));
    }

    /// Extract the bulletin of a vote transaction. The parameter is base64, which the ledger
    /// may already have decoded into a binary entry.
    pub fn from_transaction(tx: &Transaction) -> Result<Self, AuditError> {
        let bytes = match tx.get_param(VOTE_PARAM) {
            Some(DataValue::Binary(bytes)) => bytes.clone(),
            Some(DataValue::String(encoded)) => general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| EncodingError::Base64(e.to_string()))?,
            _ => {
                return Err(AuditError::RangeProofInvalid(
                    "vote carries no bulletin".to_string(),
                ))
            }
        };
        return Self::decode(&bytes);
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        let mut questions = Vec::with_capacity(self.questions.len());
        for question in &self.questions {
            questions.push(RawQuestion {
                options: question
                    .options
                    .iter()
                    .map(RawSlot::from_slot)
                    .collect::<Result<_, _>>()?,
                sum: Some(RawSlot::from_slot(&question.sum)?),
            });
        }
        return Ok(RawBulletin { questions }.encode_to_vec());
    }

    pub fn get_questions(&self) -> &[BulletinQuestion] {
        &self.questions
    }

    pub fn get_questions_mut(&mut self) -> &mut [BulletinQuestion] {
        &mut self.questions
    }

    /// Whether question and option counts agree with the poll's dimension
    pub fn matches(&self, dimension: &Dimension) -> bool {
        return self.questions.len() == dimension.get_questions().len()
            && self
                .questions
                .iter()
                .zip(dimension.get_questions())
                .all(|(question, shape)| question.options.len() == shape.options);
    }

    /// The per-option ciphertexts that enter the tally
    pub fn to_grid(&self) -> CiphertextGrid {
        return CiphertextGrid::new(
            self.questions
                .iter()
                .map(|question| question.options.iter().map(|slot| slot.ciphertext).collect())
                .collect(),
        );
    }
}
