//! Error taxonomy of the audit
use crate::worker::WorkerError;
use thiserror::Error;

/// Failures while decoding points, scalars and the textual encodings they travel in
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("unexpected point length: {0} bytes")]
    PointLength(usize),

    #[error("unknown point prefix 0x{0:02x}")]
    PointPrefix(u8),

    #[error("point is not on the curve")]
    NotOnCurve,

    #[error("point at infinity cannot be encoded")]
    Infinity,

    #[error("unexpected scalar length: {0} bytes")]
    ScalarLength(usize),

    #[error("scalar is not reduced modulo the group order")]
    NonCanonicalScalar,

    #[error("{0} of length {1} does not fit its length prefix")]
    TooLong(&'static str, usize),

    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("invalid base58: {0}")]
    Base58(String),

    #[error("invalid base64: {0}")]
    Base64(String),
}

/// Everything the audit can report. Per-item variants (signatures, proofs) end up attached to
/// the rejected transaction; structural variants abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// A ledger record that cannot be parsed; fatal for the file
    #[error("{file}:{line}: malformed record: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    /// A reserved state key holds a value of the wrong shape
    #[error("malformed state value {key}: {reason}")]
    MalformedState { key: String, reason: String },

    #[error("contract state has no {0}")]
    MissingState(String),

    #[error("transaction is not signed")]
    MissingSignature,

    #[error("transaction signature is invalid: {0}")]
    SignatureInvalid(String),

    #[error("blind signature is invalid: {0}")]
    EligibilityInvalid(String),

    #[error("range proof rejected: {0}")]
    RangeProofInvalid(String),

    #[error("decryption proof rejected: {0}")]
    DecryptionProofInvalid(String),

    #[error("no discrete log within [0, {bound}] for point {point}")]
    DlpUnsolvable { point: String, bound: u64 },

    #[error("unknown blind signature scheme {0:?}")]
    UnknownScheme(String),

    #[error("ciphertext grids disagree in shape: {0}")]
    Shape(String),

    #[error("malformed value: {0}")]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AuditError>;
