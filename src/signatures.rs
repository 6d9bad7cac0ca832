//! Transaction authenticity and voter eligibility.
//!
//! Every transaction is signed by its sender with GOST R 34.10-2012 over Streebog-256. A vote
//! additionally carries a blind signature on the voter's public key, issued by the poll
//! organiser without seeing the key, which proves the voter was on the list.
use crate::{
    arithmetics::{uint_from_be, Point, Scalar, CURVE_ORDER},
    error::{AuditError, Result},
    hash::{base_hash, hash_to_scalar},
    keys::{le_scalars, uint_from_be_padded, RsaInt, RsaKey, SenderKey, TeZhuKey},
    ledger::{DataValue, Transaction},
    state::{BlindSignatureScheme, VotingBase},
    BigInt,
};
use base64::{engine::general_purpose, Engine as _};
use crypto_bigint::modular::runtime_mod::{DynResidue, DynResidueParams};

/// Name of the transaction parameter that carries the blind signature
pub const BLIND_SIGNATURE_PARAM: &str = "blindSig";

/// Length of a TeZhu signature: c, s, y and t
pub const TEZHU_SIGNATURE_LEN: usize = 128;

const GOST_SIGNATURE_LEN: usize = 64;

/// Verify a GOST R 34.10-2012 signature (s || r, both big-endian) on a digest.
///
/// e = digest mod q (1 if that is 0), v = e^-1, z1 = s*v, z2 = -r*v, and the signature is
/// valid iff x(z1*G + z2*Q) mod q == r.
pub fn verify_gost(key: &Point, digest: &[u8], signature: &[u8]) -> bool {
    if signature.len() != GOST_SIGNATURE_LEN || key.is_identity() {
        return false;
    }
    let s = uint_from_be(&signature[..32]);
    let r = uint_from_be(&signature[32..]);
    if s == BigInt::ZERO || r == BigInt::ZERO || s >= CURVE_ORDER || r >= CURVE_ORDER {
        return false;
    }

    let mut e = Scalar::new(&uint_from_be(digest));
    if e == Scalar::ZERO {
        e = Scalar::ONE;
    }
    let (v, _) = e.invert();
    let z1 = Scalar::new(&s).mul(&v);
    let z2 = Scalar::new(&r).neg().mul(&v);
    let c = Point::generator().mul_scalar(&z1) + key.mul_scalar(&z2);
    return match c.get_x() {
        Some(x) => Scalar::new(&x).retrieve() == r,
        None => false,
    };
}

/// Check the sender's signature over the canonical body of the transaction
pub fn verify_transaction_signature(tx: &Transaction) -> Result<()> {
    if tx.signature.is_empty() {
        return Err(AuditError::MissingSignature);
    }
    let invalid = |reason: String| AuditError::SignatureInvalid(reason);
    let key = SenderKey::from_base58(&tx.sender_public_key)
        .map_err(|e| invalid(format!("sender key: {}", e)))?;
    let signature = bs58::decode(&tx.signature)
        .into_vec()
        .map_err(|e| invalid(format!("signature: {}", e)))?;
    let body = tx
        .body_bytes()
        .map_err(|e| invalid(format!("body: {}", e)))?;
    let digest = base_hash(&[&body]);
    if !verify_gost(key.get_point(), &digest, &signature) {
        return Err(invalid("verification failed".to_string()));
    }
    return Ok(());
}

/// Verify a TeZhu blind signature (c, s, y, t) on a message:
/// C = tG + yZ, A = sG - (yc)Q, valid iff H(A || C || m) mod q == c
pub fn verify_tezhu(key: &TeZhuKey, message: &[u8], signature: &[u8]) -> bool {
    let [c, s, y, t] = match le_scalars::<4>(signature) {
        Ok(scalars) => scalars,
        Err(_) => return false,
    };
    let g = Point::generator();
    let yc = Scalar::new(&y).mul(&Scalar::new(&c));
    let big_c = g.mul(&t) + key.get_z().mul(&y);
    let big_a = g.mul(&s) - key.get_q().mul_scalar(&yc);

    let mut transcript = Vec::with_capacity(128 + message.len());
    transcript.extend_from_slice(&big_a.to_le_bytes());
    transcript.extend_from_slice(&big_c.to_le_bytes());
    transcript.extend_from_slice(message);
    return hash_to_scalar(&transcript).retrieve() == c;
}

/// Textbook RSA over the Streebog-256 digest of the message: s^e mod n == H(m) mod n
pub fn verify_rsa(key: &RsaKey, message: &[u8], signature: &[u8]) -> bool {
    if !key.has_odd_modulus() {
        return false;
    }
    let s = match uint_from_be_padded::<{ RsaInt::LIMBS }>(signature) {
        Some(s) => s,
        None => return false,
    };
    if s >= *key.get_n() {
        return false;
    }
    let digest = match uint_from_be_padded::<{ RsaInt::LIMBS }>(&base_hash(&[message])) {
        Some(digest) => digest,
        None => return false,
    };
    let params = DynResidueParams::new(key.get_n());
    let e = key.get_e();
    let recovered = DynResidue::new(&s, params).pow_bounded_exp(e, e.bits());
    return recovered.retrieve() == DynResidue::new(&digest, params).retrieve();
}

/// The blind signature key of a poll, decoded once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityKey {
    TeZhu(TeZhuKey),
    Rsa(RsaKey),
}

impl EligibilityKey {
    /// Fails with `UnknownScheme` when the poll names a scheme outside the supported set
    pub fn from_voting_base(base: &VotingBase) -> Result<Self> {
        return match base.get_scheme()? {
            BlindSignatureScheme::TeZhu => Ok(Self::TeZhu(base.get_tezhu_key()?)),
            BlindSignatureScheme::Rsa => Ok(Self::Rsa(base.get_rsa_key()?)),
        };
    }

    /// Check the blind signature of a vote. The signed message is the sender's public key
    /// exactly as written in the transaction.
    pub fn verify(&self, tx: &Transaction) -> Result<()> {
        let signature = blind_signature(tx)?;
        let message = tx.sender_public_key.as_bytes();
        let valid = match self {
            Self::TeZhu(key) => {
                if signature.len() > TEZHU_SIGNATURE_LEN {
                    return Err(AuditError::EligibilityInvalid(format!(
                        "signature of {} bytes",
                        signature.len()
                    )));
                }
                let mut padded = vec![0u8; TEZHU_SIGNATURE_LEN - signature.len()];
                padded.extend_from_slice(&signature);
                verify_tezhu(key, message, &padded)
            }
            Self::Rsa(key) => verify_rsa(key, message, &signature),
        };
        if !valid {
            return Err(AuditError::EligibilityInvalid(
                "verification failed".to_string(),
            ));
        }
        return Ok(());
    }
}

fn blind_signature(tx: &Transaction) -> Result<Vec<u8>> {
    match tx.get_param(BLIND_SIGNATURE_PARAM) {
        Some(DataValue::Binary(bytes)) => Ok(bytes.clone()),
        Some(DataValue::String(encoded)) => general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuditError::EligibilityInvalid(format!("signature encoding: {}", e))),
        _ => Err(AuditError::EligibilityInvalid(
            "vote carries no blind signature".to_string(),
        )),
    }
}

/// Verify the eligibility of a vote against the poll configuration
pub fn verify_eligibility(base: &VotingBase, tx: &Transaction) -> Result<()> {
    return EligibilityKey::from_voting_base(base)?.verify(tx);
}
