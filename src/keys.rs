//! The public keys the auditor verifies against
use crate::{
    arithmetics::{uint_from_be, uint_from_le, Point},
    error::EncodingError,
    BigInt,
};
use crypto_bigint::{Encoding, Uint, U4096};

/// Blind RSA moduli up to 4096 bits are supported
pub type RsaInt = U4096;

/// Length of the serialized TeZhu public key: two header bytes followed by Q and Z
pub const TEZHU_KEY_LEN: usize = 130;

/// Verification key of a transaction sender
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct SenderKey {
    point: Point,
}

impl SenderKey {
    pub fn new(point: Point) -> Self {
        return Self { point };
    }

    /// Decode the base58 form stored in transactions. The raw form is x || y, both big-endian;
    /// SEC1 encodings are accepted as well.
    pub fn from_base58(encoded: &str) -> Result<Self, EncodingError> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| EncodingError::Base58(e.to_string()))?;
        let point = if bytes.len() == 64 {
            Point::from_coordinates(&uint_from_be(&bytes[..32]), &uint_from_be(&bytes[32..]))?
        } else {
            Point::from_sec1(&bytes)?
        };
        return Ok(Self::new(point));
    }

    pub fn get_point(&self) -> &Point {
        &self.point
    }
}

/// Public key of the TeZhu blind signature scheme: Q = xG and Z = zG
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct TeZhuKey {
    q: Point,
    z: Point,
}

impl TeZhuKey {
    pub fn new(q: Point, z: Point) -> Self {
        return Self { q, z };
    }

    /// Decode the hex form published in the voting configuration. Leading zeros may be
    /// stripped by the publisher, so the string is left-padded to the full 130 bytes. After the
    /// two header bytes, Q and Z follow as raw little-endian points.
    pub fn from_hex(encoded: &str) -> Result<Self, EncodingError> {
        let encoded = encoded.trim();
        if encoded.len() > TEZHU_KEY_LEN * 2 {
            return Err(EncodingError::PointLength(encoded.len() / 2));
        }
        let padded = format!("{:0>width$}", encoded, width = TEZHU_KEY_LEN * 2);
        let bytes = hex::decode(padded).map_err(|e| EncodingError::Hex(e.to_string()))?;
        let q = Point::from_le_bytes(&bytes[2..66])?;
        let z = Point::from_le_bytes(&bytes[66..130])?;
        return Ok(Self::new(q, z));
    }

    pub fn get_q(&self) -> &Point {
        &self.q
    }

    pub fn get_z(&self) -> &Point {
        &self.z
    }

    /// Serialize back into the published form
    pub fn to_hex(&self) -> String {
        let mut bytes = vec![0u8; 2];
        bytes.extend_from_slice(&self.q.to_le_bytes());
        bytes.extend_from_slice(&self.z.to_le_bytes());
        return hex::encode(bytes);
    }
}

/// Public key of the RSA blind signature scheme
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct RsaKey {
    n: RsaInt,
    e: RsaInt,
}

impl RsaKey {
    /// Instantiate an instance with no check
    pub fn new(n: RsaInt, e: RsaInt) -> Self {
        return Self { n, e };
    }

    pub fn from_hex(modulus: &str, exponent: &str) -> Result<Self, EncodingError> {
        let n = rsa_int_from_hex(modulus)?;
        let e = rsa_int_from_hex(exponent)?;
        return Ok(Self::new(n, e));
    }

    pub fn get_n(&self) -> &RsaInt {
        &self.n
    }

    pub fn get_e(&self) -> &RsaInt {
        &self.e
    }

    /// Montgomery arithmetic needs an odd modulus; every RSA modulus is one
    pub fn has_odd_modulus(&self) -> bool {
        return self.n.to_be_bytes()[RsaInt::BYTES - 1] & 1 == 1;
    }
}

fn rsa_int_from_hex(encoded: &str) -> Result<RsaInt, EncodingError> {
    let encoded = encoded.trim();
    let padded = if encoded.len() % 2 == 1 {
        format!("0{}", encoded)
    } else {
        encoded.to_string()
    };
    let bytes = hex::decode(padded).map_err(|e| EncodingError::Hex(e.to_string()))?;
    return uint_from_be_padded(&bytes).ok_or(EncodingError::ScalarLength(bytes.len()));
}

/// Interpret a big-endian byte string as an integer of any width, or None if it does not fit
pub fn uint_from_be_padded<const L: usize>(bytes: &[u8]) -> Option<Uint<L>> {
    let width = Uint::<L>::BYTES;
    let significant = bytes
        .iter()
        .position(|byte| *byte != 0)
        .map_or(&bytes[bytes.len()..], |start| &bytes[start..]);
    if significant.len() > width {
        return None;
    }
    let mut buf = vec![0u8; width];
    buf[width - significant.len()..].copy_from_slice(significant);
    return Some(Uint::<L>::from_be_slice(&buf));
}

/// Split N little-endian 32-byte integers packed back to back, as blind signatures are
pub fn le_scalars<const N: usize>(bytes: &[u8]) -> Result<[BigInt; N], EncodingError> {
    if bytes.len() != N * 32 {
        return Err(EncodingError::ScalarLength(bytes.len()));
    }
    let mut out = [BigInt::ZERO; N];
    for (i, chunk) in bytes.chunks(32).enumerate() {
        out[i] = uint_from_le(chunk);
    }
    return Ok(out);
}
