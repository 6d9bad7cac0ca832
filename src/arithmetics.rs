//! Arithmetics on the GOST R 34.10-2012 256-bit curve id-tc26-gost-3410-2012-256-paramSetB
//! (identical to the CryptoPro-A parameter set): y^2 = x^3 + ax + b over GF(p) with a prime
//! order group of size q.
//!
//! Field elements and scalars are Montgomery residues from `crypto_bigint`; points are kept in
//! affine form at rest and moved to Jacobian coordinates for sums and multiplications.
use crate::{error::EncodingError, BigInt, LIMBS};
use crypto_bigint::{impl_modulus, modular::constant_mod::Residue, Encoding, U256};
use std::ops::{Add, Neg, Sub};

impl_modulus!(
    FieldModulus,
    U256,
    "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffd97"
);
impl_modulus!(
    GroupOrder,
    U256,
    "ffffffffffffffffffffffffffffffff6c611070995ad10045841b09b761b893"
);

/// An element of GF(p)
pub type FieldElement = Residue<FieldModulus, LIMBS>;

/// An element of Z/q, where q is the order of the base point
pub type Scalar = Residue<GroupOrder, LIMBS>;

pub const FIELD_MODULUS: BigInt =
    BigInt::from_be_hex("fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffd97");
pub const CURVE_ORDER: BigInt =
    BigInt::from_be_hex("ffffffffffffffffffffffffffffffff6c611070995ad10045841b09b761b893");
const CURVE_A: BigInt =
    BigInt::from_be_hex("fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffd94");
const CURVE_B: BigInt =
    BigInt::from_be_hex("00000000000000000000000000000000000000000000000000000000000000a6");
const GENERATOR_X: BigInt =
    BigInt::from_be_hex("0000000000000000000000000000000000000000000000000000000000000001");
const GENERATOR_Y: BigInt =
    BigInt::from_be_hex("8d91e471e0989cda27df505a453f2b7635294f2ddf23e3b122acc99c9e9f1e14");

/// (p + 1) / 4; p = 3 (mod 4) so square roots are a single exponentiation
const SQRT_EXP: BigInt =
    BigInt::from_be_hex("3fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff66");

/// Length of a compressed SEC1 point: parity prefix followed by big-endian x
pub const COMPRESSED_LEN: usize = 33;

/// Length of the raw little-endian form used inside protocol hashes: x || y, each reversed
pub const RAW_LEN: usize = 64;

/// A point of the curve in affine coordinates, or the neutral element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Point {
    Identity,
    Affine { x: FieldElement, y: FieldElement },
}

impl Point {
    /// The canonical base point G of the parameter set
    pub fn generator() -> Self {
        return Self::Affine {
            x: FieldElement::new(&GENERATOR_X),
            y: FieldElement::new(&GENERATOR_Y),
        };
    }

    pub fn is_identity(&self) -> bool {
        return matches!(self, Self::Identity);
    }

    /// Build a point from canonical coordinates, checking that it lies on the curve
    pub fn from_coordinates(x: &BigInt, y: &BigInt) -> Result<Self, EncodingError> {
        if *x >= FIELD_MODULUS || *y >= FIELD_MODULUS {
            return Err(EncodingError::NotOnCurve);
        }
        let x = FieldElement::new(x);
        let y = FieldElement::new(y);
        if y.square() != curve_rhs(&x) {
            return Err(EncodingError::NotOnCurve);
        }
        return Ok(Self::Affine { x, y });
    }

    /// Decode a SEC1 point: 33 bytes compressed (0x02/0x03) or 65 bytes uncompressed (0x04)
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, EncodingError> {
        match (bytes.len(), bytes.first()) {
            (COMPRESSED_LEN, Some(&prefix)) if prefix == 0x02 || prefix == 0x03 => {
                let x = BigInt::from_be_slice(&bytes[1..]);
                return Self::decompress(&x, prefix == 0x03);
            }
            (65, Some(&0x04)) => {
                let x = BigInt::from_be_slice(&bytes[1..33]);
                let y = BigInt::from_be_slice(&bytes[33..]);
                return Self::from_coordinates(&x, &y);
            }
            (COMPRESSED_LEN, Some(&prefix)) | (65, Some(&prefix)) => {
                return Err(EncodingError::PointPrefix(prefix));
            }
            (len, _) => return Err(EncodingError::PointLength(len)),
        }
    }

    /// Decode a hex string holding a SEC1 point
    pub fn from_hex(encoded: &str) -> Result<Self, EncodingError> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| EncodingError::Hex(e.to_string()))?;
        return Self::from_sec1(&bytes);
    }

    /// Decode the raw little-endian form x || y. The all-zero string stands for the identity,
    /// which cannot collide with a real point because b != 0.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != RAW_LEN {
            return Err(EncodingError::PointLength(bytes.len()));
        }
        if bytes.iter().all(|byte| *byte == 0) {
            return Ok(Self::Identity);
        }
        let x = uint_from_le(&bytes[..32]);
        let y = uint_from_le(&bytes[32..]);
        return Self::from_coordinates(&x, &y);
    }

    /// Recover y from x and the parity bit
    fn decompress(x: &BigInt, odd: bool) -> Result<Self, EncodingError> {
        if *x >= FIELD_MODULUS {
            return Err(EncodingError::NotOnCurve);
        }
        let x = FieldElement::new(x);
        let rhs = curve_rhs(&x);
        let mut y = rhs.pow(&SQRT_EXP);
        if y.square() != rhs {
            return Err(EncodingError::NotOnCurve);
        }
        if is_odd(&y) != odd {
            y = y.neg();
        }
        return Ok(Self::Affine { x, y });
    }

    /// The compressed SEC1 encoding; the identity has none
    pub fn to_compressed(&self) -> Result<[u8; COMPRESSED_LEN], EncodingError> {
        match self {
            Self::Identity => return Err(EncodingError::Infinity),
            Self::Affine { x, y } => {
                let mut out = [0u8; COMPRESSED_LEN];
                out[0] = if is_odd(y) { 0x03 } else { 0x02 };
                out[1..].copy_from_slice(&x.retrieve().to_be_bytes());
                return Ok(out);
            }
        }
    }

    /// The raw little-endian form x || y that the protocol feeds into its hashes
    pub fn to_le_bytes(&self) -> [u8; RAW_LEN] {
        let mut out = [0u8; RAW_LEN];
        if let Self::Affine { x, y } = self {
            out[..32].copy_from_slice(&x.retrieve().to_le_bytes());
            out[32..].copy_from_slice(&y.retrieve().to_le_bytes());
        }
        return out;
    }

    /// The canonical x coordinate, if any
    pub fn get_x(&self) -> Option<BigInt> {
        match self {
            Self::Identity => None,
            Self::Affine { x, .. } => Some(x.retrieve()),
        }
    }

    pub fn double(&self) -> Self {
        return Jacobian::from_point(self).double().to_point();
    }

    /// Double-and-add over the big-endian bits of k
    pub fn mul(&self, k: &BigInt) -> Self {
        let base = Jacobian::from_point(self);
        let mut acc = Jacobian::IDENTITY;
        for byte in k.to_be_bytes() {
            for bit in (0..8).rev() {
                acc = acc.double();
                if (byte >> bit) & 1 == 1 {
                    acc = acc.add(&base);
                }
            }
        }
        return acc.to_point();
    }

    pub fn mul_scalar(&self, k: &Scalar) -> Self {
        return self.mul(&k.retrieve());
    }

    /// Sum an arbitrary number of points with a single conversion back to affine form
    pub fn sum<'a, I: IntoIterator<Item = &'a Point>>(points: I) -> Self {
        let acc = points
            .into_iter()
            .fold(Jacobian::IDENTITY, |acc, point| {
                acc.add(&Jacobian::from_point(point))
            });
        return acc.to_point();
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        return Jacobian::from_point(&self)
            .add(&Jacobian::from_point(&rhs))
            .to_point();
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        match self {
            Self::Identity => Self::Identity,
            Self::Affine { x, y } => Self::Affine { x, y: y.neg() },
        }
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        return self + (-rhs);
    }
}

/// Jacobian coordinates (X, Y, Z) standing for (X/Z^2, Y/Z^3); Z = 0 is the identity
#[derive(Debug, Clone, Copy)]
struct Jacobian {
    x: FieldElement,
    y: FieldElement,
    z: FieldElement,
}

impl Jacobian {
    const IDENTITY: Self = Self {
        x: FieldElement::ONE,
        y: FieldElement::ONE,
        z: FieldElement::ZERO,
    };

    fn from_point(point: &Point) -> Self {
        match point {
            Point::Identity => Self::IDENTITY,
            Point::Affine { x, y } => Self {
                x: *x,
                y: *y,
                z: FieldElement::ONE,
            },
        }
    }

    fn is_identity(&self) -> bool {
        return self.z == FieldElement::ZERO;
    }

    fn to_point(&self) -> Point {
        if self.is_identity() {
            return Point::Identity;
        }
        let (z_inv, _) = self.z.invert();
        let z_inv2 = z_inv.square();
        let z_inv3 = z_inv2.mul(&z_inv);
        return Point::Affine {
            x: self.x.mul(&z_inv2),
            y: self.y.mul(&z_inv3),
        };
    }

    fn double(&self) -> Self {
        if self.is_identity() || self.y == FieldElement::ZERO {
            return Self::IDENTITY;
        }
        let a = FieldElement::new(&CURVE_A);
        let xx = self.x.square();
        let yy = self.y.square();
        let yyyy = yy.square();
        let zz = self.z.square();
        let s = small(4).mul(&self.x).mul(&yy);
        let m = small(3).mul(&xx).add(&a.mul(&zz.square()));
        let x3 = m.square().sub(&s.add(&s));
        let y3 = m.mul(&s.sub(&x3)).sub(&small(8).mul(&yyyy));
        let z3 = small(2).mul(&self.y).mul(&self.z);
        return Self {
            x: x3,
            y: y3,
            z: z3,
        };
    }

    fn add(&self, rhs: &Self) -> Self {
        if self.is_identity() {
            return *rhs;
        }
        if rhs.is_identity() {
            return *self;
        }
        let z1z1 = self.z.square();
        let z2z2 = rhs.z.square();
        let u1 = self.x.mul(&z2z2);
        let u2 = rhs.x.mul(&z1z1);
        let s1 = self.y.mul(&rhs.z).mul(&z2z2);
        let s2 = rhs.y.mul(&self.z).mul(&z1z1);
        if u1 == u2 {
            if s1 == s2 {
                return self.double();
            }
            return Self::IDENTITY;
        }
        let h = u2.sub(&u1);
        let r = s2.sub(&s1);
        let hh = h.square();
        let hhh = h.mul(&hh);
        let v = u1.mul(&hh);
        let x3 = r.square().sub(&hhh).sub(&v.add(&v));
        let y3 = r.mul(&v.sub(&x3)).sub(&s1.mul(&hhh));
        let z3 = self.z.mul(&rhs.z).mul(&h);
        return Self {
            x: x3,
            y: y3,
            z: z3,
        };
    }
}

/// x^3 + ax + b
fn curve_rhs(x: &FieldElement) -> FieldElement {
    let a = FieldElement::new(&CURVE_A);
    let b = FieldElement::new(&CURVE_B);
    return x.square().mul(x).add(&a.mul(x)).add(&b);
}

fn small(value: u64) -> FieldElement {
    return FieldElement::new(&BigInt::from_u64(value));
}

fn is_odd(value: &FieldElement) -> bool {
    return value.retrieve().to_be_bytes()[31] & 1 == 1;
}

/// Interpret up to 32 little-endian bytes as an integer
pub fn uint_from_le(bytes: &[u8]) -> BigInt {
    let mut buf = [0u8; 32];
    let len = bytes.len().min(32);
    buf[..len].copy_from_slice(&bytes[..len]);
    return BigInt::from_le_slice(&buf);
}

/// Interpret up to 32 big-endian bytes as an integer
pub fn uint_from_be(bytes: &[u8]) -> BigInt {
    let mut buf = [0u8; 32];
    let len = bytes.len().min(32);
    buf[32 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    return BigInt::from_be_slice(&buf);
}

/// Reduce a big-endian byte string of any length modulo the group order.
/// The string is consumed in 32-byte limbs: acc = acc * 2^256 + limb (mod q)
pub fn scalar_from_be_bytes(bytes: &[u8]) -> Scalar {
    let two_pow_256 = Scalar::new(&BigInt::ZERO.wrapping_sub(&CURVE_ORDER));
    let head = bytes.len() % 32;
    let mut acc = Scalar::new(&uint_from_be(&bytes[..head]));
    for chunk in bytes[head..].chunks(32) {
        acc = acc.mul(&two_pow_256).add(&Scalar::new(&uint_from_be(chunk)));
    }
    return acc;
}

/// Decode a big-endian scalar of at most 32 bytes that is already reduced modulo q
pub fn scalar_from_canonical(bytes: &[u8]) -> Result<Scalar, EncodingError> {
    if bytes.len() > 32 {
        return Err(EncodingError::ScalarLength(bytes.len()));
    }
    let value = uint_from_be(bytes);
    if value >= CURVE_ORDER {
        return Err(EncodingError::NonCanonicalScalar);
    }
    return Ok(Scalar::new(&value));
}

/// Decode a hex-encoded canonical big-endian scalar
pub fn scalar_from_hex(encoded: &str) -> Result<Scalar, EncodingError> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| EncodingError::Hex(e.to_string()))?;
    return scalar_from_canonical(&bytes);
}
