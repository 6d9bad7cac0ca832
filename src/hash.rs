//! Hashing used by the protocol: the Streebog-256 base hash, the expand-message construction
//! that maps transcripts to 48-byte strings (and from there to scalars), and the binding
//! coefficient that ties the two decryption authorities' keys together.
use crate::{
    arithmetics::{scalar_from_be_bytes, Point, Scalar},
    error::EncodingError,
};
use digest::Digest;
use streebog::Streebog256;

/// Domain separation tag fixed by the blind-signature and proof protocol
pub const DST: &[u8] =
    b"BlindSign-TeZhu-V00-H2F:id-tc26-gost-3410-2012-256-paramSetB_Streebog-256_XMD_ROP";

/// Output length of the expand-message hash in bytes
pub const OUTPUT_LEN: usize = 48;

const BLOCK_LEN: usize = 32;
const PAD_LEN: usize = 64;
const ROUNDS: u8 = 2;

/// Streebog-256 of the concatenation of all parts
pub fn base_hash(parts: &[&[u8]]) -> [u8; BLOCK_LEN] {
    let mut hasher = Streebog256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; BLOCK_LEN];
    out.copy_from_slice(&hasher.finalize());
    return out;
}

/// Expand `msg` to 48 bytes:
///
/// b0 = H(Z_pad || msg || len || 0x00 || DST)
/// b1 = H((0^32 xor b0) || 0x01 || DST)
/// b2 = H((b1 xor b0) || 0x02 || DST)
///
/// The output is the first 48 bytes of b1 || b2. The two length bytes are written high byte
/// first, matching the deployed signer.
pub fn domain_hash(msg: &[u8]) -> [u8; OUTPUT_LEN] {
    let len = [(OUTPUT_LEN >> 8) as u8, (OUTPUT_LEN & 0xff) as u8];
    let first = base_hash(&[&[0u8; PAD_LEN], msg, &len, &[0u8], DST]);

    let mut previous = [0u8; BLOCK_LEN];
    let mut expanded = Vec::with_capacity(BLOCK_LEN * ROUNDS as usize);
    for round in 1..=ROUNDS {
        let mut mixed = [0u8; BLOCK_LEN];
        for (i, byte) in mixed.iter_mut().enumerate() {
            *byte = previous[i] ^ first[i];
        }
        previous = base_hash(&[&mixed, &[round], DST]);
        expanded.extend_from_slice(&previous);
    }

    let mut out = [0u8; OUTPUT_LEN];
    out.copy_from_slice(&expanded[..OUTPUT_LEN]);
    return out;
}

/// The domain hash read as a big-endian integer and reduced modulo the group order
pub fn hash_to_scalar(msg: &[u8]) -> Scalar {
    return scalar_from_be_bytes(&domain_hash(msg));
}

/// Fiat-Shamir challenge over a context string followed by points in raw little-endian form
pub fn challenge(ctx: &[u8], points: &[&Point]) -> Scalar {
    let mut msg = Vec::with_capacity(ctx.len() + points.len() * 64);
    msg.extend_from_slice(ctx);
    for point in points {
        msg.extend_from_slice(&point.to_le_bytes());
    }
    return hash_to_scalar(&msg);
}

/// Coefficient h(first || second) applied to the first authority's share when the two
/// partial decryptions are combined. Swapping the arguments yields the other coefficient.
pub fn binding_coefficient(first: &Point, second: &Point) -> Result<Scalar, EncodingError> {
    let digest = base_hash(&[&first.to_compressed()?, &second.to_compressed()?]);
    return Ok(scalar_from_be_bytes(&digest));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BigInt;

    #[test]
    fn test_domain_hash_deterministic() {
        let msg = b"ballot transcript";
        assert_eq!(domain_hash(msg), domain_hash(msg));
        assert_ne!(domain_hash(msg), domain_hash(b"ballot transcripT"));
    }

    #[test]
    fn test_domain_hash_length() {
        for len in [0usize, 1, 31, 32, 33, 64, 65, 1000, 10_000] {
            let msg = vec![0xa5u8; len];
            assert_eq!(domain_hash(&msg).len(), OUTPUT_LEN);
        }
    }

    /// The expansion rounds chain through the first-round digest as in the deployed protocol
    #[test]
    fn test_domain_hash_structure() {
        let msg = b"abc";
        let first = base_hash(&[&[0u8; 64], msg, &[0x00, 0x30], &[0x00], DST]);
        let b1 = base_hash(&[&first, &[1u8], DST]);
        let mut mixed = [0u8; 32];
        for i in 0..32 {
            mixed[i] = b1[i] ^ first[i];
        }
        let b2 = base_hash(&[&mixed, &[2u8], DST]);
        let out = domain_hash(msg);
        assert_eq!(&out[..32], &b1[..]);
        assert_eq!(&out[32..], &b2[..16]);
    }

    #[test]
    fn test_binding_coefficient_is_ordered() {
        let g = Point::generator();
        let p1 = g.mul(&BigInt::from_u64(11));
        let p2 = g.mul(&BigInt::from_u64(13));
        let h1 = binding_coefficient(&p1, &p2).unwrap();
        let h2 = binding_coefficient(&p2, &p1).unwrap();
        assert_ne!(h1, h2);
        assert_eq!(h1, binding_coefficient(&p1, &p2).unwrap());
        assert!(binding_coefficient(&Point::Identity, &p2).is_err());
    }
}
