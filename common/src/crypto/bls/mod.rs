// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thin helpers over the BLS12-381 arithmetic the BBS+ scheme runs on:
//! wide reduction of 256-bit values into Fr, the double-SHA256 "expand"
//! hash-to-scalar, and the protocol's generator-multiplication hash-to-G1.
//!
//! The hash-to-G1 here is *not* a standards-compliant hash-to-curve (it is
//! not a random oracle into the group); it is the fixed scheme required
//! for compatibility with existing deployments. Compressed encodings
//! follow the zcash conventions of the underlying crate (48-byte G1,
//! 96-byte G2).

use bls12_381::{G1Affine, G1Projective, G2Affine, Scalar, pairing};
use ff::Field as _;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::{codec, crypto::hash::sha256};

pub const SCALAR_SIZE: usize = 32;
pub const G1_COMPRESSED_SIZE: usize = 48;
pub const G2_COMPRESSED_SIZE: usize = 96;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PointDecodingError {
    #[error("invalid scalar encoding")]
    InvalidScalar,
    #[error("invalid G1 point encoding")]
    InvalidG1,
    #[error("invalid G2 point encoding")]
    InvalidG2,
}

pub fn random_scalar(rng: &mut (impl RngCore + CryptoRng)) -> Scalar {
    Scalar::random(rng)
}

/// Interprets 32 big-endian bytes as an integer and reduces it mod r.
/// Values at or above the field order are accepted and wrapped.
pub fn scalar_from_be_bytes(bytes: &[u8; SCALAR_SIZE]) -> Scalar {
    let mut wide = [0u8; 64];
    for (i, byte) in bytes.iter().enumerate() {
        wide[SCALAR_SIZE - 1 - i] = *byte;
    }
    Scalar::from_bytes_wide(&wide)
}

/// Big-endian encoding of a scalar.
pub fn scalar_to_be_bytes(scalar: &Scalar) -> [u8; SCALAR_SIZE] {
    let mut bytes = scalar.to_bytes();
    bytes.reverse();
    bytes
}

/// Strict big-endian decoding: rejects values outside `[0, r)`.
pub fn scalar_from_be_bytes_strict(bytes: &[u8; SCALAR_SIZE]) -> Result<Scalar, PointDecodingError> {
    let mut le = *bytes;
    le.reverse();
    Option::<Scalar>::from(Scalar::from_bytes(&le)).ok_or(PointDecodingError::InvalidScalar)
}

/// `Fr( BE( SHA256( SHA256(data) ‖ "expand" ) ) mod r )` over the
/// concatenation of the inputs.
pub fn hash_to_scalar(inputs: &[&[u8]]) -> Scalar {
    let mut data = Vec::new();
    for input in inputs {
        data.extend_from_slice(input);
    }
    let inner = sha256(&data);
    let mut expanded = Vec::with_capacity(inner.len() + 6);
    expanded.extend_from_slice(&inner);
    expanded.extend_from_slice(b"expand");
    scalar_from_be_bytes(&sha256(&expanded))
}

/// `hash_to_scalar(domain ‖ inputs) · G1`.
pub fn hash_to_g1(domain: &str, inputs: &[&[u8]]) -> G1Projective {
    let mut data: Vec<&[u8]> = Vec::with_capacity(inputs.len() + 1);
    data.push(domain.as_bytes());
    data.extend_from_slice(inputs);
    G1Projective::generator() * hash_to_scalar(&data)
}

pub fn g1_to_bytes(point: &G1Affine) -> [u8; G1_COMPRESSED_SIZE] {
    point.to_compressed()
}

pub fn g1_from_bytes(bytes: &[u8; G1_COMPRESSED_SIZE]) -> Result<G1Affine, PointDecodingError> {
    Option::<G1Affine>::from(G1Affine::from_compressed(bytes)).ok_or(PointDecodingError::InvalidG1)
}

pub fn g2_to_bytes(point: &G2Affine) -> [u8; G2_COMPRESSED_SIZE] {
    point.to_compressed()
}

pub fn g2_from_bytes(bytes: &[u8; G2_COMPRESSED_SIZE]) -> Result<G2Affine, PointDecodingError> {
    Option::<G2Affine>::from(G2Affine::from_compressed(bytes)).ok_or(PointDecodingError::InvalidG2)
}

pub fn g1_from_hex(input: &str) -> Result<G1Affine, PointDecodingError> {
    let bytes = codec::from_hex_fixed::<G1_COMPRESSED_SIZE>(input)
        .map_err(|_| PointDecodingError::InvalidG1)?;
    g1_from_bytes(&bytes)
}

/// Challenge-transcript encoding of a G1 point: the compressed form with
/// the three flag bits of the leading byte cleared, truncated to 32 bytes.
pub fn challenge_point_bytes(point: &G1Affine) -> [u8; SCALAR_SIZE] {
    let mut compressed = point.to_compressed();
    compressed[0] &= 0x1f;
    let mut out = [0u8; SCALAR_SIZE];
    out.copy_from_slice(&compressed[..SCALAR_SIZE]);
    out
}

/// Checks `e(a, x) == e(b, y)` via the optimal ate pairing.
pub fn pairing_eq(a: &G1Affine, x: &G2Affine, b: &G1Affine, y: &G2Affine) -> bool {
    pairing(a, x) == pairing(b, y)
}

#[cfg(test)]
mod tests {
    use bls12_381::G2Projective;

    use super::*;

    #[test]
    fn generator_matches_eth_convention() {
        let compressed = g1_to_bytes(&G1Affine::generator());
        let hex = hex::encode(compressed);
        assert!(hex.starts_with("97f1d3a7"));
        assert!(hex.ends_with("c6bb"));
    }

    #[test]
    fn scalar_reduction_wraps_values_above_r() {
        // r expressed big-endian; r reduces to zero, r+1 to one.
        let r_be: [u8; 32] =
            codec::from_hex_fixed("73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001")
                .unwrap();
        assert_eq!(scalar_from_be_bytes(&r_be), Scalar::zero());

        let mut r_plus_one = r_be;
        r_plus_one[31] = 0x02;
        assert_eq!(scalar_from_be_bytes(&r_plus_one), Scalar::one());

        // Strict decoding rejects the same values.
        assert!(scalar_from_be_bytes_strict(&r_be).is_err());
        assert!(scalar_from_be_bytes_strict(&r_plus_one).is_err());
    }

    #[test]
    fn scalar_be_roundtrip() {
        let scalar = Scalar::from(123_456_789u64);
        let be = scalar_to_be_bytes(&scalar);
        assert_eq!(scalar_from_be_bytes(&be), scalar);
        assert_eq!(scalar_from_be_bytes_strict(&be).unwrap(), scalar);
    }

    #[test]
    fn hash_to_scalar_is_deterministic_and_input_sensitive() {
        let a = hash_to_scalar(&[b"hello"]);
        let b = hash_to_scalar(&[b"hello"]);
        let c = hash_to_scalar(&[b"hellp"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Multi-input form concatenates before hashing.
        assert_eq!(hash_to_scalar(&[b"he", b"llo"]), a);
    }

    #[test]
    fn hash_to_g1_depends_on_domain() {
        let a = hash_to_g1("domain-a", &[b"input"]);
        let b = hash_to_g1("domain-b", &[b"input"]);
        assert_ne!(G1Affine::from(a), G1Affine::from(b));
    }

    #[test]
    fn point_roundtrips() {
        let p = G1Affine::from(G1Projective::generator() * Scalar::from(42u64));
        assert_eq!(g1_from_bytes(&g1_to_bytes(&p)).unwrap(), p);
        let q = G2Affine::from(G2Projective::generator() * Scalar::from(42u64));
        assert_eq!(g2_from_bytes(&g2_to_bytes(&q)).unwrap(), q);
    }

    #[test]
    fn pairing_bilinearity() {
        let a = Scalar::from(7u64);
        let g1 = G1Affine::from(G1Projective::generator() * a);
        let g2 = G2Affine::generator();
        let g1_base = G1Affine::generator();
        let g2_scaled = G2Affine::from(G2Projective::generator() * a);
        assert!(pairing_eq(&g1, &g2, &g1_base, &g2_scaled));
    }
}
