// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! BBS+ anonymous membership credentials and signatures.
//!
//! The group manager holds `γ` and publishes `w = g2·γ` together with two
//! G1 generators derived from `γ`. Members receive a credential
//! `(x, A, e, s)` with `A = (g1 + h0·s + h1·x)·(γ+e)^{-1}` and sign by
//! randomizing the credential and proving knowledge of the hidden values
//! with a Schnorr-style transcript. Verification never learns which
//! member signed; two signatures by the same member are unlinkable.

pub mod revocation;

use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    codec,
    crypto::bls::{
        self, G1_COMPRESSED_SIZE, G2_COMPRESSED_SIZE, PointDecodingError, SCALAR_SIZE,
        challenge_point_bytes, hash_to_scalar, pairing_eq, scalar_from_be_bytes_strict,
        scalar_to_be_bytes,
    },
};

const GENERATOR_H0_DOMAIN: &str = "BBS+Generator-h0";
const GENERATOR_H1_DOMAIN: &str = "BBS+Generator-h1";

/// Serialized signature layout: three G1 points, then five scalars.
const SIGNATURE_SIZE: usize = 3 * G1_COMPRESSED_SIZE + 5 * SCALAR_SIZE;
/// Serialized public key layout: `w`, then `h0`, then `h1`.
const PUBLIC_KEY_SIZE: usize = G2_COMPRESSED_SIZE + 2 * G1_COMPRESSED_SIZE;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GroupSignatureError {
    /// `A'` or `Ā` is the identity element.
    #[error("signature contains an identity point")]
    IdentityPoint,
    /// The recomputed Schnorr challenge does not match.
    #[error("challenge mismatch")]
    ChallengeMismatch,
    /// The credential pairing equation does not hold.
    #[error("pairing check failed")]
    PairingFailure,
    /// The serialized form could not be decoded.
    #[error("malformed group signature: {0}")]
    Malformed(#[from] PointDecodingError),
}

/// Public parameters of a signature group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPublicKey {
    w: G2Affine,
    h: [G1Affine; 2],
}

impl GroupPublicKey {
    pub fn w(&self) -> &G2Affine {
        &self.w
    }

    pub fn h0(&self) -> &G1Affine {
        &self.h[0]
    }

    pub fn h1(&self) -> &G1Affine {
        &self.h[1]
    }

    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(PUBLIC_KEY_SIZE);
        bytes.extend_from_slice(&bls::g2_to_bytes(&self.w));
        bytes.extend_from_slice(&bls::g1_to_bytes(&self.h[0]));
        bytes.extend_from_slice(&bls::g1_to_bytes(&self.h[1]));
        codec::to_hex(bytes)
    }

    pub fn from_hex(input: &str) -> Result<Self, PointDecodingError> {
        let bytes = codec::from_hex_fixed::<PUBLIC_KEY_SIZE>(input)
            .map_err(|_| PointDecodingError::InvalidG2)?;
        let mut w_bytes = [0u8; G2_COMPRESSED_SIZE];
        w_bytes.copy_from_slice(&bytes[..G2_COMPRESSED_SIZE]);
        let h1_start = G2_COMPRESSED_SIZE + G1_COMPRESSED_SIZE;
        let mut h0_bytes = [0u8; G1_COMPRESSED_SIZE];
        h0_bytes.copy_from_slice(&bytes[G2_COMPRESSED_SIZE..h1_start]);
        let mut h1_bytes = [0u8; G1_COMPRESSED_SIZE];
        h1_bytes.copy_from_slice(&bytes[h1_start..]);
        Ok(Self {
            w: bls::g2_from_bytes(&w_bytes)?,
            h: [bls::g1_from_bytes(&h0_bytes)?, bls::g1_from_bytes(&h1_bytes)?],
        })
    }
}

impl Serialize for GroupPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for GroupPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The manager's secret `γ` together with the published parameters.
#[derive(Clone)]
pub struct ManagerPrivateKey {
    gamma: Scalar,
    public_key: GroupPublicKey,
}

impl ManagerPrivateKey {
    /// Samples `γ` and derives the public parameters. The generators are
    /// bound to `γ` by construction; this matches the deployed scheme and
    /// is deliberately not interoperable with standard BBS+.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let gamma = bls::random_scalar(rng);
        let gamma_bytes = scalar_to_be_bytes(&gamma);
        let w = G2Affine::from(G2Projective::generator() * gamma);
        let h0 = G1Affine::from(bls::hash_to_g1(GENERATOR_H0_DOMAIN, &[&gamma_bytes]));
        let h1 = G1Affine::from(bls::hash_to_g1(GENERATOR_H1_DOMAIN, &[&gamma_bytes]));
        Self {
            gamma,
            public_key: GroupPublicKey { w, h: [h0, h1] },
        }
    }

    pub fn public_key(&self) -> &GroupPublicKey {
        &self.public_key
    }

    /// Issues a membership credential.
    pub fn issue_credential(&self, rng: &mut (impl RngCore + CryptoRng)) -> MemberCredential {
        let x = bls::random_scalar(rng);
        let s = bls::random_scalar(rng);
        loop {
            let e = bls::random_scalar(rng);
            let Some(inverse) = Option::<Scalar>::from((self.gamma + e).invert()) else {
                // e == -γ, resample.
                continue;
            };
            let b = G1Projective::generator()
                + self.public_key.h[0] * s
                + self.public_key.h[1] * x;
            let a = G1Affine::from(b * inverse);
            return MemberCredential { x, a, e, s };
        }
    }
}

impl std::fmt::Debug for ManagerPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerPrivateKey: [[REDACTED]]").finish()
    }
}

/// A member's secret credential `(x, A, e, s)`.
#[derive(Clone, PartialEq, Eq)]
pub struct MemberCredential {
    x: Scalar,
    a: G1Affine,
    e: Scalar,
    s: Scalar,
}

impl MemberCredential {
    /// Credential exponent used by the revocation accumulator.
    pub fn e(&self) -> &Scalar {
        &self.e
    }

    /// Checks `e(A, w + g2·e) = e(B, g2)` against the group parameters.
    pub fn is_valid_for(&self, public_key: &GroupPublicKey) -> bool {
        let b = G1Projective::generator() + public_key.h[0] * self.s + public_key.h[1] * self.x;
        let rhs = G2Affine::from(G2Projective::from(public_key.w) + G2Projective::generator() * self.e);
        pairing_eq(&self.a, &rhs, &G1Affine::from(b), &G2Affine::generator())
    }
}

impl std::fmt::Debug for MemberCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberCredential: [[REDACTED]]").finish()
    }
}

#[derive(Serialize, Deserialize)]
struct MemberCredentialWire {
    x: String,
    a: String,
    e: String,
    s: String,
}

impl Serialize for MemberCredential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MemberCredentialWire {
            x: codec::to_hex(scalar_to_be_bytes(&self.x)),
            a: codec::to_hex(bls::g1_to_bytes(&self.a)),
            e: codec::to_hex(scalar_to_be_bytes(&self.e)),
            s: codec::to_hex(scalar_to_be_bytes(&self.s)),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MemberCredential {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let wire = MemberCredentialWire::deserialize(deserializer)?;
        let decode_scalar = |input: &str| -> Result<Scalar, D::Error> {
            let bytes = codec::from_hex_fixed::<SCALAR_SIZE>(input).map_err(D::Error::custom)?;
            scalar_from_be_bytes_strict(&bytes).map_err(D::Error::custom)
        };
        let a_bytes =
            codec::from_hex_fixed::<G1_COMPRESSED_SIZE>(&wire.a).map_err(D::Error::custom)?;
        Ok(Self {
            x: decode_scalar(&wire.x)?,
            a: bls::g1_from_bytes(&a_bytes).map_err(D::Error::custom)?,
            e: decode_scalar(&wire.e)?,
            s: decode_scalar(&wire.s)?,
        })
    }
}

/// A randomized signature of knowledge over a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSignature {
    a_prime: G1Affine,
    a_bar: G1Affine,
    d: G1Affine,
    c: Scalar,
    s_x: Scalar,
    s_r2: Scalar,
    s_e: Scalar,
    s_s: Scalar,
}

impl GroupSignature {
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(SIGNATURE_SIZE);
        bytes.extend_from_slice(&bls::g1_to_bytes(&self.a_prime));
        bytes.extend_from_slice(&bls::g1_to_bytes(&self.a_bar));
        bytes.extend_from_slice(&bls::g1_to_bytes(&self.d));
        for scalar in [&self.c, &self.s_x, &self.s_r2, &self.s_e, &self.s_s] {
            bytes.extend_from_slice(&scalar_to_be_bytes(scalar));
        }
        codec::to_hex(bytes)
    }

    pub fn from_hex(input: &str) -> Result<Self, GroupSignatureError> {
        let bytes = codec::from_hex_fixed::<SIGNATURE_SIZE>(input)
            .map_err(|_| GroupSignatureError::Malformed(PointDecodingError::InvalidG1))?;
        let g1 = |offset: usize| -> Result<G1Affine, PointDecodingError> {
            let mut buf = [0u8; G1_COMPRESSED_SIZE];
            buf.copy_from_slice(&bytes[offset..offset + G1_COMPRESSED_SIZE]);
            bls::g1_from_bytes(&buf)
        };
        let a_prime = g1(0)?;
        let a_bar = g1(G1_COMPRESSED_SIZE)?;
        let d = g1(2 * G1_COMPRESSED_SIZE)?;
        let mut scalars = [Scalar::zero(); 5];
        for (i, slot) in scalars.iter_mut().enumerate() {
            let offset = 3 * G1_COMPRESSED_SIZE + i * SCALAR_SIZE;
            let mut buf = [0u8; SCALAR_SIZE];
            buf.copy_from_slice(&bytes[offset..offset + SCALAR_SIZE]);
            *slot = scalar_from_be_bytes_strict(&buf)?;
        }
        let [c, s_x, s_r2, s_e, s_s] = scalars;
        Ok(Self {
            a_prime,
            a_bar,
            d,
            c,
            s_x,
            s_r2,
            s_e,
            s_s,
        })
    }
}

impl Serialize for GroupSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for GroupSignature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Signs `message` with a randomized credential.
pub fn sign(
    credential: &MemberCredential,
    public_key: &GroupPublicKey,
    message: &str,
    rng: &mut (impl RngCore + CryptoRng),
) -> GroupSignature {
    let h0 = &public_key.h[0];
    let h1 = &public_key.h[1];

    let r = bls::random_scalar(rng);
    let a_prime = G1Affine::from(credential.a * r);
    let b_prime = G1Projective::generator() * r
        + h0 * (credential.s * r)
        + h1 * (credential.x * r);
    let a_bar = G1Affine::from(b_prime + a_prime * (-credential.e));

    let r2 = bls::random_scalar(rng);
    let d = G1Affine::from(h0 * r2 + h1 * (credential.x * r));

    let r_x = bls::random_scalar(rng);
    let r_r2 = bls::random_scalar(rng);
    let r_e = bls::random_scalar(rng);
    let r_s = bls::random_scalar(rng);
    let t = G1Affine::from(h0 * r_r2 + h1 * r_x);

    let c = challenge(message, &a_prime, &a_bar, &d, &t);

    GroupSignature {
        a_prime,
        a_bar,
        d,
        c,
        s_x: r_x + c * (credential.x * r),
        s_r2: r_r2 + c * r2,
        s_e: r_e + c * credential.e,
        s_s: r_s + c * credential.s,
    }
}

/// Verifies a group signature against the group's public parameters.
pub fn verify(
    public_key: &GroupPublicKey,
    message: &str,
    signature: &GroupSignature,
) -> Result<(), GroupSignatureError> {
    if bool::from(signature.a_prime.is_identity()) || bool::from(signature.a_bar.is_identity()) {
        return Err(GroupSignatureError::IdentityPoint);
    }

    let t = G1Affine::from(
        public_key.h[0] * signature.s_r2 + public_key.h[1] * signature.s_x
            + signature.d * (-signature.c),
    );
    let c = challenge(message, &signature.a_prime, &signature.a_bar, &signature.d, &t);
    if c != signature.c {
        return Err(GroupSignatureError::ChallengeMismatch);
    }

    if !pairing_eq(
        &signature.a_prime,
        &public_key.w,
        &signature.a_bar,
        &G2Affine::generator(),
    ) {
        return Err(GroupSignatureError::PairingFailure);
    }
    Ok(())
}

fn challenge(
    message: &str,
    a_prime: &G1Affine,
    a_bar: &G1Affine,
    d: &G1Affine,
    t: &G1Affine,
) -> Scalar {
    hash_to_scalar(&[
        message.as_bytes(),
        &challenge_point_bytes(a_prime),
        &challenge_point_bytes(a_bar),
        &challenge_point_bytes(d),
        &challenge_point_bytes(t),
    ])
}

#[cfg(test)]
mod tests {
    use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng as _};

    use super::*;

    fn fixture() -> (ManagerPrivateKey, MemberCredential, ChaCha20Rng) {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let manager = ManagerPrivateKey::generate(&mut rng);
        let credential = manager.issue_credential(&mut rng);
        (manager, credential, rng)
    }

    #[test]
    fn issued_credential_satisfies_pairing_invariant() {
        let (manager, credential, _) = fixture();
        assert!(credential.is_valid_for(manager.public_key()));
    }

    #[test]
    fn sign_and_verify() {
        let (manager, credential, mut rng) = fixture();
        let signature = sign(&credential, manager.public_key(), "hello", &mut rng);
        verify(manager.public_key(), "hello", &signature).unwrap();
    }

    #[test]
    fn wrong_message_fails_with_challenge_mismatch() {
        let (manager, credential, mut rng) = fixture();
        let signature = sign(&credential, manager.public_key(), "hello", &mut rng);
        assert_eq!(
            verify(manager.public_key(), "hellp", &signature),
            Err(GroupSignatureError::ChallengeMismatch)
        );
    }

    #[test]
    fn tampered_challenge_fails() {
        let (manager, credential, mut rng) = fixture();
        let signature = sign(&credential, manager.public_key(), "hello", &mut rng);
        let mut tampered = signature.clone();
        tampered.c += Scalar::one();
        assert_eq!(
            verify(manager.public_key(), "hello", &tampered),
            Err(GroupSignatureError::ChallengeMismatch)
        );
    }

    #[test]
    fn signatures_are_unlinkable() {
        let (manager, credential, mut rng) = fixture();
        let first = sign(&credential, manager.public_key(), "hello", &mut rng);
        let second = sign(&credential, manager.public_key(), "hello", &mut rng);
        assert_ne!(first.a_prime, second.a_prime);
        assert_ne!(first.c, second.c);
        verify(manager.public_key(), "hello", &first).unwrap();
        verify(manager.public_key(), "hello", &second).unwrap();
    }

    #[test]
    fn signature_under_wrong_group_fails() {
        let (manager, credential, mut rng) = fixture();
        let other = ManagerPrivateKey::generate(&mut rng);
        let signature = sign(&credential, manager.public_key(), "hello", &mut rng);
        assert!(verify(other.public_key(), "hello", &signature).is_err());
    }

    #[test]
    fn serialized_roundtrip() {
        let (manager, credential, mut rng) = fixture();
        let signature = sign(&credential, manager.public_key(), "hello", &mut rng);
        let decoded = GroupSignature::from_hex(&signature.to_hex()).unwrap();
        assert_eq!(signature, decoded);
        verify(manager.public_key(), "hello", &decoded).unwrap();

        let public_key = GroupPublicKey::from_hex(&manager.public_key().to_hex()).unwrap();
        assert_eq!(&public_key, manager.public_key());

        let credential_json = serde_json::to_string(&credential).unwrap();
        let credential_back: MemberCredential = serde_json::from_str(&credential_json).unwrap();
        assert_eq!(credential, credential_back);
    }
}
