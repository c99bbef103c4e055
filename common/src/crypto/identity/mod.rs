// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! secp256k1 identity keys with the Ethereum signing conventions: EIP-191
//! personal-sign with public key recovery, EIP-55 addresses derived from
//! the keccak-256 of the public key, and the ECIES envelope used to
//! encrypt personal log content to the owner's own key.
//!
//! The ratchet tree uses the same curve for its node keys, so the ECDH
//! helper here is shared with the group code.

pub mod ecies;

use k256::{
    FieldBytes,
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::{Field as _, ops::Reduce, sec1::ToEncodedPoint as _},
};
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng as _};
use serde::{Deserialize, Serialize};

use crate::{
    codec,
    crypto::{
        errors::{KeyError, SignatureError},
        hash::keccak256,
    },
    identifiers::Address,
};

pub const PUBLIC_KEY_SIZE: usize = 65;
pub const PRIVATE_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 65;

/// secp256k1 private key. Doubles as the node private key of the ratchet
/// tree, which runs on the identity curve.
#[derive(Clone)]
pub struct IdentityPrivateKey {
    signing_key: SigningKey,
}

impl PartialEq for IdentityPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for IdentityPrivateKey {}

impl IdentityPrivateKey {
    /// Samples a fresh key, uniform in `[1, n-1]`.
    pub fn generate() -> Self {
        let mut rng = ChaCha20Rng::from_entropy();
        Self {
            signing_key: SigningKey::random(&mut rng),
        }
    }

    /// Parses a 32-byte big-endian scalar. Rejects zero and values outside
    /// the group order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Interprets 32 derived bytes as a scalar mod n. Used for node keys
    /// produced by the tree KDF, which are not guaranteed to be in range.
    pub fn from_bytes_reduced(bytes: &[u8; PRIVATE_KEY_SIZE]) -> Result<Self, KeyError> {
        let scalar = <k256::Scalar as Reduce<k256::U256>>::reduce_bytes(FieldBytes::from_slice(
            bytes.as_slice(),
        ));
        if scalar.is_zero().into() {
            return Err(KeyError::InvalidPrivateKey);
        }
        let signing_key =
            SigningKey::from_bytes(&scalar.to_bytes()).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.signing_key.to_bytes().into()
    }

    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            verifying_key: *self.signing_key.verifying_key(),
        }
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// EIP-191 personal-sign. Emits the 65-byte `R ‖ S ‖ V` form with
    /// `V = recovery_id + 27`.
    pub fn sign_message(&self, message: &str) -> Result<PersonalSignature, SignatureError> {
        let digest = eip191_digest(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|_| SignatureError::MalformedSignature)?;
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + 27;
        Ok(PersonalSignature { bytes })
    }
}

impl std::fmt::Debug for IdentityPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityPrivateKey: [[REDACTED]]").finish()
    }
}

impl Serialize for IdentityPrivateKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&codec::to_hex(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for IdentityPrivateKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = codec::from_hex(&s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// secp256k1 public key in the uncompressed 65-byte `04 ‖ X ‖ Y` form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdentityPublicKey {
    verifying_key: VerifyingKey,
}

impl IdentityPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let verifying_key =
            VerifyingKey::from_sec1_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    pub fn from_hex(input: &str) -> Result<Self, KeyError> {
        let bytes = codec::from_hex(input).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.verifying_key.to_encoded_point(false);
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(self.to_bytes())
    }

    /// Last 20 bytes of the keccak-256 over `X ‖ Y` (no prefix byte).
    pub fn address(&self) -> Address {
        let encoded = self.to_bytes();
        let digest = keccak256(&encoded[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        Address::from_bytes(address)
    }
}

impl std::fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityPublicKey({})", self.to_hex())
    }
}

impl Serialize for IdentityPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentityPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 65-byte `R ‖ S ‖ V` recoverable signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonalSignature {
    bytes: [u8; SIGNATURE_SIZE],
}

impl PersonalSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_hex(input: &str) -> Result<Self, SignatureError> {
        let bytes = codec::from_hex_fixed::<SIGNATURE_SIZE>(input)
            .map_err(|_| SignatureError::MalformedSignature)?;
        Ok(Self { bytes })
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.bytes
    }
}

impl Serialize for PersonalSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PersonalSignature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// `keccak256(0x19 ‖ "Ethereum Signed Message:\n" ‖ len ‖ message)`.
fn eip191_digest(message: &str) -> [u8; 32] {
    let message = message.as_bytes();
    let mut input = Vec::with_capacity(message.len() + 32);
    input.push(0x19);
    input.extend_from_slice(b"Ethereum Signed Message:\n");
    input.extend_from_slice(message.len().to_string().as_bytes());
    input.extend_from_slice(message);
    keccak256(&input)
}

/// Recovers the signer address from an EIP-191 signature.
pub fn recover_address(
    message: &str,
    signature: &PersonalSignature,
) -> Result<Address, SignatureError> {
    let digest = eip191_digest(message);
    let bytes = signature.as_bytes();
    let parsed =
        Signature::from_slice(&bytes[..64]).map_err(|_| SignatureError::MalformedSignature)?;
    let v = bytes[64];
    let recovery_id = RecoveryId::from_byte(v.wrapping_sub(27))
        .ok_or(SignatureError::MalformedSignature)?;
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &parsed, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(IdentityPublicKey { verifying_key }.address())
}

/// Verifies that `signature` over `message` recovers to `address`.
/// Address comparison is over raw bytes, i.e. case-insensitive.
pub fn verify_message(
    message: &str,
    signature: &PersonalSignature,
    address: &Address,
) -> Result<(), SignatureError> {
    let recovered = recover_address(message, signature)?;
    if recovered == *address {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Full uncompressed ECDH point between a private and a public key.
///
/// The KDFs in this protocol take the whole 65-byte point as input, not
/// just the x-coordinate.
pub fn ecdh_point(
    private_key: &IdentityPrivateKey,
    public_key: &IdentityPublicKey,
) -> Result<[u8; PUBLIC_KEY_SIZE], KeyError> {
    let public = k256::PublicKey::from_sec1_bytes(&public_key.to_bytes())
        .map_err(|_| KeyError::InvalidPublicKey)?;
    let scalar = *k256::SecretKey::from_slice(&private_key.to_bytes())
        .map_err(|_| KeyError::InvalidPrivateKey)?
        .to_nonzero_scalar();
    let shared = (public.to_projective() * scalar).to_affine();
    let encoded = shared.to_encoded_point(false);
    let mut bytes = [0u8; PUBLIC_KEY_SIZE];
    bytes.copy_from_slice(encoded.as_bytes());
    Ok(bytes)
}
