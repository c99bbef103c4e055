// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ECIES envelope: ephemeral secp256k1 ECDH, HKDF-SHA256 over the
//! ephemeral public key and the full shared point, AES-256-GCM with a
//! 16-byte IV. The layout `eph_pub65 ‖ IV16 ‖ TAG16 ‖ CT`, base64-encoded,
//! matches the eciesjs envelope.

use crate::{
    codec,
    crypto::{
        ear,
        errors::{DecryptionError, EncryptionError},
        kdf,
    },
};

use super::{IdentityPrivateKey, IdentityPublicKey, PUBLIC_KEY_SIZE, ecdh_point};

const IV_SIZE: usize = ear::AEAD_WIDE_NONCE_SIZE;
const TAG_SIZE: usize = ear::AEAD_TAG_SIZE;
/// Shortest well-formed envelope: ephemeral key, IV, tag, one ciphertext byte.
const MIN_ENVELOPE_SIZE: usize = PUBLIC_KEY_SIZE + IV_SIZE + TAG_SIZE + 1;

/// Encrypts to `recipient` with the standard (empty-info) key schedule.
pub fn encrypt(recipient: &IdentityPublicKey, plaintext: &[u8]) -> Result<String, EncryptionError> {
    encrypt_with_info(recipient, plaintext, &[])
}

/// Encrypts to `recipient` with a caller-supplied HKDF info. The welcome
/// path uses this to bind the key to its context label.
pub fn encrypt_with_info(
    recipient: &IdentityPublicKey,
    plaintext: &[u8],
    info: &[u8],
) -> Result<String, EncryptionError> {
    let ephemeral = IdentityPrivateKey::generate();
    let ephemeral_public = ephemeral.public_key().to_bytes();
    let shared_point =
        ecdh_point(&ephemeral, recipient).map_err(|_| EncryptionError::InvalidPublicKey)?;

    let key = derive_key(&ephemeral_public, &shared_point, info);
    let sealed = ear::seal_wide_nonce(&key, plaintext)?;

    let mut envelope = Vec::with_capacity(PUBLIC_KEY_SIZE + sealed.len());
    envelope.extend_from_slice(&ephemeral_public);
    envelope.extend_from_slice(&sealed);
    Ok(codec::to_base64(envelope))
}

/// Decrypts an envelope addressed to `private_key`.
pub fn decrypt(
    private_key: &IdentityPrivateKey,
    envelope: &str,
) -> Result<Vec<u8>, DecryptionError> {
    decrypt_with_info(private_key, envelope, &[])
}

pub fn decrypt_with_info(
    private_key: &IdentityPrivateKey,
    envelope: &str,
    info: &[u8],
) -> Result<Vec<u8>, DecryptionError> {
    let bytes = codec::from_base64(envelope).map_err(|_| DecryptionError::MalformedCiphertext)?;
    if bytes.len() < MIN_ENVELOPE_SIZE {
        return Err(DecryptionError::CiphertextTooShort);
    }
    let (ephemeral_public, sealed) = bytes.split_at(PUBLIC_KEY_SIZE);
    let ephemeral = IdentityPublicKey::from_bytes(ephemeral_public)
        .map_err(|_| DecryptionError::MalformedCiphertext)?;
    let shared_point =
        ecdh_point(private_key, &ephemeral).map_err(|_| DecryptionError::InvalidPrivateKey)?;

    let mut ephemeral_bytes = [0u8; PUBLIC_KEY_SIZE];
    ephemeral_bytes.copy_from_slice(ephemeral_public);
    let key = derive_key(&ephemeral_bytes, &shared_point, info);
    ear::open_wide_nonce(&key, sealed)
}

// IKM is the ephemeral public key followed by the full shared point, both
// in uncompressed form.
fn derive_key(
    ephemeral_public: &[u8; PUBLIC_KEY_SIZE],
    shared_point: &[u8; PUBLIC_KEY_SIZE],
    info: &[u8],
) -> [u8; kdf::KDF_KEY_SIZE] {
    let mut ikm = Vec::with_capacity(2 * PUBLIC_KEY_SIZE);
    ikm.extend_from_slice(ephemeral_public);
    ikm.extend_from_slice(shared_point);
    kdf::derive(&ikm, info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = IdentityPrivateKey::generate();
        let envelope = encrypt(&key.public_key(), b"secret payload").unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), b"secret payload");
    }

    #[test]
    fn wrong_recipient_fails() {
        let key = IdentityPrivateKey::generate();
        let other = IdentityPrivateKey::generate();
        let envelope = encrypt(&key.public_key(), b"secret payload").unwrap();
        assert!(decrypt(&other, &envelope).is_err());
    }

    #[test]
    fn info_mismatch_fails() {
        let key = IdentityPrivateKey::generate();
        let envelope = encrypt_with_info(&key.public_key(), b"payload", b"context-a").unwrap();
        assert!(decrypt_with_info(&key, &envelope, b"context-b").is_err());
        assert_eq!(
            decrypt_with_info(&key, &envelope, b"context-a").unwrap(),
            b"payload"
        );
    }

    #[test]
    fn short_input_is_rejected() {
        let key = IdentityPrivateKey::generate();
        let short = codec::to_base64(vec![0u8; MIN_ENVELOPE_SIZE - 1]);
        assert_eq!(
            decrypt(&key, &short),
            Err(DecryptionError::CiphertextTooShort)
        );
    }

    #[test]
    fn envelope_layout() {
        let key = IdentityPrivateKey::generate();
        let envelope = encrypt(&key.public_key(), b"x").unwrap();
        let bytes = codec::from_base64(&envelope).unwrap();
        assert_eq!(bytes.len(), PUBLIC_KEY_SIZE + IV_SIZE + TAG_SIZE + 1);
        assert_eq!(bytes[0], 0x04);
    }
}
