// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! AES-256-GCM sealing with the two fixed envelope layouts used by the
//! protocol. Group application messages use a 12-byte IV, the ECIES
//! envelope a 16-byte IV; both place the parts as `IV ‖ TAG ‖ CT`.

use aes_gcm::{
    Aes256Gcm, KeyInit,
    aead::{Aead as AesGcmAead, Key, Payload, generic_array::GenericArray},
    aes::Aes256,
};
use tracing::error;

use super::{
    errors::{DecryptionError, EncryptionError, RandomnessError},
    secrets::Secret,
};

/// This type determines the AEAD scheme used for content encryption.
pub type Aead = Aes256Gcm;
/// AES-256-GCM with the 16-byte nonce the ECIES envelope uses.
pub type AeadWideNonce = aes_gcm::AesGcm<Aes256, aes_gcm::aead::consts::U16>;

pub const AEAD_KEY_SIZE: usize = 32;
pub const AEAD_NONCE_SIZE: usize = 12;
pub const AEAD_WIDE_NONCE_SIZE: usize = 16;
pub const AEAD_TAG_SIZE: usize = 16;

/// Seals `plaintext` and emits `IV12 ‖ TAG16 ‖ CT`.
pub fn seal(key: &[u8; AEAD_KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let nonce = Secret::<AEAD_NONCE_SIZE>::random()
        .map_err(|RandomnessError::InsufficientRandomness| EncryptionError::RandomnessError)?
        .into_secret();
    let cipher = Aead::new(Key::<Aead>::from_slice(key));
    let tagged = cipher
        .encrypt(GenericArray::from_slice(&nonce), Payload::from(plaintext))
        .map_err(|_| EncryptionError::EncryptionError)?;
    Ok(assemble(&nonce, &tagged))
}

/// Opens an `IV12 ‖ TAG16 ‖ CT` envelope.
pub fn open(key: &[u8; AEAD_KEY_SIZE], envelope: &[u8]) -> Result<Vec<u8>, DecryptionError> {
    let (nonce, tagged) = split::<AEAD_NONCE_SIZE>(envelope)?;
    let cipher = Aead::new(Key::<Aead>::from_slice(key));
    cipher
        .decrypt(GenericArray::from_slice(&nonce), Payload::from(tagged.as_slice()))
        .map_err(|e| {
            error!(%e, "Decryption error");
            DecryptionError::DecryptionError
        })
}

/// Seals `plaintext` with a 16-byte IV and emits `IV16 ‖ TAG16 ‖ CT`.
pub fn seal_wide_nonce(
    key: &[u8; AEAD_KEY_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let nonce = Secret::<AEAD_WIDE_NONCE_SIZE>::random()
        .map_err(|RandomnessError::InsufficientRandomness| EncryptionError::RandomnessError)?
        .into_secret();
    let cipher = AeadWideNonce::new(Key::<AeadWideNonce>::from_slice(key));
    let tagged = cipher
        .encrypt(GenericArray::from_slice(&nonce), Payload::from(plaintext))
        .map_err(|_| EncryptionError::EncryptionError)?;
    Ok(assemble(&nonce, &tagged))
}

/// Opens an `IV16 ‖ TAG16 ‖ CT` envelope.
pub fn open_wide_nonce(
    key: &[u8; AEAD_KEY_SIZE],
    envelope: &[u8],
) -> Result<Vec<u8>, DecryptionError> {
    let (nonce, tagged) = split::<AEAD_WIDE_NONCE_SIZE>(envelope)?;
    let cipher = AeadWideNonce::new(Key::<AeadWideNonce>::from_slice(key));
    cipher
        .decrypt(GenericArray::from_slice(&nonce), Payload::from(tagged.as_slice()))
        .map_err(|_| DecryptionError::DecryptionError)
}

// The aes-gcm crate appends the tag to the ciphertext; the wire format
// carries it up front, right after the IV.
fn assemble(nonce: &[u8], tagged_ciphertext: &[u8]) -> Vec<u8> {
    let split_at = tagged_ciphertext.len() - AEAD_TAG_SIZE;
    let (ciphertext, tag) = tagged_ciphertext.split_at(split_at);
    let mut out = Vec::with_capacity(nonce.len() + tagged_ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    out
}

fn split<const NONCE_SIZE: usize>(
    envelope: &[u8],
) -> Result<([u8; NONCE_SIZE], Vec<u8>), DecryptionError> {
    if envelope.len() < NONCE_SIZE + AEAD_TAG_SIZE {
        return Err(DecryptionError::CiphertextTooShort);
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&envelope[..NONCE_SIZE]);
    let tag = &envelope[NONCE_SIZE..NONCE_SIZE + AEAD_TAG_SIZE];
    let ciphertext = &envelope[NONCE_SIZE + AEAD_TAG_SIZE..];
    let mut tagged = Vec::with_capacity(ciphertext.len() + AEAD_TAG_SIZE);
    tagged.extend_from_slice(ciphertext);
    tagged.extend_from_slice(tag);
    Ok((nonce, tagged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_nonce_roundtrip() {
        let key = [3u8; AEAD_KEY_SIZE];
        let envelope = seal(&key, b"payload").unwrap();
        assert_eq!(open(&key, &envelope).unwrap(), b"payload");
    }

    #[test]
    fn wide_nonce_roundtrip() {
        let key = [4u8; AEAD_KEY_SIZE];
        let envelope = seal_wide_nonce(&key, b"payload").unwrap();
        assert_eq!(open_wide_nonce(&key, &envelope).unwrap(), b"payload");
    }

    #[test]
    fn tampering_is_detected() {
        let key = [5u8; AEAD_KEY_SIZE];
        let mut envelope = seal(&key, b"payload").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 1;
        assert_eq!(open(&key, &envelope), Err(DecryptionError::DecryptionError));
    }

    #[test]
    fn short_envelope_is_rejected() {
        let key = [6u8; AEAD_KEY_SIZE];
        assert_eq!(
            open(&key, &[0u8; 10]),
            Err(DecryptionError::CiphertextTooShort)
        );
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let envelope = seal(&[7u8; AEAD_KEY_SIZE], b"payload").unwrap();
        assert_eq!(
            open(&[8u8; AEAD_KEY_SIZE], &envelope),
            Err(DecryptionError::DecryptionError)
        );
    }
}
