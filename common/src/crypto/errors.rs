// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RandomnessError {
    #[error("insufficient randomness")]
    InsufficientRandomness,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EncryptionError {
    /// Not enough randomness to generate nonce or ephemeral key material.
    #[error("randomness error")]
    RandomnessError,
    /// AEAD sealing failed.
    #[error("error encrypting plaintext")]
    EncryptionError,
    /// The plaintext could not be serialized before sealing.
    #[error("error serializing plaintext")]
    SerializationError,
    /// The recipient public key could not be parsed.
    #[error("invalid recipient public key")]
    InvalidPublicKey,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DecryptionError {
    /// AEAD authentication failed.
    #[error("error decrypting ciphertext")]
    DecryptionError,
    /// Ciphertext shorter than the fixed envelope parts.
    #[error("ciphertext too short")]
    CiphertextTooShort,
    /// The ciphertext envelope could not be decoded.
    #[error("malformed ciphertext envelope")]
    MalformedCiphertext,
    /// The plaintext was not valid for the expected shape.
    #[error("error deserializing plaintext")]
    DeserializationError,
    /// The private key could not be parsed.
    #[error("invalid private key")]
    InvalidPrivateKey,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum KeyError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SignatureError {
    /// The signature bytes could not be parsed.
    #[error("malformed signature")]
    MalformedSignature,
    /// Public key recovery from the signature failed.
    #[error("could not recover signer")]
    RecoveryFailed,
    /// The recovered signer does not match the claimed address.
    #[error("signature verification failed")]
    VerificationFailed,
}
