// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! This module contains the [`Secret`] struct, which wraps fixed-length
//! symmetric key material. Secrets are wiped on drop and redacted in all
//! formatting output.

use std::fmt::Display;

use rand_chacha::rand_core::{RngCore as _, SeedableRng as _};
use secrecy::zeroize::{Zeroize, ZeroizeOnDrop};
use serde::{Deserialize, Serialize};

use super::errors::RandomnessError;

/// Hex (de)serialization for fixed-length byte arrays of arbitrary const
/// generic size. `hex::serde` only implements `FromHex` for a bounded set of
/// concrete array lengths, which doesn't cover a generic `const LENGTH`.
mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const LENGTH: usize>(
        data: &[u8; LENGTH],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D, const LENGTH: usize>(
        deserializer: D,
    ) -> Result<[u8; LENGTH], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid length for hex-encoded secret"))
    }
}

/// Struct that contains a (symmetric) secret of fixed length LENGTH.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret<const LENGTH: usize> {
    #[serde(with = "hex_array")]
    secret: [u8; LENGTH],
}

impl<const LENGTH: usize> From<[u8; LENGTH]> for Secret<LENGTH> {
    fn from(secret: [u8; LENGTH]) -> Self {
        Self { secret }
    }
}

impl<const LENGTH: usize> Secret<LENGTH> {
    /// Get the internal secret value
    pub fn secret(&self) -> &[u8; LENGTH] {
        &self.secret
    }

    pub fn into_secret(self) -> [u8; LENGTH] {
        self.secret
    }

    /// Generate a fresh, random secret.
    pub fn random() -> Result<Self, RandomnessError> {
        let mut secret = [0; LENGTH];
        rand_chacha::ChaCha20Rng::from_entropy()
            .try_fill_bytes(secret.as_mut_slice())
            .map_err(|_| RandomnessError::InsufficientRandomness)?;
        Ok(Self { secret })
    }
}

// Ensure that secrets are wiped from memory securely upon being dropped.
impl<const LENGTH: usize> Zeroize for Secret<LENGTH> {
    fn zeroize(&mut self) {
        self.secret.zeroize()
    }
}

impl<const LENGTH: usize> ZeroizeOnDrop for Secret<LENGTH> {}

// Ensures that secrets are not printed in debug outputs.
impl<const LENGTH: usize> std::fmt::Debug for Secret<LENGTH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret: [[REDACTED]]").finish()
    }
}

// Ensures that secrets are not printed in format strings.
impl<const LENGTH: usize> Display for Secret<LENGTH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[[REDACTED]]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let secret = Secret::<32>::random().unwrap();
        assert!(!format!("{secret:?}").contains(&hex::encode(secret.secret())));
    }

    #[test]
    fn serde_roundtrip() {
        let secret = Secret::<16>::random().unwrap();
        let json = serde_json::to_string(&secret).unwrap();
        let back: Secret<16> = serde_json::from_str(&json).unwrap();
        assert_eq!(secret, back);
    }
}
