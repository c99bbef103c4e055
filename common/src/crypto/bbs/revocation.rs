// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pairing-based revocation accumulator. Revoking a credential divides the
//! accumulator by the credential exponent; holders of unrevoked
//! credentials can present a witness satisfying `acc = witness·e`.

use bls12_381::{G1Affine, G1Projective, G2Affine, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    codec,
    crypto::bls::{self, PointDecodingError, pairing_eq, random_scalar},
};

/// The group's current accumulator value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationAccumulator {
    acc: G1Affine,
}

/// Witness that a credential exponent is still accumulated.
pub type RevocationWitness = G1Affine;

impl RevocationAccumulator {
    /// Initializes the accumulator as `α·g1` for a random `α`.
    pub fn new(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let alpha = random_scalar(rng);
        Self {
            acc: G1Affine::from(G1Projective::generator() * alpha),
        }
    }

    pub fn value(&self) -> &G1Affine {
        &self.acc
    }

    /// Witness for an unrevoked credential exponent.
    pub fn witness_for(&self, e: &Scalar) -> Option<RevocationWitness> {
        let inverse = Option::<Scalar>::from(e.invert())?;
        Some(G1Affine::from(self.acc * inverse))
    }

    /// Revokes the credential with exponent `e`. Returns the prior
    /// accumulator value, which existing witnesses were computed against.
    pub fn revoke(&mut self, e: &Scalar) -> Option<G1Affine> {
        let inverse = Option::<Scalar>::from(e.invert())?;
        let prior = self.acc;
        self.acc = G1Affine::from(self.acc * inverse);
        Some(prior)
    }

    /// `e(acc, g2) == e(witness·e, g2)` means the credential is *not*
    /// revoked.
    pub fn is_member(&self, witness: &RevocationWitness, e: &Scalar) -> bool {
        let scaled = G1Affine::from(witness * e);
        pairing_eq(&self.acc, &G2Affine::generator(), &scaled, &G2Affine::generator())
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(bls::g1_to_bytes(&self.acc))
    }

    pub fn from_hex(input: &str) -> Result<Self, PointDecodingError> {
        Ok(Self {
            acc: bls::g1_from_hex(input)?,
        })
    }
}

impl Serialize for RevocationAccumulator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RevocationAccumulator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng as _};

    use super::*;

    #[test]
    fn fresh_witness_passes_membership_check() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let accumulator = RevocationAccumulator::new(&mut rng);
        let e = random_scalar(&mut rng);
        let witness = accumulator.witness_for(&e).unwrap();
        assert!(accumulator.is_member(&witness, &e));
    }

    #[test]
    fn revocation_invalidates_witness() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let mut accumulator = RevocationAccumulator::new(&mut rng);
        let e = random_scalar(&mut rng);
        let witness = accumulator.witness_for(&e).unwrap();
        accumulator.revoke(&e).unwrap();
        assert!(!accumulator.is_member(&witness, &e));
    }

    #[test]
    fn other_members_stay_valid_after_rewitnessing() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let mut accumulator = RevocationAccumulator::new(&mut rng);
        let revoked = random_scalar(&mut rng);
        let kept = random_scalar(&mut rng);
        accumulator.revoke(&revoked).unwrap();
        let witness = accumulator.witness_for(&kept).unwrap();
        assert!(accumulator.is_member(&witness, &kept));
    }
}
