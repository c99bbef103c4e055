// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-epoch access keys and the HMAC proofs presented to the server.
//!
//! The server never learns the group key; it stores one access key per
//! epoch and verifies that appended entries carry an HMAC under the
//! current one. Epoch changes are proven by an HMAC chaining the outgoing
//! key over the incoming one.

use serde::{Deserialize, Serialize};

use crate::{
    codec,
    crypto::{
        hash::{hmac_sha256, hmac_sha256_verify},
        kdf,
        secrets::Secret,
    },
    identifiers::GroupId,
};

pub const ACCESS_KEY_SIZE: usize = 32;

const ACCESS_KEY_CONTEXT: &[u8] = b"server-access";

/// Symmetric key granting proof-of-access for one group epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAccessKey {
    key: Secret<ACCESS_KEY_SIZE>,
    epoch: u64,
}

impl EpochAccessKey {
    /// `HKDF(groupKey ‖ "server-access" ‖ groupId ‖ u32_le(epoch))` with
    /// empty salt and info.
    pub fn derive(group_key: &[u8; 32], group_id: &GroupId, epoch: u64) -> Self {
        let mut ikm = Vec::with_capacity(32 + ACCESS_KEY_CONTEXT.len() + 16 + 4);
        ikm.extend_from_slice(group_key);
        ikm.extend_from_slice(ACCESS_KEY_CONTEXT);
        ikm.extend_from_slice(group_id.as_bytes());
        ikm.extend_from_slice(&(epoch as u32).to_le_bytes());
        Self {
            key: Secret::from(kdf::derive(&ikm, &[])),
            epoch,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn key_bytes(&self) -> &[u8; ACCESS_KEY_SIZE] {
        self.key.secret()
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(self.key.secret())
    }

    pub fn from_parts(key: [u8; ACCESS_KEY_SIZE], epoch: u64) -> Self {
        Self {
            key: Secret::from(key),
            epoch,
        }
    }

    /// HMAC over the canonical hash string of an entry, hex-encoded.
    pub fn access_proof(&self, entry_hash: &str) -> String {
        codec::to_hex(hmac_sha256(self.key.secret(), entry_hash.as_bytes()))
    }

    pub fn verify_access_proof(&self, entry_hash: &str, proof_hex: &str) -> bool {
        let Ok(proof) = codec::from_hex(proof_hex) else {
            return false;
        };
        hmac_sha256_verify(self.key.secret(), entry_hash.as_bytes(), &proof)
    }

    /// Proof that `next` legitimately succeeds this key.
    pub fn transition_proof(&self, next: &EpochAccessKey) -> String {
        codec::to_hex(hmac_sha256(self.key.secret(), next.key.secret()))
    }

    pub fn verify_transition_proof(&self, next_key: &[u8], proof_hex: &str) -> bool {
        let Ok(proof) = codec::from_hex(proof_hex) else {
            return false;
        };
        hmac_sha256_verify(self.key.secret(), next_key, &proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (GroupId, [u8; 32]) {
        (GroupId::from_bytes([1u8; 16]), [2u8; 32])
    }

    #[test]
    fn derivation_is_deterministic_per_epoch() {
        let (group_id, group_key) = fixture();
        let k0 = EpochAccessKey::derive(&group_key, &group_id, 0);
        let k0_again = EpochAccessKey::derive(&group_key, &group_id, 0);
        let k1 = EpochAccessKey::derive(&group_key, &group_id, 1);
        assert_eq!(k0, k0_again);
        assert_ne!(k0.key_bytes(), k1.key_bytes());
    }

    #[test]
    fn access_proof_binds_to_epoch_key() {
        let (group_id, group_key) = fixture();
        let k0 = EpochAccessKey::derive(&group_key, &group_id, 0);
        let k1 = EpochAccessKey::derive(&group_key, &group_id, 1);
        let hash = "00ff00ff";
        let proof = k0.access_proof(hash);
        assert!(k0.verify_access_proof(hash, &proof));
        assert!(!k1.verify_access_proof(hash, &proof));
        assert!(!k0.verify_access_proof("00ff00fe", &proof));
    }

    #[test]
    fn transition_proof_chains_consecutive_keys() {
        let (group_id, group_key) = fixture();
        let k0 = EpochAccessKey::derive(&group_key, &group_id, 0);
        let k1 = EpochAccessKey::derive(&group_key, &group_id, 1);
        let proof = k0.transition_proof(&k1);
        assert!(k0.verify_transition_proof(k1.key_bytes(), &proof));

        // A substituted key invalidates the proof.
        let forged = EpochAccessKey::from_parts([9u8; 32], 1);
        assert!(!k0.verify_transition_proof(forged.key_bytes(), &proof));
    }
}
