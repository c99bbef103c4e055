// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sealing and opening of group chain entries. The ciphertext is the
//! canonical JSON of the payload under the epoch's group key; authorship
//! is proven anonymously with a BBS+ signature over the canonical hash
//! string, and the access proof binds the entry hash to the epoch key.

use loomcommon::{
    codec,
    crypto::{
        bbs::{self, GroupPublicKey, MemberCredential},
        ear,
        epoch::EpochAccessKey,
        hash::sha256,
        identity::{self, IdentityPrivateKey, PersonalSignature},
        secrets::Secret,
    },
    messages::{DecryptedPayload, GroupLogEntry, SystemOp},
    time::TimeStamp,
};
use rand::RngCore;
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng as _};

use crate::chain;

use super::GroupError;

/// Key material of one epoch, kept around to open backlog entries.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochKeys {
    pub epoch: u64,
    pub group_key: Secret<32>,
    pub access_key: EpochAccessKey,
}

/// Builds a complete group entry: payload sealing, canonical hash, BBS+
/// group signature and the epoch access proof.
#[expect(clippy::too_many_arguments)]
pub fn seal_group_entry(
    identity_key: &IdentityPrivateKey,
    credential: &MemberCredential,
    group_public_key: &GroupPublicKey,
    keys: &EpochKeys,
    index: u64,
    prev_hash: &str,
    content: String,
    system_op: Option<SystemOp>,
) -> Result<GroupLogEntry, GroupError> {
    let sender_signature = identity_key.sign_message(&content)?;
    let payload = DecryptedPayload {
        content,
        sender_address: identity_key.address(),
        sender_signature: sender_signature.to_hex(),
        epoch: keys.epoch,
        timestamp: TimeStamp::now(),
        system_op,
    };
    let canonical_payload =
        codec::to_canonical_json(&payload).map_err(|_| GroupError::MalformedMessage)?;
    let sealed = ear::seal(keys.group_key.secret(), canonical_payload.as_bytes())?;
    let ciphertext = codec::to_base64(sealed);

    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce = codec::to_hex(nonce);

    let canonical = chain::canonical_hash_string(index, prev_hash, &ciphertext, &nonce);
    let hash = codec::to_hex(sha256(&canonical));

    let mut rng = ChaCha20Rng::from_entropy();
    let group_signature = bbs::sign(credential, group_public_key, &canonical, &mut rng);
    let access_proof = keys.access_key.access_proof(&hash);

    Ok(GroupLogEntry {
        index,
        prev_hash: prev_hash.to_string(),
        ciphertext,
        nonce,
        hash,
        group_signature: group_signature.to_hex(),
        access_proof,
        created_at: TimeStamp::now(),
    })
}

/// Verifies the full envelope of a received group entry and returns the
/// decrypted payload.
///
/// `keys` must contain the epoch the entry was sealed under; candidates
/// are tried newest first, since during ordered replay the current epoch
/// almost always matches.
pub fn open_group_entry(
    entry: &GroupLogEntry,
    group_public_key: &GroupPublicKey,
    keys: &[EpochKeys],
) -> Result<DecryptedPayload, GroupError> {
    chain::verify_entry_hash(
        entry.index,
        &entry.prev_hash,
        &entry.ciphertext,
        &entry.nonce,
        &entry.hash,
    )
    .map_err(|_| GroupError::InvalidEntryHash(entry.index))?;

    let canonical = chain::canonical_hash_string(
        entry.index,
        &entry.prev_hash,
        &entry.ciphertext,
        &entry.nonce,
    );
    let group_signature = bbs::GroupSignature::from_hex(&entry.group_signature)?;
    bbs::verify(group_public_key, &canonical, &group_signature)?;

    let sealed =
        codec::from_base64(&entry.ciphertext).map_err(|_| GroupError::MalformedMessage)?;
    let (payload, epoch_keys) = keys
        .iter()
        .rev()
        .find_map(|candidate| {
            let plaintext = ear::open(candidate.group_key.secret(), &sealed).ok()?;
            let payload: DecryptedPayload = serde_json::from_slice(&plaintext).ok()?;
            Some((payload, candidate))
        })
        .ok_or(GroupError::NoDecryptableSecret)?;

    if payload.epoch != epoch_keys.epoch {
        return Err(GroupError::InvalidEpoch {
            expected: epoch_keys.epoch,
            got: payload.epoch,
        });
    }
    if !epoch_keys.access_key.verify_access_proof(&entry.hash, &entry.access_proof) {
        return Err(GroupError::InvalidAccessProof(payload.epoch));
    }

    let sender_signature = PersonalSignature::from_hex(&payload.sender_signature)?;
    identity::verify_message(&payload.content, &sender_signature, &payload.sender_address)?;

    Ok(payload)
}

/// Checks the transition proof of an `epoch_transition` system operation
/// against the outgoing epoch's access key.
pub fn verify_epoch_transition(
    previous: &EpochAccessKey,
    system_op: &SystemOp,
) -> Result<(), GroupError> {
    let SystemOp::EpochTransition {
        new_access_key,
        transition_proof,
        ..
    } = system_op
    else {
        return Err(GroupError::MalformedMessage);
    };
    let next_key =
        codec::from_hex(new_access_key).map_err(|_| GroupError::MalformedMessage)?;
    if !previous.verify_transition_proof(&next_key, transition_proof) {
        return Err(GroupError::InvalidEpochTransition);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use loomcommon::{crypto::bbs::ManagerPrivateKey, identifiers::GroupId};
    use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng as _};

    use super::*;

    fn fixture() -> (
        IdentityPrivateKey,
        MemberCredential,
        GroupPublicKey,
        EpochKeys,
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let manager = ManagerPrivateKey::generate(&mut rng);
        let credential = manager.issue_credential(&mut rng);
        let group_id = GroupId::from_bytes([7u8; 16]);
        let group_key = [3u8; 32];
        let keys = EpochKeys {
            epoch: 0,
            group_key: Secret::from(group_key),
            access_key: EpochAccessKey::derive(&group_key, &group_id, 0),
        };
        (
            IdentityPrivateKey::generate(),
            credential,
            manager.public_key().clone(),
            keys,
        )
    }

    #[test]
    fn seal_and_open_roundtrip() {
        let (identity_key, credential, group_public_key, keys) = fixture();
        let entry = seal_group_entry(
            &identity_key,
            &credential,
            &group_public_key,
            &keys,
            0,
            chain::GENESIS_HASH,
            "[]".into(),
            None,
        )
        .unwrap();
        let payload =
            open_group_entry(&entry, &group_public_key, std::slice::from_ref(&keys)).unwrap();
        assert_eq!(payload.content, "[]");
        assert_eq!(payload.epoch, 0);
        assert_eq!(payload.sender_address, identity_key.address());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let (identity_key, credential, group_public_key, keys) = fixture();
        let mut entry = seal_group_entry(
            &identity_key,
            &credential,
            &group_public_key,
            &keys,
            0,
            chain::GENESIS_HASH,
            "[]".into(),
            None,
        )
        .unwrap();
        entry.ciphertext = format!("{}A", &entry.ciphertext[..entry.ciphertext.len() - 1]);
        assert!(open_group_entry(&entry, &group_public_key, std::slice::from_ref(&keys)).is_err());
    }

    #[test]
    fn access_proof_from_other_epoch_is_rejected() {
        let (identity_key, credential, group_public_key, keys) = fixture();
        let group_id = GroupId::from_bytes([7u8; 16]);
        let other_keys = EpochKeys {
            epoch: 1,
            group_key: keys.group_key.clone(),
            access_key: EpochAccessKey::derive(keys.group_key.secret(), &group_id, 1),
        };
        let mut entry = seal_group_entry(
            &identity_key,
            &credential,
            &group_public_key,
            &keys,
            0,
            chain::GENESIS_HASH,
            "[]".into(),
            None,
        )
        .unwrap();
        // Replace the proof with one under the wrong epoch key.
        entry.access_proof = other_keys.access_key.access_proof(&entry.hash);
        assert_eq!(
            open_group_entry(&entry, &group_public_key, std::slice::from_ref(&keys)),
            Err(GroupError::InvalidAccessProof(0))
        );
    }

    #[test]
    fn epoch_transition_proof_chain() {
        let group_id = GroupId::from_bytes([9u8; 16]);
        let k0 = EpochAccessKey::derive(&[1u8; 32], &group_id, 0);
        let k1 = EpochAccessKey::derive(&[2u8; 32], &group_id, 1);
        let op = SystemOp::EpochTransition {
            new_epoch: 1,
            new_access_key: k1.to_hex(),
            transition_proof: k0.transition_proof(&k1),
        };
        verify_epoch_transition(&k0, &op).unwrap();

        // A substituted key breaks the chain.
        let forged = EpochAccessKey::derive(&[3u8; 32], &group_id, 1);
        let bad = SystemOp::EpochTransition {
            new_epoch: 1,
            new_access_key: forged.to_hex(),
            transition_proof: k0.transition_proof(&k1),
        };
        assert_eq!(
            verify_epoch_transition(&k0, &bad),
            Err(GroupError::InvalidEpochTransition)
        );
    }
}
