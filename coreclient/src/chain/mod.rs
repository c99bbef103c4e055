// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chain integrity core: the canonical hash string, genesis anchoring and
//! validation of received entries against the local head.
//!
//! Personal entries hash and sign the plaintext content, so their envelope
//! can only be checked after decryption. Group entries hash the
//! ciphertext, which lets the server validate linkage without keys.

use loomcommon::{
    codec,
    crypto::{
        hash::sha256,
        identity::{self, IdentityPrivateKey, PersonalSignature},
        errors::SignatureError,
    },
    identifiers::Address,
    messages::ChainEntry,
    time::TimeStamp,
};
use rand::RngCore;
use thiserror::Error;

/// All-zero 32-byte value anchoring index 0.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The recomputed entry hash does not match the recorded one.
    #[error("invalid hash at index {index}: expected {expected}, got {got}")]
    InvalidHash {
        index: u64,
        expected: String,
        got: String,
    },
    /// The entry does not link to the local head.
    #[error("chain broken: expected prev hash {expected}, got {got}")]
    ChainBroken { expected: String, got: String },
    /// The entry's signature does not recover to the owner address.
    #[error("invalid entry signature: {0}")]
    InvalidSignature(#[from] SignatureError),
}

/// Local view of the newest applied entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub index: u64,
    pub hash: String,
}

/// Where a received entry falls relative to the local head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainPosition {
    /// Directly appendable (genesis or head + 1, with matching link).
    Next,
    /// Index at or below the local head; already applied.
    Duplicate,
    /// Entries are missing; backfill starting at the contained index.
    Gap { missing_from: u64 },
}

/// Canonical string that hashes and signatures commit to.
pub fn canonical_hash_string(index: u64, prev_hash: &str, payload: &str, nonce: &str) -> String {
    format!("{index}:{prev_hash}:{payload}:{nonce}")
}

/// Lowercase hex SHA-256 over the canonical string.
pub fn entry_hash(index: u64, prev_hash: &str, payload: &str, nonce: &str) -> String {
    codec::to_hex(sha256(canonical_hash_string(index, prev_hash, payload, nonce)))
}

/// Classifies a received entry against the local head and checks its
/// back-link when it is appendable.
pub fn classify(
    index: u64,
    prev_hash: &str,
    head: Option<&ChainHead>,
) -> Result<ChainPosition, ChainError> {
    match head {
        None => {
            if index == 0 {
                if prev_hash != GENESIS_HASH {
                    return Err(ChainError::ChainBroken {
                        expected: GENESIS_HASH.to_string(),
                        got: prev_hash.to_string(),
                    });
                }
                Ok(ChainPosition::Next)
            } else {
                Ok(ChainPosition::Gap { missing_from: 0 })
            }
        }
        Some(head) => {
            if index <= head.index {
                Ok(ChainPosition::Duplicate)
            } else if index == head.index + 1 {
                if prev_hash != head.hash {
                    return Err(ChainError::ChainBroken {
                        expected: head.hash.clone(),
                        got: prev_hash.to_string(),
                    });
                }
                Ok(ChainPosition::Next)
            } else {
                Ok(ChainPosition::Gap {
                    missing_from: head.index + 1,
                })
            }
        }
    }
}

/// Recomputes the hash over the visible payload and compares.
pub fn verify_entry_hash(
    index: u64,
    prev_hash: &str,
    payload: &str,
    nonce: &str,
    claimed: &str,
) -> Result<(), ChainError> {
    let expected = entry_hash(index, prev_hash, payload, nonce);
    if expected != claimed {
        return Err(ChainError::InvalidHash {
            index,
            expected,
            got: claimed.to_string(),
        });
    }
    Ok(())
}

/// Builds a personal entry over plaintext content: random nonce, canonical
/// hash, EIP-191 signature over the canonical string.
pub fn build_personal_entry(
    key: &IdentityPrivateKey,
    index: u64,
    prev_hash: &str,
    content: String,
) -> Result<ChainEntry, ChainError> {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce = codec::to_hex(nonce);
    let canonical = canonical_hash_string(index, prev_hash, &content, &nonce);
    let hash = codec::to_hex(sha256(&canonical));
    let signature = key.sign_message(&canonical)?;
    Ok(ChainEntry {
        index,
        prev_hash: prev_hash.to_string(),
        content,
        nonce,
        hash,
        signature: signature.to_hex(),
        created_at: TimeStamp::now(),
    })
}

/// Verifies hash and owner signature of a decrypted personal entry.
pub fn verify_personal_entry(entry: &ChainEntry, owner: &Address) -> Result<(), ChainError> {
    verify_entry_hash(
        entry.index,
        &entry.prev_hash,
        &entry.content,
        &entry.nonce,
        &entry.hash,
    )?;
    let canonical =
        canonical_hash_string(entry.index, &entry.prev_hash, &entry.content, &entry.nonce);
    let signature = PersonalSignature::from_hex(&entry.signature)?;
    identity::verify_message(&canonical, &signature, owner)?;
    Ok(())
}
