// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use loomcommon::crypto::{
    bbs::GroupSignatureError,
    errors::{DecryptionError, EncryptionError, KeyError, RandomnessError, SignatureError},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    /// Message epoch does not match what the local state expects.
    #[error("invalid epoch: expected {expected}, got {got}")]
    InvalidEpoch { expected: u64, got: u64 },
    /// The addressed group does not match this state.
    #[error("message is for a different group")]
    WrongGroup,
    /// The referenced leaf is empty or out of range.
    #[error("unknown leaf index {0}")]
    UnknownLeaf(u32),
    /// Members cannot remove themselves.
    #[error("cannot remove own leaf")]
    RemoveSelf,
    /// No ciphertext in the update path was addressed to a key we hold.
    #[error("update path carries no secret decryptable by this member")]
    NoDecryptableSecret,
    /// The derived node key does not match the announced public key.
    #[error("derived path diverges from announced public keys")]
    PathMismatch,
    /// The welcome does not match the local leaf key.
    #[error("welcome leaf does not match own key")]
    WelcomeKeyMismatch,
    /// The recomputed entry hash does not match the recorded one.
    #[error("invalid entry hash at index {0}")]
    InvalidEntryHash(u64),
    #[error("not enough randomness")]
    Randomness(#[from] RandomnessError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    #[error(transparent)]
    Decryption(#[from] DecryptionError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    GroupSignature(#[from] GroupSignatureError),
    /// The access proof does not verify under the epoch key.
    #[error("invalid access proof for epoch {0}")]
    InvalidAccessProof(u64),
    /// No access key stored for the entry's epoch.
    #[error("no access key for epoch {0}")]
    UnknownEpochKey(u64),
    /// The chained transition proof does not verify.
    #[error("invalid epoch transition")]
    InvalidEpochTransition,
    /// A message body could not be serialized or parsed.
    #[error("malformed group message")]
    MalformedMessage,
}
