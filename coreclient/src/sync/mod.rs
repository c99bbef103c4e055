// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sync controllers: one per log instance, tying the transport, the
//! crypto envelope and the replay engine together. At most one sync per
//! log runs at a time, and appends wait for in-flight syncs, so the local
//! database always advances in strict index order.

mod group;
mod personal;
mod transport;

pub use group::GroupLogController;
pub use personal::PersonalLogController;
pub use transport::LogTransport;

use loomapiclient::ApiClientError;
use loomcommon::crypto::errors::{DecryptionError, EncryptionError};
use thiserror::Error;

use crate::{
    chain::ChainError, dblog::DBLogError, groups::GroupError, store::StorageError,
};

/// Observable state of a log instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    DBLog(#[from] DBLogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] ApiClientError),
    #[error(transparent)]
    Decryption(#[from] DecryptionError),
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    /// Entries are missing between the local head and the received entry.
    #[error("gap detected, missing entries from index {missing_from}")]
    GapDetected { missing_from: u64 },
    /// The append collided with a concurrent writer even after a resync.
    #[error("append conflict at index {index}")]
    Conflict { index: u64 },
    /// Required state (group, credential, keys) is not in storage.
    #[error("log instance not initialized")]
    NotInitialized,
    /// The membership credential does not verify under the group's
    /// public parameters.
    #[error("invalid membership credential")]
    InvalidCredential,
}
