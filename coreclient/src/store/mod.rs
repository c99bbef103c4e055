// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Abstract storage for key material and group state, plus the store
//! notification channel. Implementations must provide at-rest protection
//! appropriate to the platform; the in-memory variant backs tests.

pub mod memory;
mod notification;

pub use memory::InMemoryStorage;
pub use notification::{StoreNotification, StoreNotificationsSender, StoreNotifier};

use loomcommon::{
    crypto::bbs::{GroupPublicKey, MemberCredential},
    identifiers::GroupId,
};
use thiserror::Error;

use crate::groups::{GroupState, entry::EpochKeys};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The backend was used before `initialize`.
    #[error("storage backend not initialized")]
    NotInitialized,
    /// A stored value could not be (de)serialized.
    #[error("storage serialization failed: {0}")]
    Serialization(String),
    /// Underlying read/write/delete failed.
    #[error("storage I/O failed: {0}")]
    Io(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Per-group key-value storage for group state, membership credentials,
/// group public keys and epoch key material.
#[trait_variant::make(Send)]
pub trait StorageBackend {
    async fn save_group_state(&self, state: &GroupState) -> StorageResult<()>;
    async fn load_group_state(&self, group_id: &GroupId) -> StorageResult<Option<GroupState>>;
    async fn delete_group_state(&self, group_id: &GroupId) -> StorageResult<()>;
    async fn list_group_ids(&self) -> StorageResult<Vec<GroupId>>;

    async fn save_credential(
        &self,
        group_id: &GroupId,
        credential: &MemberCredential,
    ) -> StorageResult<()>;
    async fn load_credential(&self, group_id: &GroupId)
    -> StorageResult<Option<MemberCredential>>;
    async fn delete_credential(&self, group_id: &GroupId) -> StorageResult<()>;

    async fn save_group_public_key(
        &self,
        group_id: &GroupId,
        public_key: &GroupPublicKey,
    ) -> StorageResult<()>;
    async fn load_group_public_key(
        &self,
        group_id: &GroupId,
    ) -> StorageResult<Option<GroupPublicKey>>;
    async fn delete_group_public_key(&self, group_id: &GroupId) -> StorageResult<()>;

    async fn save_epoch_keys(&self, group_id: &GroupId, keys: &[EpochKeys]) -> StorageResult<()>;
    async fn load_epoch_keys(&self, group_id: &GroupId) -> StorageResult<Vec<EpochKeys>>;
}
