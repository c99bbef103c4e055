// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory storage backend. Holds everything behind one async mutex;
//! useful for tests and as a reference for platform implementations.

use std::collections::HashMap;

use loomcommon::{
    crypto::bbs::{GroupPublicKey, MemberCredential},
    identifiers::GroupId,
};
use tokio::sync::Mutex;

use crate::groups::{GroupState, entry::EpochKeys};

use super::{StorageBackend, StorageResult};

#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    group_states: HashMap<GroupId, GroupState>,
    credentials: HashMap<GroupId, MemberCredential>,
    group_public_keys: HashMap<GroupId, GroupPublicKey>,
    epoch_keys: HashMap<GroupId, Vec<EpochKeys>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryStorage {
    async fn save_group_state(&self, state: &GroupState) -> StorageResult<()> {
        self.inner
            .lock()
            .await
            .group_states
            .insert(*state.group_id(), state.clone());
        Ok(())
    }

    async fn load_group_state(&self, group_id: &GroupId) -> StorageResult<Option<GroupState>> {
        Ok(self.inner.lock().await.group_states.get(group_id).cloned())
    }

    async fn delete_group_state(&self, group_id: &GroupId) -> StorageResult<()> {
        self.inner.lock().await.group_states.remove(group_id);
        Ok(())
    }

    async fn list_group_ids(&self) -> StorageResult<Vec<GroupId>> {
        Ok(self.inner.lock().await.group_states.keys().copied().collect())
    }

    async fn save_credential(
        &self,
        group_id: &GroupId,
        credential: &MemberCredential,
    ) -> StorageResult<()> {
        self.inner
            .lock()
            .await
            .credentials
            .insert(*group_id, credential.clone());
        Ok(())
    }

    async fn load_credential(
        &self,
        group_id: &GroupId,
    ) -> StorageResult<Option<MemberCredential>> {
        Ok(self.inner.lock().await.credentials.get(group_id).cloned())
    }

    async fn delete_credential(&self, group_id: &GroupId) -> StorageResult<()> {
        self.inner.lock().await.credentials.remove(group_id);
        Ok(())
    }

    async fn save_group_public_key(
        &self,
        group_id: &GroupId,
        public_key: &GroupPublicKey,
    ) -> StorageResult<()> {
        self.inner
            .lock()
            .await
            .group_public_keys
            .insert(*group_id, public_key.clone());
        Ok(())
    }

    async fn load_group_public_key(
        &self,
        group_id: &GroupId,
    ) -> StorageResult<Option<GroupPublicKey>> {
        Ok(self
            .inner
            .lock()
            .await
            .group_public_keys
            .get(group_id)
            .cloned())
    }

    async fn delete_group_public_key(&self, group_id: &GroupId) -> StorageResult<()> {
        self.inner.lock().await.group_public_keys.remove(group_id);
        Ok(())
    }

    async fn save_epoch_keys(&self, group_id: &GroupId, keys: &[EpochKeys]) -> StorageResult<()> {
        self.inner
            .lock()
            .await
            .epoch_keys
            .insert(*group_id, keys.to_vec());
        Ok(())
    }

    async fn load_epoch_keys(&self, group_id: &GroupId) -> StorageResult<Vec<EpochKeys>> {
        Ok(self
            .inner
            .lock()
            .await
            .epoch_keys
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn group_state_crud() {
        let storage = InMemoryStorage::new();
        let (state, _) =
            GroupState::create(GroupId::random(), &[]).unwrap();
        let group_id = *state.group_id();

        assert!(storage.load_group_state(&group_id).await.unwrap().is_none());
        storage.save_group_state(&state).await.unwrap();
        assert_eq!(
            storage.load_group_state(&group_id).await.unwrap(),
            Some(state)
        );
        assert_eq!(storage.list_group_ids().await.unwrap(), vec![group_id]);
        storage.delete_group_state(&group_id).await.unwrap();
        assert!(storage.load_group_state(&group_id).await.unwrap().is_none());
    }
}
