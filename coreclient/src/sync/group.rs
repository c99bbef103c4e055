// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Controller for a multi-party group log. Entries are sealed under the
//! MLS-derived group key, authorship is proven with an anonymous BBS+
//! signature, and each entry carries an access proof under the epoch key.
//! Handshake messages (add/remove/update/welcome) arrive out of band;
//! applying one advances the epoch and yields the `epoch_transition`
//! system operation to append alongside the next entry.

use std::collections::BTreeSet;

use loomcommon::{
    crypto::{
        bbs::{GroupPublicKey, ManagerPrivateKey, MemberCredential},
        epoch::EpochAccessKey,
        identity::IdentityPrivateKey,
        secrets::Secret,
    },
    identifiers::GroupId,
    messages::{
        AppendGroupChainLogRequest, CreateGroupRequest, GroupLogEntry, SystemOp,
        push::PushEvent,
    },
};
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng as _};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    chain::{self, ChainHead, ChainPosition},
    dblog::{self, Action, ReplayEngine},
    groups::{
        GroupError, GroupState,
        entry::{self, EpochKeys},
        messages::GroupMessage,
    },
    store::{StorageBackend, StoreNotification, StoreNotificationsSender, StoreNotifier},
    sync::{LogTransport, SyncError, SyncState},
};

const PAGE_LIMIT: u32 = 100;
const HEAD_INDEX_KEY: &str = "group_head_index";
const HEAD_HASH_KEY: &str = "group_head_hash";

struct Inner {
    head: Option<ChainHead>,
    state: GroupState,
    epoch_keys: Vec<EpochKeys>,
}

/// Sync controller for one group log database.
pub struct GroupLogController<T, S> {
    db_name: String,
    group_id: GroupId,
    identity_key: IdentityPrivateKey,
    credential: MemberCredential,
    group_public_key: GroupPublicKey,
    transport: T,
    storage: S,
    engine: ReplayEngine,
    notifications: StoreNotificationsSender,
    inner: Mutex<Inner>,
}

impl<T: LogTransport, S: StorageBackend> GroupLogController<T, S> {
    /// Creates a fresh group: ratchet state, BBS+ group parameters, the
    /// creator's own credential and the epoch-0 access key, registered
    /// with the server and persisted. Returns the controller, the manager
    /// key (for issuing further credentials) and the member welcomes.
    #[expect(clippy::too_many_arguments)]
    pub async fn create_group(
        transport: T,
        storage: S,
        pool: SqlitePool,
        identity_key: IdentityPrivateKey,
        db_name: impl Into<String>,
        group_id: GroupId,
        initial_members: &[loomcommon::crypto::identity::IdentityPublicKey],
    ) -> Result<(Self, ManagerPrivateKey, Vec<GroupMessage>), SyncError> {
        let mut rng = ChaCha20Rng::from_entropy();
        let manager = ManagerPrivateKey::generate(&mut rng);
        let credential = manager.issue_credential(&mut rng);
        let (state, welcomes) = GroupState::create(group_id, initial_members)?;
        let keys = EpochKeys {
            epoch: state.epoch(),
            group_key: Secret::from(*state.group_key()),
            access_key: EpochAccessKey::derive(state.group_key(), &group_id, state.epoch()),
        };

        transport
            .create_group(CreateGroupRequest {
                group_id,
                group_public_key: manager.public_key().to_hex(),
                initial_access_key: keys.access_key.to_hex(),
            })
            .await?;

        storage.save_group_state(&state).await?;
        storage.save_credential(&group_id, &credential).await?;
        storage
            .save_group_public_key(&group_id, manager.public_key())
            .await?;
        storage
            .save_epoch_keys(&group_id, std::slice::from_ref(&keys))
            .await?;

        let controller = Self {
            db_name: db_name.into(),
            group_id,
            identity_key,
            credential,
            group_public_key: manager.public_key().clone(),
            transport,
            storage,
            engine: ReplayEngine::new(pool),
            notifications: StoreNotificationsSender::new(),
            inner: Mutex::new(Inner {
                head: None,
                state,
                epoch_keys: vec![keys],
            }),
        };
        Ok((controller, manager, welcomes))
    }

    /// Joins from a welcome message. The credential must have been issued
    /// by the group manager out of band.
    #[expect(clippy::too_many_arguments)]
    pub async fn join_group(
        transport: T,
        storage: S,
        pool: SqlitePool,
        identity_key: IdentityPrivateKey,
        db_name: impl Into<String>,
        welcome: &GroupMessage,
        leaf_key: IdentityPrivateKey,
        credential: MemberCredential,
        group_public_key: GroupPublicKey,
    ) -> Result<Self, SyncError> {
        if !credential.is_valid_for(&group_public_key) {
            return Err(SyncError::InvalidCredential);
        }
        let state = GroupState::process_welcome(welcome, leaf_key)?;
        let group_id = *state.group_id();
        let keys = EpochKeys {
            epoch: state.epoch(),
            group_key: Secret::from(*state.group_key()),
            access_key: EpochAccessKey::derive(state.group_key(), &group_id, state.epoch()),
        };
        storage.save_group_state(&state).await?;
        storage.save_credential(&group_id, &credential).await?;
        storage
            .save_group_public_key(&group_id, &group_public_key)
            .await?;
        storage
            .save_epoch_keys(&group_id, std::slice::from_ref(&keys))
            .await?;
        Ok(Self {
            db_name: db_name.into(),
            group_id,
            identity_key,
            credential,
            group_public_key,
            transport,
            storage,
            engine: ReplayEngine::new(pool),
            notifications: StoreNotificationsSender::new(),
            inner: Mutex::new(Inner {
                head: None,
                state,
                epoch_keys: vec![keys],
            }),
        })
    }

    /// Restores a controller from storage.
    pub async fn load(
        transport: T,
        storage: S,
        pool: SqlitePool,
        identity_key: IdentityPrivateKey,
        db_name: impl Into<String>,
        group_id: GroupId,
    ) -> Result<Self, SyncError> {
        let state = storage
            .load_group_state(&group_id)
            .await?
            .ok_or(SyncError::NotInitialized)?;
        let credential = storage
            .load_credential(&group_id)
            .await?
            .ok_or(SyncError::NotInitialized)?;
        let group_public_key = storage
            .load_group_public_key(&group_id)
            .await?
            .ok_or(SyncError::NotInitialized)?;
        let epoch_keys = storage.load_epoch_keys(&group_id).await?;
        Ok(Self {
            db_name: db_name.into(),
            group_id,
            identity_key,
            credential,
            group_public_key,
            transport,
            storage,
            engine: ReplayEngine::new(pool),
            notifications: StoreNotificationsSender::new(),
            inner: Mutex::new(Inner {
                head: None,
                state,
                epoch_keys,
            }),
        })
    }

    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.engine.initialize().await?;
        let mut inner = self.inner.lock().await;
        let index = self.engine.get_meta(HEAD_INDEX_KEY).await?;
        let hash = self.engine.get_meta(HEAD_HASH_KEY).await?;
        inner.head = match (index, hash) {
            (Some(index), Some(hash)) => {
                index.parse().ok().map(|index| ChainHead { index, hash })
            }
            _ => None,
        };
        debug!(group = %self.group_id, head = ?inner.head, "initialized group log");
        Ok(())
    }

    pub fn subscribe(
        &self,
    ) -> impl tokio_stream::Stream<Item = std::sync::Arc<StoreNotification>> {
        self.notifications.subscribe()
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.lock().await.state.epoch()
    }

    /// Removes the group from storage (explicit leave).
    pub async fn leave(self) -> Result<(), SyncError> {
        self.storage.delete_group_state(&self.group_id).await?;
        self.storage.delete_credential(&self.group_id).await?;
        self.storage.delete_group_public_key(&self.group_id).await?;
        Ok(())
    }

    /// Adds a member: mutates the ratchet, persists, and returns the
    /// add message, the welcome and the epoch transition to append.
    pub async fn add_member(
        &self,
        new_member: &loomcommon::crypto::identity::IdentityPublicKey,
    ) -> Result<(GroupMessage, GroupMessage, SystemOp), SyncError> {
        let mut inner = self.inner.lock().await;
        let (add, welcome) = inner.state.add_member(new_member)?;
        let transition = self.advance_epoch(&mut inner).await?;
        Ok((add, welcome, transition))
    }

    /// Removes a member; returns the remove message and epoch transition.
    pub async fn remove_member(
        &self,
        leaf_index: u32,
    ) -> Result<(GroupMessage, SystemOp), SyncError> {
        let mut inner = self.inner.lock().await;
        let remove = inner.state.remove_member(leaf_index)?;
        let transition = self.advance_epoch(&mut inner).await?;
        Ok((remove, transition))
    }

    /// Rotates the own leaf key; returns the update message and epoch
    /// transition.
    pub async fn update_own_key(&self) -> Result<(GroupMessage, SystemOp), SyncError> {
        let mut inner = self.inner.lock().await;
        let update = inner.state.update_own_key()?;
        let transition = self.advance_epoch(&mut inner).await?;
        Ok((update, transition))
    }

    /// Applies a received handshake message and returns the matching
    /// epoch transition operation.
    pub async fn apply_group_message(
        &self,
        message: &GroupMessage,
    ) -> Result<SystemOp, SyncError> {
        let mut inner = self.inner.lock().await;
        inner.state.process_message(message)?;
        self.advance_epoch(&mut inner).await
    }

    /// Pulls everything past the local head, verifies and replays it.
    pub async fn sync(&self) -> Result<BTreeSet<String>, SyncError> {
        let mut inner = self.inner.lock().await;
        self.notify_state(SyncState::Syncing);
        let result = self.sync_locked(&mut inner).await;
        self.notify_state(match &result {
            Ok(_) => SyncState::Idle,
            Err(_) => SyncState::Error,
        });
        result
    }

    /// Seals and posts an entry, then applies it locally. A conflicting
    /// append resyncs once and retries.
    pub async fn append(
        &self,
        actions: &[Action],
        system_op: Option<SystemOp>,
    ) -> Result<u64, SyncError> {
        let content = dblog::encode_actions(actions)?;
        let mut inner = self.inner.lock().await;
        let mut resynced = false;
        loop {
            let (index, prev_hash) = match &inner.head {
                Some(head) => (head.index + 1, head.hash.clone()),
                None => (0, chain::GENESIS_HASH.to_string()),
            };
            // An epoch transition entry is still sealed and proven under
            // the outgoing epoch's keys; the server adopts the new key
            // only after verifying the transition proof.
            let keys = match &system_op {
                Some(SystemOp::EpochTransition { new_epoch, .. }) => inner
                    .epoch_keys
                    .iter()
                    .find(|keys| keys.epoch + 1 == *new_epoch)
                    .ok_or(GroupError::UnknownEpochKey(new_epoch.saturating_sub(1)))?
                    .clone(),
                _ => current_keys(&inner)?.clone(),
            };
            let entry = entry::seal_group_entry(
                &self.identity_key,
                &self.credential,
                &self.group_public_key,
                &keys,
                index,
                &prev_hash,
                content.clone(),
                system_op.clone(),
            )?;
            match self
                .transport
                .group_append(
                    &self.group_id,
                    &self.db_name,
                    AppendGroupChainLogRequest {
                        entry: entry.clone(),
                    },
                )
                .await
            {
                Ok(_) => {
                    self.apply_verified(&mut inner, &entry, &content).await?;
                    return Ok(index);
                }
                Err(err) if err.is_conflict() && !resynced => {
                    warn!(group = %self.group_id, index, "append conflict, resyncing");
                    resynced = true;
                    self.sync_locked(&mut inner).await?;
                }
                Err(err) if err.is_conflict() => {
                    return Err(SyncError::Conflict { index });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Push-channel delivery; gaps trigger a full sync.
    pub async fn handle_push_event(
        &self,
        event: &PushEvent,
    ) -> Result<BTreeSet<String>, SyncError> {
        let PushEvent::NewGroupLog { group_id, entry } = event else {
            return Ok(BTreeSet::new());
        };
        if *group_id != self.group_id {
            return Ok(BTreeSet::new());
        }
        let outcome = {
            let mut inner = self.inner.lock().await;
            self.apply_remote(&mut inner, entry).await
        };
        match outcome {
            Err(SyncError::GapDetected { missing_from }) => {
                debug!(group = %self.group_id, missing_from, "push gap, running sync");
                self.sync().await
            }
            other => other,
        }
    }

    async fn sync_locked(&self, inner: &mut Inner) -> Result<BTreeSet<String>, SyncError> {
        let Some(server_head) = self
            .transport
            .group_head(&self.group_id, &self.db_name)
            .await?
        else {
            return Ok(BTreeSet::new());
        };
        let mut affected = BTreeSet::new();
        while inner
            .head
            .as_ref()
            .is_none_or(|head| head.index < server_head.index)
        {
            let start = inner.head.as_ref().map_or(0, |head| head.index + 1);
            let page = self
                .transport
                .group_logs(&self.group_id, &self.db_name, start, PAGE_LIMIT)
                .await?;
            if page.logs.is_empty() {
                break;
            }
            for entry in &page.logs {
                affected.extend(self.apply_remote(inner, entry).await?);
            }
            if !page.has_more {
                break;
            }
        }
        Ok(affected)
    }

    async fn apply_remote(
        &self,
        inner: &mut Inner,
        entry: &GroupLogEntry,
    ) -> Result<BTreeSet<String>, SyncError> {
        match chain::classify(entry.index, &entry.prev_hash, inner.head.as_ref())? {
            ChainPosition::Duplicate => return Ok(BTreeSet::new()),
            ChainPosition::Gap { missing_from } => {
                return Err(SyncError::GapDetected { missing_from });
            }
            ChainPosition::Next => {}
        }
        let payload =
            entry::open_group_entry(entry, &self.group_public_key, &inner.epoch_keys)?;
        if let Some(op @ SystemOp::EpochTransition { .. }) = &payload.system_op {
            let previous = inner
                .epoch_keys
                .iter()
                .find(|keys| keys.epoch == payload.epoch)
                .ok_or(GroupError::UnknownEpochKey(payload.epoch))?;
            entry::verify_epoch_transition(&previous.access_key, op)?;
        }
        self.apply_verified(inner, entry, &payload.content).await
    }

    async fn apply_verified(
        &self,
        inner: &mut Inner,
        entry: &GroupLogEntry,
        content: &str,
    ) -> Result<BTreeSet<String>, SyncError> {
        let actions = dblog::decode_actions(content)?;
        let affected = self.engine.apply_entry(entry.index, &actions).await?;
        inner.head = Some(ChainHead {
            index: entry.index,
            hash: entry.hash.clone(),
        });
        self.engine
            .set_meta(HEAD_INDEX_KEY, &entry.index.to_string())
            .await?;
        self.engine.set_meta(HEAD_HASH_KEY, &entry.hash).await?;

        let mut notifier = StoreNotifier::new(self.notifications.clone());
        notifier
            .entry_applied(entry.index)
            .tables_affected(affected.iter().cloned());
        notifier.notify();
        debug!(group = %self.group_id, index = entry.index, "applied group entry");
        Ok(affected)
    }

    // Derive and persist the key material of the epoch the state just
    // entered, and build the transition proof from the previous epoch.
    async fn advance_epoch(&self, inner: &mut Inner) -> Result<SystemOp, SyncError> {
        let state = &inner.state;
        let new_keys = EpochKeys {
            epoch: state.epoch(),
            group_key: Secret::from(*state.group_key()),
            access_key: EpochAccessKey::derive(state.group_key(), &self.group_id, state.epoch()),
        };
        let previous = inner
            .epoch_keys
            .iter()
            .rev()
            .find(|keys| keys.epoch < new_keys.epoch)
            .ok_or(SyncError::NotInitialized)?;
        let transition = SystemOp::EpochTransition {
            new_epoch: new_keys.epoch,
            new_access_key: new_keys.access_key.to_hex(),
            transition_proof: previous.access_key.transition_proof(&new_keys.access_key),
        };
        inner.epoch_keys.retain(|keys| keys.epoch != new_keys.epoch);
        inner.epoch_keys.push(new_keys);
        self.storage.save_group_state(&inner.state).await?;
        self.storage
            .save_epoch_keys(&self.group_id, &inner.epoch_keys)
            .await?;
        Ok(transition)
    }

    fn notify_state(&self, state: SyncState) {
        let mut notifier = StoreNotifier::new(self.notifications.clone());
        notifier.sync_state_changed(state);
        notifier.notify();
    }
}

fn current_keys(inner: &Inner) -> Result<&EpochKeys, SyncError> {
    inner
        .epoch_keys
        .last()
        .ok_or(SyncError::NotInitialized)
}
