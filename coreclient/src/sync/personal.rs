// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Controller for the single-owner personal log: content is ECIES
//! encrypted to the owner's own key, entries are signed with the identity
//! key, and every verified entry is replayed into the local store.

use std::collections::BTreeSet;

use loomcommon::{
    crypto::identity::{IdentityPrivateKey, ecies},
    identifiers::Address,
    messages::{AppendChainLogRequest, ChainEntry, EncryptedChainEntry, push::PushEvent},
};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    chain::{self, ChainHead, ChainPosition},
    dblog::{self, Action, ReplayEngine},
    store::{StoreNotification, StoreNotificationsSender, StoreNotifier},
    sync::{LogTransport, SyncError, SyncState},
};

const PAGE_LIMIT: u32 = 100;
const HEAD_INDEX_KEY: &str = "head_index";
const HEAD_HASH_KEY: &str = "head_hash";

struct Inner {
    head: Option<ChainHead>,
}

/// Sync controller for one personal log database.
pub struct PersonalLogController<T> {
    db_name: String,
    owner_key: IdentityPrivateKey,
    owner_address: Address,
    transport: T,
    engine: ReplayEngine,
    notifications: StoreNotificationsSender,
    // Serializes syncs and appends per log instance.
    inner: Mutex<Inner>,
}

impl<T: LogTransport> PersonalLogController<T> {
    pub fn new(
        transport: T,
        pool: SqlitePool,
        owner_key: IdentityPrivateKey,
        db_name: impl Into<String>,
    ) -> Self {
        let owner_address = owner_key.address();
        Self {
            db_name: db_name.into(),
            owner_key,
            owner_address,
            transport,
            engine: ReplayEngine::new(pool),
            notifications: StoreNotificationsSender::new(),
            inner: Mutex::new(Inner { head: None }),
        }
    }

    /// Opens the store, creates bookkeeping tables and loads the cursor
    /// and head.
    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.engine.initialize().await?;
        let mut inner = self.inner.lock().await;
        let index = self.engine.get_meta(HEAD_INDEX_KEY).await?;
        let hash = self.engine.get_meta(HEAD_HASH_KEY).await?;
        inner.head = match (index, hash) {
            (Some(index), Some(hash)) => index
                .parse()
                .ok()
                .map(|index| ChainHead { index, hash }),
            _ => None,
        };
        debug!(db = %self.db_name, head = ?inner.head, "initialized personal log");
        Ok(())
    }

    pub fn subscribe(
        &self,
    ) -> impl tokio_stream::Stream<Item = std::sync::Arc<StoreNotification>> {
        self.notifications.subscribe()
    }

    pub async fn head(&self) -> Option<ChainHead> {
        self.inner.lock().await.head.clone()
    }

    /// Pulls everything past the local head, verifies and replays it.
    /// Returns the set of affected table names.
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

    async fn sync_locked(&self, inner: &mut Inner) -> Result<BTreeSet<String>, SyncError> {
        let Some(server_head) = self.transport.personal_head(&self.db_name).await? else {
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
                .personal_logs(&self.db_name, start, PAGE_LIMIT)
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

    /// Assembles, signs, encrypts and posts an entry, then applies it
    /// locally through the same pipeline used for received entries. On a
    /// conflict the log is resynced once and the append retried.
    pub async fn append(&self, actions: &[Action]) -> Result<u64, SyncError> {
        let content = dblog::encode_actions(actions)?;
        let mut inner = self.inner.lock().await;
        let mut resynced = false;
        loop {
            let (index, prev_hash) = match &inner.head {
                Some(head) => (head.index + 1, head.hash.clone()),
                None => (0, chain::GENESIS_HASH.to_string()),
            };
            let plain =
                chain::build_personal_entry(&self.owner_key, index, &prev_hash, content.clone())?;
            let encrypted =
                ecies::encrypt(&self.owner_key.public_key(), plain.content.as_bytes())?;
            let wire = EncryptedChainEntry {
                index: plain.index,
                prev_hash: plain.prev_hash.clone(),
                content: encrypted,
                nonce: plain.nonce.clone(),
                hash: plain.hash.clone(),
                signature: plain.signature.clone(),
                created_at: plain.created_at,
            };
            match self
                .transport
                .personal_append(&self.db_name, AppendChainLogRequest { entry: wire })
                .await
            {
                Ok(_) => {
                    self.apply_verified(&mut inner, &plain).await?;
                    return Ok(index);
                }
                Err(err) if err.is_conflict() && !resynced => {
                    warn!(db = %self.db_name, index, "append conflict, resyncing");
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

    /// Feeds an out-of-band entry from the push channel through the same
    /// verify/validate/replay pipeline. A detected gap triggers a sync.
    pub async fn handle_push_event(
        &self,
        event: &PushEvent,
    ) -> Result<BTreeSet<String>, SyncError> {
        let PushEvent::NewLog { entry } = event else {
            return Ok(BTreeSet::new());
        };
        let outcome = {
            let mut inner = self.inner.lock().await;
            self.apply_remote(&mut inner, entry).await
        };
        match outcome {
            Err(SyncError::GapDetected { missing_from }) => {
                debug!(db = %self.db_name, missing_from, "push gap, running sync");
                self.sync().await
            }
            other => other,
        }
    }

    // Decrypt, chain-validate, envelope-verify and replay one wire entry.
    async fn apply_remote(
        &self,
        inner: &mut Inner,
        entry: &EncryptedChainEntry,
    ) -> Result<BTreeSet<String>, SyncError> {
        match chain::classify(entry.index, &entry.prev_hash, inner.head.as_ref())? {
            ChainPosition::Duplicate => return Ok(BTreeSet::new()),
            ChainPosition::Gap { missing_from } => {
                return Err(SyncError::GapDetected { missing_from });
            }
            ChainPosition::Next => {}
        }
        let content_bytes = ecies::decrypt(&self.owner_key, &entry.content)?;
        let content = String::from_utf8(content_bytes)
            .map_err(|_| loomcommon::crypto::errors::DecryptionError::DeserializationError)?;
        let plain = ChainEntry {
            index: entry.index,
            prev_hash: entry.prev_hash.clone(),
            content,
            nonce: entry.nonce.clone(),
            hash: entry.hash.clone(),
            signature: entry.signature.clone(),
            created_at: entry.created_at,
        };
        chain::verify_personal_entry(&plain, &self.owner_address)?;
        self.apply_verified(inner, &plain).await
    }

    // Replay a fully verified plaintext entry and advance the head.
    async fn apply_verified(
        &self,
        inner: &mut Inner,
        entry: &ChainEntry,
    ) -> Result<BTreeSet<String>, SyncError> {
        let actions = dblog::decode_actions(&entry.content)?;
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
        debug!(db = %self.db_name, index = entry.index, "applied entry");
        Ok(affected)
    }

    fn notify_state(&self, state: SyncState) {
        let mut notifier = StoreNotifier::new(self.notifications.clone());
        notifier.sync_state_changed(state);
        notifier.notify();
    }
}
