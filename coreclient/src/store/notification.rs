// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream, wrappers::errors::BroadcastStreamRecvError};
use tracing::error;

use crate::sync::SyncState;

const NOTIFICATION_CHANNEL_SIZE: usize = 1024;

/// Broadcast side of the store notification channel.
#[derive(Debug, Clone)]
pub struct StoreNotificationsSender {
    tx: broadcast::Sender<Arc<StoreNotification>>,
}

impl StoreNotificationsSender {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        Self { tx }
    }

    pub fn notify(&self, notification: impl Into<Arc<StoreNotification>>) {
        let _no_receivers = self.tx.send(notification.into());
    }

    pub fn subscribe(&self) -> impl tokio_stream::Stream<Item = Arc<StoreNotification>> {
        BroadcastStream::new(self.tx.subscribe()).map(|res| match res {
            Ok(notification) => notification,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                error!("store notifications lagged by {} messages", n);
                Arc::new(StoreNotification::default())
            }
        })
    }
}

impl Default for StoreNotificationsSender {
    fn default() -> Self {
        Self::new()
    }
}

/// What changed in one pipeline step: applied entries, touched tables and
/// sync state transitions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreNotification {
    pub entries_applied: Vec<u64>,
    pub tables_affected: Vec<String>,
    pub sync_state: Option<SyncState>,
}

impl StoreNotification {
    pub fn is_empty(&self) -> bool {
        self.entries_applied.is_empty()
            && self.tables_affected.is_empty()
            && self.sync_state.is_none()
    }
}

/// Accumulates changes during one pipeline step and dispatches them as a
/// single notification.
#[derive(Debug)]
pub struct StoreNotifier {
    tx: StoreNotificationsSender,
    pending: StoreNotification,
}

impl StoreNotifier {
    pub fn new(tx: StoreNotificationsSender) -> Self {
        Self {
            tx,
            pending: StoreNotification::default(),
        }
    }

    pub fn entry_applied(&mut self, index: u64) -> &mut Self {
        self.pending.entries_applied.push(index);
        self
    }

    pub fn tables_affected(&mut self, tables: impl IntoIterator<Item = String>) -> &mut Self {
        self.pending.tables_affected.extend(tables);
        self
    }

    pub fn sync_state_changed(&mut self, state: SyncState) -> &mut Self {
        self.pending.sync_state = Some(state);
        self
    }

    /// Sends the accumulated notification, if any.
    pub fn notify(mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.pending.tables_affected.sort_unstable();
        self.pending.tables_affected.dedup();
        self.tx.notify(self.pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifications_are_batched_and_deduplicated() {
        let sender = StoreNotificationsSender::new();
        let mut stream = std::pin::pin!(sender.subscribe());

        let mut notifier = StoreNotifier::new(sender.clone());
        notifier
            .entry_applied(3)
            .tables_affected(["b".to_string(), "a".to_string(), "b".to_string()]);
        notifier.notify();

        let notification = stream.next().await.unwrap();
        assert_eq!(notification.entries_applied, vec![3]);
        assert_eq!(notification.tables_affected, vec!["a", "b"]);
        assert_eq!(notification.sync_state, None);
    }

    #[tokio::test]
    async fn empty_notifications_are_swallowed() {
        let sender = StoreNotificationsSender::new();
        let notifier = StoreNotifier::new(sender.clone());
        notifier.notify();
        // Nothing was sent: a fresh subscriber sees only what comes after.
        let mut stream = std::pin::pin!(sender.subscribe());
        let mut notifier = StoreNotifier::new(sender.clone());
        notifier.entry_applied(1);
        notifier.notify();
        assert_eq!(stream.next().await.unwrap().entries_applied, vec![1]);
    }
}
