// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Implements the client core of the verifiable log protocol: ratchet-tree
//! group state, chain validation, the DBLog replay engine over SQLite and
//! the sync controllers tying them to the transport.

pub mod chain;
pub mod dblog;
pub mod groups;
pub mod store;
pub mod sync;

pub use chain::{ChainError, ChainHead};
pub use dblog::{Action, DBLogError, ReplayEngine, Value};
pub use groups::{GroupError, GroupState};
pub use store::{StorageBackend, StorageError, StoreNotification, StoreNotifier};
pub use sync::{GroupLogController, PersonalLogController, SyncError, SyncState};
