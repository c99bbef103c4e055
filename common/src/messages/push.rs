// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed events and control frames of the push channel.

use serde::{Deserialize, Serialize};

use crate::identifiers::{Address, GroupId};

use super::{EncryptedChainEntry, GroupLogEntry};

/// Server-originated events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PushEvent {
    Connected {
        address: Address,
    },
    NewLog {
        entry: EncryptedChainEntry,
    },
    LogStreamEnd {
        last_index: u64,
    },
    NewGroupLog {
        group_id: GroupId,
        entry: GroupLogEntry,
    },
    GroupLogStreamEnd {
        group_id: GroupId,
        last_index: u64,
    },
}

/// Client-originated control frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PushControl {
    StreamLogs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_index: Option<u64>,
    },
    SubscribeGroup {
        group_id: GroupId,
    },
    UnsubscribeGroup {
        group_id: GroupId,
    },
    StreamGroupLogs {
        group_id: GroupId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_index: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_discriminators_match_wire_contract() {
        let json = serde_json::to_value(PushEvent::LogStreamEnd { last_index: 7 }).unwrap();
        assert_eq!(json["type"], "log_stream_end");
        assert_eq!(json["lastIndex"], 7);
    }

    #[test]
    fn control_frames_omit_missing_from_index() {
        let json = serde_json::to_value(PushControl::StreamLogs { from_index: None }).unwrap();
        assert!(json.get("fromIndex").is_none());
        let json =
            serde_json::to_value(PushControl::StreamLogs { from_index: Some(3) }).unwrap();
        assert_eq!(json["fromIndex"], 3);
    }
}
