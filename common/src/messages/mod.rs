// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire types exchanged with the log server. Field names follow the JSON
//! contract; all hashes and proofs are lowercase hex without prefix,
//! ciphertexts are base64.

pub mod push;

use serde::{Deserialize, Serialize};

use crate::{
    identifiers::{Address, GroupId},
    time::TimeStamp,
};

/// Personal chain entry as the owner sees it, with plaintext content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub index: u64,
    pub prev_hash: String,
    pub content: String,
    pub nonce: String,
    pub hash: String,
    pub signature: String,
    pub created_at: TimeStamp,
}

/// Personal chain entry on the wire: `content` is the ECIES envelope
/// addressed to the owner's own public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedChainEntry {
    pub index: u64,
    pub prev_hash: String,
    pub content: String,
    pub nonce: String,
    pub hash: String,
    pub signature: String,
    pub created_at: TimeStamp,
}

/// Group chain entry as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLogEntry {
    pub index: u64,
    pub prev_hash: String,
    pub ciphertext: String,
    pub nonce: String,
    pub hash: String,
    pub group_signature: String,
    pub access_proof: String,
    pub created_at: TimeStamp,
}

/// Plaintext of a group entry's ciphertext. Only group members ever see
/// this; the sender address and signature stay hidden from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedPayload {
    pub content: String,
    pub sender_address: Address,
    pub sender_signature: String,
    pub epoch: u64,
    pub timestamp: TimeStamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_op: Option<SystemOp>,
}

/// Group-level control operations carried inside entry payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SystemOp {
    EpochTransition {
        new_epoch: u64,
        new_access_key: String,
        transition_proof: String,
    },
    JoinRequest {
        public_key: String,
    },
    JoinAccepted {
        address: Address,
    },
    MemberRemoved {
        address: Address,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendChainLogRequest {
    #[serde(flatten)]
    pub entry: EncryptedChainEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendGroupChainLogRequest {
    #[serde(flatten)]
    pub entry: GroupLogEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub group_id: GroupId,
    pub group_public_key: String,
    pub initial_access_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadResponse<E> {
    pub head: Option<E>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsPage<E> {
    pub logs: Vec<E>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn entry_json_field_names_match_wire_contract() {
        let entry = ChainEntry {
            index: 0,
            prev_hash: "00".repeat(32),
            content: "[]".into(),
            nonce: "11".repeat(32),
            hash: "22".repeat(32),
            signature: "33".repeat(65),
            created_at: TimeStamp::from_millis(1_700_000_000_000),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("prevHash").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("prev_hash").is_none());
    }

    #[test]
    fn system_op_uses_literal_type_discriminator() {
        let op = SystemOp::EpochTransition {
            new_epoch: 3,
            new_access_key: "aa".repeat(32),
            transition_proof: "bb".repeat(32),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "epoch_transition");
        assert!(json.get("newAccessKey").is_some());
    }

    #[test]
    fn payload_canonical_json_sorts_keys_and_omits_missing_system_op() {
        let payload = DecryptedPayload {
            content: "[]".into(),
            sender_address: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap(),
            sender_signature: "00".repeat(65),
            epoch: 0,
            timestamp: TimeStamp::from_millis(1),
            system_op: None,
        };
        let canonical = codec::to_canonical_json(&payload).unwrap();
        assert!(canonical.starts_with(r#"{"content":"#));
        assert!(!canonical.contains("systemOp"));
        let keys: Vec<_> = serde_json::from_str::<serde_json::Value>(&canonical)
            .unwrap()
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
