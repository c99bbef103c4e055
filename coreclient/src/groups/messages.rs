// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Handshake and application messages of the group ratchet. Every message
//! carries a literal `type` discriminator on the wire.

use loomcommon::{crypto::secrets::Secret, identifiers::GroupId};
use serde::{Deserialize, Serialize};

use super::tree::RatchetTree;

/// Path secret pinned to the tree node it belongs to, leaf to root order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSecret {
    pub node_index: u32,
    pub secret: Secret<32>,
}

/// Path secret encrypted to one node of the copath resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPathSecret {
    pub target_node: u32,
    pub ciphertext: String,
}

/// New public key for one node on the sender's direct path, plus the path
/// secret encrypted to everyone who needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub node_index: u32,
    pub public_key: String,
    pub encrypted_secrets: Vec<EncryptedPathSecret>,
}

/// The common part of add/remove/update messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePath {
    pub group_id: GroupId,
    /// Epoch after applying this message.
    pub epoch: u64,
    pub sender_leaf: u32,
    pub leaf_public_key: String,
    pub nodes: Vec<NodeUpdate>,
}

/// Plaintext body of a welcome, ECIES-encrypted to the new member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeBody {
    pub group_id: GroupId,
    pub epoch: u64,
    pub tree: RatchetTree,
    pub leaf_index: u32,
    pub path_secrets: Vec<PathSecret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GroupMessage {
    Welcome {
        group_id: GroupId,
        /// ECIES envelope of a [`WelcomeBody`], keyed with the welcome
        /// context label.
        ciphertext: String,
        recipient_public_key: String,
    },
    Add {
        new_leaf_index: u32,
        new_leaf_public_key: String,
        #[serde(flatten)]
        update: UpdatePath,
    },
    Remove {
        removed_leaf_index: u32,
        #[serde(flatten)]
        update: UpdatePath,
    },
    Update {
        #[serde(flatten)]
        update: UpdatePath,
    },
    Application {
        group_id: GroupId,
        epoch: u64,
        /// `IV12 ‖ TAG16 ‖ CT` under the group key, base64.
        ciphertext: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_literal_type_discriminators() {
        let message = GroupMessage::Application {
            group_id: GroupId::from_bytes([0u8; 16]),
            epoch: 4,
            ciphertext: "AAAA".into(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "application");
        assert_eq!(json["groupId"], "00".repeat(16));

        let update = GroupMessage::Update {
            update: UpdatePath {
                group_id: GroupId::from_bytes([1u8; 16]),
                epoch: 1,
                sender_leaf: 0,
                leaf_public_key: "04".into(),
                nodes: vec![],
            },
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "update");
        // The update path is flattened into the message object.
        assert_eq!(json["senderLeaf"], 0);
    }
}
