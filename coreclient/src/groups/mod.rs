// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Continuous group key agreement over a left-balanced ratchet tree.
//!
//! Node keys are secp256k1 pairs on the identity curve. A path update
//! samples a fresh leaf secret and mixes it upward: at each step the next
//! path secret is derived from an ECDH with the copath sibling when that
//! sibling has a key, and from a labeled KDF advance otherwise. The group
//! key falls out of the root secret.
//!
//! Receivers never sample randomness: they decrypt the path secret
//! addressed to a node they own and re-derive the chain deterministically
//! from the applied tree, so all members converge on the same group key.

pub mod entry;
pub mod error;
pub mod messages;
pub mod tree;
pub mod tree_math;

pub use error::GroupError;

use loomcommon::{
    codec,
    crypto::{
        ear,
        identity::{self, IdentityPrivateKey, IdentityPublicKey, ecies},
        kdf,
        secrets::Secret,
    },
    identifiers::GroupId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use self::{
    messages::{EncryptedPathSecret, GroupMessage, NodeUpdate, PathSecret, UpdatePath, WelcomeBody},
    tree::RatchetTree,
};

const SECRET_SIZE: usize = 32;

/// Full local state of one group membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupState {
    group_id: GroupId,
    epoch: u64,
    tree: RatchetTree,
    my_leaf_index: u32,
    my_private_key: IdentityPrivateKey,
    path_secrets: Vec<PathSecret>,
    group_key: Secret<SECRET_SIZE>,
}

impl GroupState {
    /// Creates a group with the caller at leaf 0 and one leaf per initial
    /// member. Stays at epoch 0; the returned welcomes carry everything
    /// the members need to derive the same group key.
    pub fn create(
        group_id: GroupId,
        initial_members: &[IdentityPublicKey],
    ) -> Result<(Self, Vec<GroupMessage>), GroupError> {
        let n_leaves = initial_members.len() + 1;
        let mut tree = RatchetTree::new(n_leaves);
        let placeholder = IdentityPrivateKey::generate();
        tree.set_leaf(0, &placeholder.public_key());
        for (i, member) in initial_members.iter().enumerate() {
            tree.set_leaf(i + 1, member);
        }
        let mut state = Self {
            group_id,
            epoch: 0,
            tree,
            my_leaf_index: 0,
            my_private_key: placeholder,
            path_secrets: Vec::new(),
            group_key: Secret::from([0u8; SECRET_SIZE]),
        };
        state.update_path()?;
        let welcomes = initial_members
            .iter()
            .enumerate()
            .map(|(i, member)| state.welcome_for(i + 1, member))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(group_id = %state.group_id, members = n_leaves, "created group");
        Ok((state, welcomes))
    }

    /// Joins a group from a welcome. `my_private_key` must be the keypair
    /// whose public half the inviter installed at our leaf.
    pub fn process_welcome(
        message: &GroupMessage,
        my_private_key: IdentityPrivateKey,
    ) -> Result<Self, GroupError> {
        let GroupMessage::Welcome { ciphertext, .. } = message else {
            return Err(GroupError::MalformedMessage);
        };
        let my_public = my_private_key.public_key();
        let info = kdf::welcome_key_info(&my_public.to_bytes());
        let plaintext = ecies::decrypt_with_info(&my_private_key, ciphertext, &info)?;
        let body: WelcomeBody =
            serde_json::from_slice(&plaintext).map_err(|_| GroupError::MalformedMessage)?;

        let own_leaf = body
            .tree
            .leaf(body.leaf_index as usize)
            .ok_or(GroupError::UnknownLeaf(body.leaf_index))?;
        if own_leaf.public_key != my_public.to_hex() {
            return Err(GroupError::WelcomeKeyMismatch);
        }
        let root_secret = body
            .path_secrets
            .last()
            .ok_or(GroupError::MalformedMessage)?;
        let group_key =
            Secret::from(kdf::derive_labeled(root_secret.secret.secret(), kdf::GROUP_KEY_LABEL));
        Ok(Self {
            group_id: body.group_id,
            epoch: body.epoch,
            tree: body.tree,
            my_leaf_index: body.leaf_index,
            my_private_key,
            path_secrets: body.path_secrets,
            group_key,
        })
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn group_key(&self) -> &[u8; SECRET_SIZE] {
        self.group_key.secret()
    }

    pub fn my_leaf_index(&self) -> u32 {
        self.my_leaf_index
    }

    pub fn tree(&self) -> &RatchetTree {
        &self.tree
    }

    /// Member count (occupied leaves).
    pub fn member_count(&self) -> usize {
        self.tree.occupied_leaves().len()
    }

    /// Adds a member at the first blank leaf, extending the tree to the
    /// next size class when full. Advances the epoch by one.
    pub fn add_member(
        &mut self,
        new_member: &IdentityPublicKey,
    ) -> Result<(GroupMessage, GroupMessage), GroupError> {
        let position = match self.tree.first_blank_leaf() {
            Some(position) => position,
            None => {
                self.tree.extend();
                self.tree
                    .first_blank_leaf()
                    .ok_or(GroupError::MalformedMessage)?
            }
        };
        self.graft_leaf(position, new_member);
        let (leaf_public_key, nodes) = self.update_path()?;
        self.epoch += 1;
        let update = UpdatePath {
            group_id: self.group_id,
            epoch: self.epoch,
            sender_leaf: self.my_leaf_index,
            leaf_public_key,
            nodes,
        };
        let welcome = self.welcome_for(position, new_member)?;
        debug!(group_id = %self.group_id, leaf = position, epoch = self.epoch, "added member");
        Ok((
            GroupMessage::Add {
                new_leaf_index: position as u32,
                new_leaf_public_key: new_member.to_hex(),
                update,
            },
            welcome,
        ))
    }

    /// Removes the member at `leaf_index`, pruning parents whose subtrees
    /// became empty. Advances the epoch by one. Fails for the own leaf.
    pub fn remove_member(&mut self, leaf_index: u32) -> Result<GroupMessage, GroupError> {
        if leaf_index == self.my_leaf_index {
            return Err(GroupError::RemoveSelf);
        }
        if self.tree.leaf(leaf_index as usize).is_none() {
            return Err(GroupError::UnknownLeaf(leaf_index));
        }
        self.evict_leaf(leaf_index);
        let (leaf_public_key, nodes) = self.update_path()?;
        self.epoch += 1;
        debug!(group_id = %self.group_id, leaf = leaf_index, epoch = self.epoch, "removed member");
        Ok(GroupMessage::Remove {
            removed_leaf_index: leaf_index,
            update: UpdatePath {
                group_id: self.group_id,
                epoch: self.epoch,
                sender_leaf: self.my_leaf_index,
                leaf_public_key,
                nodes,
            },
        })
    }

    /// Rotates the own leaf key. Advances the epoch by one.
    pub fn update_own_key(&mut self) -> Result<GroupMessage, GroupError> {
        let (leaf_public_key, nodes) = self.update_path()?;
        self.epoch += 1;
        debug!(group_id = %self.group_id, epoch = self.epoch, "rotated own key");
        Ok(GroupMessage::Update {
            update: UpdatePath {
                group_id: self.group_id,
                epoch: self.epoch,
                sender_leaf: self.my_leaf_index,
                leaf_public_key,
                nodes,
            },
        })
    }

    /// Applies a received add/remove/update. The message epoch must be
    /// exactly one ahead of the local epoch.
    pub fn process_message(&mut self, message: &GroupMessage) -> Result<(), GroupError> {
        match message {
            GroupMessage::Add {
                new_leaf_index,
                new_leaf_public_key,
                update,
            } => {
                self.check_update_header(update)?;
                while self.tree.n_leaves() <= *new_leaf_index as usize {
                    self.tree.extend();
                }
                let new_member = IdentityPublicKey::from_hex(new_leaf_public_key)?;
                self.graft_leaf(*new_leaf_index as usize, &new_member);
                self.apply_update_path(update)
            }
            GroupMessage::Remove {
                removed_leaf_index,
                update,
            } => {
                self.check_update_header(update)?;
                if self.tree.leaf(*removed_leaf_index as usize).is_none() {
                    return Err(GroupError::UnknownLeaf(*removed_leaf_index));
                }
                self.evict_leaf(*removed_leaf_index);
                self.apply_update_path(update)
            }
            GroupMessage::Update { update } => {
                self.check_update_header(update)?;
                self.apply_update_path(update)
            }
            GroupMessage::Welcome { .. } | GroupMessage::Application { .. } => {
                Err(GroupError::MalformedMessage)
            }
        }
    }

    /// Seals an application payload under the current group key.
    pub fn seal_application(&self, plaintext: &[u8]) -> Result<GroupMessage, GroupError> {
        let sealed = ear::seal(self.group_key.secret(), plaintext)?;
        Ok(GroupMessage::Application {
            group_id: self.group_id,
            epoch: self.epoch,
            ciphertext: codec::to_base64(sealed),
        })
    }

    /// Opens an application message. Its epoch must match the local one.
    pub fn open_application(&self, message: &GroupMessage) -> Result<Vec<u8>, GroupError> {
        let GroupMessage::Application {
            group_id,
            epoch,
            ciphertext,
        } = message
        else {
            return Err(GroupError::MalformedMessage);
        };
        if *group_id != self.group_id {
            return Err(GroupError::WrongGroup);
        }
        if *epoch != self.epoch {
            return Err(GroupError::InvalidEpoch {
                expected: self.epoch,
                got: *epoch,
            });
        }
        let sealed =
            codec::from_base64(ciphertext).map_err(|_| GroupError::MalformedMessage)?;
        Ok(ear::open(self.group_key.secret(), &sealed)?)
    }

    fn check_update_header(&self, update: &UpdatePath) -> Result<(), GroupError> {
        if update.group_id != self.group_id {
            return Err(GroupError::WrongGroup);
        }
        if update.epoch != self.epoch + 1 {
            return Err(GroupError::InvalidEpoch {
                expected: self.epoch + 1,
                got: update.epoch,
            });
        }
        Ok(())
    }

    // Install a new leaf and mark it unmerged on keyed ancestors, so their
    // resolutions keep covering it until the next key refresh.
    fn graft_leaf(&mut self, position: usize, public_key: &IdentityPublicKey) {
        self.tree.set_leaf(position, public_key);
        let node = tree_math::leaf_index(position);
        for ancestor in tree_math::direct_path(node, self.tree.n_leaves()) {
            self.tree.add_unmerged_leaf(ancestor, position as u32);
        }
    }

    // Blank the leaf and every parent on its path whose children are both
    // blank.
    fn evict_leaf(&mut self, leaf_index: u32) {
        let n = self.tree.n_leaves();
        let node = tree_math::leaf_index(leaf_index as usize);
        self.tree.blank_leaf(leaf_index as usize);
        self.tree.remove_unmerged_leaf(leaf_index);
        for parent in tree_math::direct_path(node, n) {
            let left_blank = self.tree.is_blank(tree_math::left(parent));
            let right_blank = self.tree.is_blank(tree_math::right(parent, n));
            if left_blank && right_blank {
                self.tree.blank_node(parent);
            }
        }
    }

    // Fresh leaf secret, new keys along the own direct path, encrypted
    // path secrets for the copath resolutions. Returns the new leaf public
    // key and the per-node updates for distribution.
    fn update_path(&mut self) -> Result<(String, Vec<NodeUpdate>), GroupError> {
        let n = self.tree.n_leaves();
        let my_node = tree_math::leaf_index(self.my_leaf_index as usize);

        let leaf_secret = Secret::<SECRET_SIZE>::random()?;
        let leaf_private = derive_node_private(leaf_secret.secret())?;
        let leaf_public = leaf_private.public_key();
        self.tree.set_leaf(self.my_leaf_index as usize, &leaf_public);

        let mut path_secrets = vec![PathSecret {
            node_index: my_node as u32,
            secret: leaf_secret.clone(),
        }];
        let mut updates = Vec::new();
        let mut current_secret = leaf_secret.into_secret();
        let mut current_private = leaf_private.clone();
        let mut child = my_node;

        for ancestor in tree_math::direct_path(my_node, n) {
            let sibling = tree_math::sibling(child, n);
            let sibling_key = sibling.and_then(|s| {
                self.tree
                    .public_key(s)
                    .map(|key| (s, key.to_string()))
            });
            let secret = match &sibling_key {
                Some((_, key_hex)) => {
                    let sibling_public = IdentityPublicKey::from_hex(key_hex)?;
                    let point = identity::ecdh_point(&current_private, &sibling_public)?;
                    kdf::derive_labeled(&point, kdf::NODE_KEY_LABEL)
                }
                None => kdf::derive(&current_secret, &kdf::path_secret_info(ancestor as u32)),
            };
            let node_private = derive_node_private(&secret)?;
            let node_public = node_private.public_key();
            self.tree.set_parent_key(ancestor, node_public.to_hex());

            let mut encrypted_secrets = Vec::new();
            if let Some(sibling) = sibling {
                for target in self.tree.resolution(sibling) {
                    let Some(target_key) = self.tree.public_key(target) else {
                        continue;
                    };
                    let target_public = IdentityPublicKey::from_hex(target_key)?;
                    let ciphertext = ecies::encrypt(&target_public, &secret)?;
                    encrypted_secrets.push(EncryptedPathSecret {
                        target_node: target as u32,
                        ciphertext,
                    });
                }
            }
            updates.push(NodeUpdate {
                node_index: ancestor as u32,
                public_key: node_public.to_hex(),
                encrypted_secrets,
            });
            path_secrets.push(PathSecret {
                node_index: ancestor as u32,
                secret: Secret::from(secret),
            });
            current_secret = secret;
            current_private = node_private;
            child = ancestor;
        }

        self.my_private_key = leaf_private;
        self.path_secrets = path_secrets;
        self.group_key =
            Secret::from(kdf::derive_labeled(&current_secret, kdf::GROUP_KEY_LABEL));
        Ok((leaf_public.to_hex(), updates))
    }

    // Install the announced keys, decrypt the path secret addressed to a
    // node we own, and deterministically re-derive up to the root.
    fn apply_update_path(&mut self, update: &UpdatePath) -> Result<(), GroupError> {
        let n = self.tree.n_leaves();
        let sender_public = IdentityPublicKey::from_hex(&update.leaf_public_key)?;
        self.tree
            .set_leaf(update.sender_leaf as usize, &sender_public);
        for node in &update.nodes {
            self.tree
                .set_parent_key(node.node_index as usize, node.public_key.clone());
        }

        let my_node = tree_math::leaf_index(self.my_leaf_index as usize) as u32;
        let mut holders: Vec<(u32, IdentityPrivateKey)> =
            vec![(my_node, self.my_private_key.clone())];
        for path_secret in &self.path_secrets {
            if path_secret.node_index != my_node {
                holders.push((
                    path_secret.node_index,
                    derive_node_private(path_secret.secret.secret())?,
                ));
            }
        }

        let mut entry_point = None;
        'search: for (step, node) in update.nodes.iter().enumerate() {
            for encrypted in &node.encrypted_secrets {
                if let Some((_, private)) = holders
                    .iter()
                    .find(|(index, _)| *index == encrypted.target_node)
                {
                    let plaintext = ecies::decrypt(private, &encrypted.ciphertext)?;
                    let secret: [u8; SECRET_SIZE] = plaintext
                        .as_slice()
                        .try_into()
                        .map_err(|_| GroupError::MalformedMessage)?;
                    entry_point = Some((step, secret));
                    break 'search;
                }
            }
        }
        let (start, mut current_secret) = entry_point.ok_or(GroupError::NoDecryptableSecret)?;

        let mut current_private = derive_node_private(&current_secret)?;
        if current_private.public_key().to_hex() != update.nodes[start].public_key {
            return Err(GroupError::PathMismatch);
        }
        let mut new_secrets = vec![PathSecret {
            node_index: update.nodes[start].node_index,
            secret: Secret::from(current_secret),
        }];

        let mut child = update.nodes[start].node_index as usize;
        for node in &update.nodes[start + 1..] {
            let sibling = tree_math::sibling(child, n);
            let sibling_key =
                sibling.and_then(|s| self.tree.public_key(s).map(|key| key.to_string()));
            let secret = match &sibling_key {
                Some(key_hex) => {
                    let sibling_public = IdentityPublicKey::from_hex(key_hex)?;
                    let point = identity::ecdh_point(&current_private, &sibling_public)?;
                    kdf::derive_labeled(&point, kdf::NODE_KEY_LABEL)
                }
                None => kdf::derive(
                    &current_secret,
                    &kdf::path_secret_info(node.node_index),
                ),
            };
            current_private = derive_node_private(&secret)?;
            if current_private.public_key().to_hex() != node.public_key {
                return Err(GroupError::PathMismatch);
            }
            new_secrets.push(PathSecret {
                node_index: node.node_index,
                secret: Secret::from(secret),
            });
            current_secret = secret;
            child = node.node_index as usize;
        }

        // Keep own secrets below the junction, adopt the new ones from the
        // junction upward. The junction is the common ancestor with the
        // sender, so it lies on our own direct path.
        let junction = update.nodes[start].node_index;
        let mut path_nodes = vec![my_node];
        path_nodes.extend(
            tree_math::direct_path(my_node as usize, n)
                .into_iter()
                .map(|index| index as u32),
        );
        let junction_position = path_nodes
            .iter()
            .position(|index| *index == junction)
            .unwrap_or(0);
        let mut merged: Vec<PathSecret> = path_nodes[..junction_position]
            .iter()
            .filter_map(|node| {
                self.path_secrets
                    .iter()
                    .find(|path_secret| path_secret.node_index == *node)
                    .cloned()
            })
            .collect();
        merged.extend(new_secrets);
        self.path_secrets = merged;
        self.group_key =
            Secret::from(kdf::derive_labeled(&current_secret, kdf::GROUP_KEY_LABEL));
        self.epoch = update.epoch;
        Ok(())
    }

    fn welcome_for(
        &self,
        leaf_position: usize,
        recipient: &IdentityPublicKey,
    ) -> Result<GroupMessage, GroupError> {
        let n = self.tree.n_leaves();
        let my_node = tree_math::leaf_index(self.my_leaf_index as usize);
        let their_node = tree_math::leaf_index(leaf_position);
        let ancestor = tree_math::common_ancestor(my_node, their_node, n) as u32;
        let shared: Vec<PathSecret> = self
            .path_secrets
            .iter()
            .skip_while(|path_secret| path_secret.node_index != ancestor)
            .cloned()
            .collect();
        if shared.is_empty() {
            return Err(GroupError::MalformedMessage);
        }
        let body = WelcomeBody {
            group_id: self.group_id,
            epoch: self.epoch,
            tree: self.tree.clone(),
            leaf_index: leaf_position as u32,
            path_secrets: shared,
        };
        let plaintext =
            serde_json::to_vec(&body).map_err(|_| GroupError::MalformedMessage)?;
        let info = kdf::welcome_key_info(&recipient.to_bytes());
        let ciphertext = ecies::encrypt_with_info(recipient, &plaintext, &info)?;
        Ok(GroupMessage::Welcome {
            group_id: self.group_id,
            ciphertext,
            recipient_public_key: recipient.to_hex(),
        })
    }
}

fn derive_node_private(secret: &[u8]) -> Result<IdentityPrivateKey, GroupError> {
    let bytes = kdf::derive(secret, kdf::NODE_PRIVATE_KEY_LABEL.as_bytes());
    Ok(IdentityPrivateKey::from_bytes_reduced(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Member {
        key: IdentityPrivateKey,
        state: Option<GroupState>,
    }

    impl Member {
        fn new() -> Self {
            Self {
                key: IdentityPrivateKey::generate(),
                state: None,
            }
        }

        fn state(&self) -> &GroupState {
            self.state.as_ref().unwrap()
        }

        fn state_mut(&mut self) -> &mut GroupState {
            self.state.as_mut().unwrap()
        }
    }

    fn three_party_group() -> (Member, Member, Member) {
        let mut p0 = Member::new();
        let mut p1 = Member::new();
        let mut p2 = Member::new();
        let (state, welcomes) = GroupState::create(
            GroupId::random(),
            &[p1.key.public_key(), p2.key.public_key()],
        )
        .unwrap();
        p0.state = Some(state);
        p1.state = Some(GroupState::process_welcome(&welcomes[0], p1.key.clone()).unwrap());
        p2.state = Some(GroupState::process_welcome(&welcomes[1], p2.key.clone()).unwrap());
        (p0, p1, p2)
    }

    #[test]
    fn three_party_agreement_at_epoch_zero() {
        let (p0, p1, p2) = three_party_group();
        assert_eq!(p0.state().epoch(), 0);
        assert_eq!(p1.state().epoch(), 0);
        assert_eq!(p2.state().epoch(), 0);
        assert_eq!(p0.state().group_key(), p1.state().group_key());
        assert_eq!(p0.state().group_key(), p2.state().group_key());
    }

    #[test]
    fn update_own_key_reaches_all_members() {
        let (mut p0, mut p1, mut p2) = three_party_group();
        let update = p1.state_mut().update_own_key().unwrap();
        p0.state_mut().process_message(&update).unwrap();
        p2.state_mut().process_message(&update).unwrap();

        assert_eq!(p0.state().epoch(), 1);
        assert_eq!(p1.state().epoch(), 1);
        assert_eq!(p2.state().epoch(), 1);
        assert_eq!(p0.state().group_key(), p1.state().group_key());
        assert_eq!(p0.state().group_key(), p2.state().group_key());
    }

    #[test]
    fn stale_epoch_is_rejected() {
        let (mut p0, mut p1, mut p2) = three_party_group();
        let update = p1.state_mut().update_own_key().unwrap();
        p0.state_mut().process_message(&update).unwrap();
        // Applying the same message twice trips the epoch gate.
        assert!(matches!(
            p0.state_mut().process_message(&update),
            Err(GroupError::InvalidEpoch { expected: 2, got: 1 })
        ));
        p2.state_mut().process_message(&update).unwrap();
    }

    #[test]
    fn add_member_and_welcome() {
        let (mut p0, mut p1, mut p2) = three_party_group();
        let mut p3 = Member::new();
        let (add, welcome) = p0.state_mut().add_member(&p3.key.public_key()).unwrap();
        p1.state_mut().process_message(&add).unwrap();
        p2.state_mut().process_message(&add).unwrap();
        p3.state = Some(GroupState::process_welcome(&welcome, p3.key.clone()).unwrap());

        for member in [&p1, &p2, &p3] {
            assert_eq!(member.state().epoch(), 1);
            assert_eq!(member.state().group_key(), p0.state().group_key());
        }
        assert_eq!(p0.state().member_count(), 4);
    }

    #[test]
    fn remove_member_rotates_key_away_from_removed() {
        let (mut p0, mut p1, mut p2) = three_party_group();
        let old_key = *p2.state().group_key();
        let remove = p0.state_mut().remove_member(2).unwrap();
        p1.state_mut().process_message(&remove).unwrap();

        assert_eq!(p0.state().group_key(), p1.state().group_key());
        assert_ne!(p0.state().group_key(), &old_key);
        assert_eq!(p0.state().member_count(), 2);
        // The removed member no longer holds a decryptable secret.
        assert!(matches!(
            p2.state_mut().process_message(&remove),
            Err(GroupError::NoDecryptableSecret)
        ));
    }

    #[test]
    fn remove_self_is_rejected() {
        let (mut p0, _, _) = three_party_group();
        assert_eq!(
            p0.state_mut().remove_member(0),
            Err(GroupError::RemoveSelf)
        );
    }

    #[test]
    fn application_messages_roundtrip_within_epoch() {
        let (p0, p1, _) = three_party_group();
        let message = p0.state().seal_application(b"hi there").unwrap();
        assert_eq!(p1.state().open_application(&message).unwrap(), b"hi there");
    }

    #[test]
    fn application_message_from_other_epoch_is_rejected() {
        let (mut p0, p1, _) = three_party_group();
        let _ = p0.state_mut().update_own_key().unwrap();
        let message = p0.state().seal_application(b"hi there").unwrap();
        assert!(matches!(
            p1.state().open_application(&message),
            Err(GroupError::InvalidEpoch { .. })
        ));
    }

    #[test]
    fn member_added_under_keyed_parent_converges() {
        // Four leaves so that leaf 3 sits under a parent off the creator's
        // direct path.
        let mut p0 = Member::new();
        let mut p1 = Member::new();
        let mut p2 = Member::new();
        let mut p3 = Member::new();
        let (state, welcomes) = GroupState::create(
            GroupId::random(),
            &[
                p1.key.public_key(),
                p2.key.public_key(),
                p3.key.public_key(),
            ],
        )
        .unwrap();
        p0.state = Some(state);
        p1.state = Some(GroupState::process_welcome(&welcomes[0], p1.key.clone()).unwrap());
        p2.state = Some(GroupState::process_welcome(&welcomes[1], p2.key.clone()).unwrap());
        p3.state = Some(GroupState::process_welcome(&welcomes[2], p3.key.clone()).unwrap());

        // P2's update keys the parent shared with leaf 3.
        let update = p2.state_mut().update_own_key().unwrap();
        for member in [&mut p0, &mut p1, &mut p3] {
            member.state_mut().process_message(&update).unwrap();
        }

        // Remove P3 and re-fill its leaf with a new member: the leaf lands
        // under the still-keyed parent and must be tracked as unmerged.
        let remove = p0.state_mut().remove_member(3).unwrap();
        p1.state_mut().process_message(&remove).unwrap();
        p2.state_mut().process_message(&remove).unwrap();

        let mut p4 = Member::new();
        let (add, welcome) = p0.state_mut().add_member(&p4.key.public_key()).unwrap();
        p1.state_mut().process_message(&add).unwrap();
        p2.state_mut().process_message(&add).unwrap();
        p4.state = Some(GroupState::process_welcome(&welcome, p4.key.clone()).unwrap());

        // An update from a member whose copath crosses that parent must
        // still reach the new member.
        let update = p1.state_mut().update_own_key().unwrap();
        for member in [&mut p0, &mut p2, &mut p4] {
            member.state_mut().process_message(&update).unwrap();
        }
        for member in [&p1, &p2, &p4] {
            assert_eq!(member.state().group_key(), p0.state().group_key());
            assert_eq!(member.state().epoch(), p0.state().epoch());
        }
    }

    #[test]
    fn group_state_serde_roundtrip() {
        let (p0, _, _) = three_party_group();
        let json = serde_json::to_string(p0.state()).unwrap();
        let back: GroupState = serde_json::from_str(&json).unwrap();
        assert_eq!(p0.state(), &back);
    }

    #[test]
    fn growth_past_size_class() {
        let (mut p0, mut p1, mut p2) = three_party_group();
        // Tree starts with 3 leaves; two adds force an extension.
        let mut new_members = Vec::new();
        for _ in 0..2 {
            let member = Member::new();
            let (add, welcome) = p0.state_mut().add_member(&member.key.public_key()).unwrap();
            p1.state_mut().process_message(&add).unwrap();
            p2.state_mut().process_message(&add).unwrap();
            for existing in &mut new_members {
                let existing: &mut Member = existing;
                existing.state_mut().process_message(&add).unwrap();
            }
            let mut member = member;
            member.state =
                Some(GroupState::process_welcome(&welcome, member.key.clone()).unwrap());
            new_members.push(member);
        }
        assert_eq!(p0.state().member_count(), 5);
        for member in new_members.iter().chain([&p1, &p2]) {
            assert_eq!(member.state().group_key(), p0.state().group_key());
            assert_eq!(member.state().epoch(), p0.state().epoch());
        }
    }
}
