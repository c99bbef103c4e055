// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Labeled key derivation. All derivations in this workspace are
//! HKDF-SHA256 with an empty salt and a context-specific info string.

use hkdf::Hkdf;
use sha2::Sha256;

/// This type determines the KDF used by the workspace.
pub type Kdf = Hkdf<Sha256>;
pub const KDF_KEY_SIZE: usize = 32;

/// Context labels for the ratchet-tree derivations.
pub const NODE_KEY_LABEL: &str = "mls-node-key";
pub const NODE_PRIVATE_KEY_LABEL: &str = "mls-node-private-key";
pub const GROUP_KEY_LABEL: &str = "mls-group-key";
pub const PATH_SECRET_LABEL: &str = "mls-path-secret";
pub const WELCOME_KEY_LABEL: &str = "mls-welcome-key";

/// HKDF-SHA256 with empty salt, expanding to [`KDF_KEY_SIZE`] bytes.
pub fn derive(ikm: &[u8], info: &[u8]) -> [u8; KDF_KEY_SIZE] {
    let mut okm = [0u8; KDF_KEY_SIZE];
    let result = Kdf::new(None, ikm).expand(info, &mut okm);
    debug_assert!(result.is_ok(), "HKDF output length is static");
    okm
}

pub fn derive_labeled(ikm: &[u8], label: &str) -> [u8; KDF_KEY_SIZE] {
    derive(ikm, label.as_bytes())
}

/// Info string for the blank-sibling path advance: label plus the node
/// index in little-endian.
pub fn path_secret_info(node_index: u32) -> Vec<u8> {
    let mut info = PATH_SECRET_LABEL.as_bytes().to_vec();
    info.extend_from_slice(&node_index.to_le_bytes());
    info
}

/// Info string binding a welcome encryption to the new member's public key.
pub fn welcome_key_info(new_member_public_key: &[u8]) -> Vec<u8> {
    let mut info = WELCOME_KEY_LABEL.as_bytes().to_vec();
    info.extend_from_slice(new_member_public_key);
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_label_separated() {
        let ikm = [7u8; 32];
        let a = derive_labeled(&ikm, NODE_KEY_LABEL);
        let b = derive_labeled(&ikm, NODE_KEY_LABEL);
        let c = derive_labeled(&ikm, GROUP_KEY_LABEL);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn path_secret_info_encodes_index_little_endian() {
        let info = path_secret_info(0x0102_0304);
        assert!(info.starts_with(PATH_SECRET_LABEL.as_bytes()));
        assert_eq!(&info[PATH_SECRET_LABEL.len()..], &[0x04, 0x03, 0x02, 0x01]);
    }
}
