// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cryptographic primitives used by the log client: AEAD sealing, labeled
//! KDFs, secp256k1 identity keys with the Ethereum signing conventions,
//! BLS12-381 arithmetic, the BBS+ anonymous membership scheme and the
//! per-epoch access proofs presented to the server.

pub mod bbs;
pub mod bls;
pub mod ear;
pub mod epoch;
pub mod errors;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod secrets;

pub use errors::{DecryptionError, EncryptionError, RandomnessError};
pub use secrets::Secret;
