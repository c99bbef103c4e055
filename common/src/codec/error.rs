// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid hex input")]
    InvalidHex,
    #[error("hex input has odd length {0}")]
    OddHexLength(usize),
    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid base64 input")]
    InvalidBase64,
    #[error("value could not be serialized")]
    Serialization,
}
