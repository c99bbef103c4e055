// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Byte-level codecs used throughout the workspace: fixed-width hex with an
//! optional `0x` prefix, base64 envelopes, SQL identifier handling and the
//! canonical JSON form used for hash inputs.

mod error;

pub use error::CodecError;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;

/// Decodes a hex string. A leading `0x`/`0X` prefix is accepted, the
/// remainder must have even length.
pub fn from_hex(input: &str) -> Result<Vec<u8>, CodecError> {
    let stripped = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if stripped.len() % 2 != 0 {
        return Err(CodecError::OddHexLength(stripped.len()));
    }
    hex::decode(stripped).map_err(|_| CodecError::InvalidHex)
}

/// Decodes a hex string into a fixed-width array.
pub fn from_hex_fixed<const N: usize>(input: &str) -> Result<[u8; N], CodecError> {
    let bytes = from_hex(input)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CodecError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        })
}

/// Encodes bytes as lowercase hex without prefix.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(bytes)
}

/// Encodes bytes as lowercase hex with a `0x` prefix.
pub fn to_hex_prefixed(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn to_base64(bytes: impl AsRef<[u8]>) -> String {
    BASE64.encode(bytes)
}

pub fn from_base64(input: &str) -> Result<Vec<u8>, CodecError> {
    BASE64.decode(input).map_err(|_| CodecError::InvalidBase64)
}

/// Wraps an identifier in double quotes, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Checks an identifier against `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn is_valid_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Serializes a value into the canonical JSON form used for hash inputs:
/// alphabetically ordered keys and no extraneous whitespace.
///
/// Routing the value through [`serde_json::Value`] sorts object keys, since
/// its map representation is ordered by key.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let value = serde_json::to_value(value).map_err(|_| CodecError::Serialization)?;
    serde_json::to_string(&value).map_err(|_| CodecError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip_with_and_without_prefix() {
        let bytes = vec![0x00, 0xab, 0xff];
        assert_eq!(to_hex(&bytes), "00abff");
        assert_eq!(to_hex_prefixed(&bytes), "0x00abff");
        assert_eq!(from_hex("00abff").unwrap(), bytes);
        assert_eq!(from_hex("0x00abff").unwrap(), bytes);
    }

    #[test]
    fn hex_rejects_odd_length() {
        assert!(matches!(
            from_hex("0xabc"),
            Err(CodecError::OddHexLength(3))
        ));
    }

    #[test]
    fn hex_rejects_non_hex() {
        assert!(from_hex("zz").is_err());
    }

    #[test]
    fn fixed_width_hex_checks_length() {
        assert_eq!(from_hex_fixed::<2>("abcd").unwrap(), [0xab, 0xcd]);
        assert!(matches!(
            from_hex_fixed::<4>("abcd"),
            Err(CodecError::InvalidLength {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn identifier_quoting_doubles_embedded_quotes() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("_t1"));
        assert!(is_valid_identifier("Table"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier("ta-ble"));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        #[derive(Serialize)]
        struct Unordered {
            zebra: u32,
            alpha: u32,
        }
        let json = to_canonical_json(&Unordered { zebra: 1, alpha: 2 }).unwrap();
        assert_eq!(json, r#"{"alpha":2,"zebra":1}"#);
    }
}
