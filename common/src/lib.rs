// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Common data model and cryptography shared by the log client crates.

pub mod codec;
pub mod crypto;
pub mod identifiers;
pub mod messages;
pub mod time;
