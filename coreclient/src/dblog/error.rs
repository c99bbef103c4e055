// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DBLogError {
    /// The content is not a JSON array of actions.
    #[error("invalid DBLog JSON: {0}")]
    InvalidJson(String),
    /// A required field is absent from the action at `index`.
    #[error("missing field `{field}` in action at index {index}")]
    MissingField { field: &'static str, index: usize },
    /// The action at `index` carries an unrecognized type tag.
    #[error("unknown action `{name}` at index {index}")]
    UnknownAction { name: String, index: usize },
    /// The action at `index` failed to decode.
    #[error("malformed action at index {index}: {message}")]
    MalformedAction { index: usize, message: String },
    /// Table or column name is not a valid SQL identifier.
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),
    /// A migration carries no operations or is otherwise unusable.
    #[error("invalid migration for table `{table}`")]
    InvalidMigration { table: String },
    /// Underlying SQL execution failed; the per-entry transaction was
    /// rolled back and the cursor not advanced.
    #[error("sql execution failed: {0}")]
    Sql(#[from] sqlx::Error),
}

impl PartialEq for DBLogError {
    fn eq(&self, other: &Self) -> bool {
        use DBLogError::*;
        match (self, other) {
            (InvalidJson(a), InvalidJson(b)) => a == b,
            (
                MissingField { field: f1, index: i1 },
                MissingField { field: f2, index: i2 },
            ) => f1 == f2 && i1 == i2,
            (
                UnknownAction { name: n1, index: i1 },
                UnknownAction { name: n2, index: i2 },
            ) => n1 == n2 && i1 == i2,
            (
                MalformedAction { index: i1, .. },
                MalformedAction { index: i2, .. },
            ) => i1 == i2,
            (InvalidIdentifier(a), InvalidIdentifier(b)) => a == b,
            (InvalidMigration { table: t1 }, InvalidMigration { table: t2 }) => t1 == t2,
            _ => false,
        }
    }
}
