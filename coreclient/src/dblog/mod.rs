// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The DBLog content codec: a JSON array of schema/row operations carried
//! inside chain entries, replayed deterministically into SQLite.

mod error;
pub mod replay;
pub mod sql;

pub use error::DBLogError;
pub use replay::ReplayEngine;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// JSON-compatible value stored in a row column. Arrays and objects are
/// persisted as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// JSON text for composite values, used for SQL storage.
    pub fn to_json_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

/// Column operations of a schema migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MigrationOp {
    AddColumn { column: String, column_type: String },
    DropColumn { column: String },
    RenameColumn { from: String, to: String },
    RenameTable { to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub version: i64,
    pub operations: Vec<MigrationOp>,
}

/// One DBLog action. Every action carries the codec version `v`, its
/// position within the entry (`dblogindex`) and the target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Schema {
        v: i64,
        dblogindex: i64,
        table: String,
        columns: BTreeMap<String, String>,
    },
    Set {
        v: i64,
        dblogindex: i64,
        table: String,
        id: String,
        data: BTreeMap<String, Value>,
    },
    Delete {
        v: i64,
        dblogindex: i64,
        table: String,
        id: String,
    },
    Migrate {
        v: i64,
        dblogindex: i64,
        table: String,
        migration: Migration,
    },
}

impl Action {
    pub fn dblogindex(&self) -> i64 {
        match self {
            Action::Schema { dblogindex, .. }
            | Action::Set { dblogindex, .. }
            | Action::Delete { dblogindex, .. }
            | Action::Migrate { dblogindex, .. } => *dblogindex,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Action::Schema { table, .. }
            | Action::Set { table, .. }
            | Action::Delete { table, .. }
            | Action::Migrate { table, .. } => table,
        }
    }
}

/// Encodes actions as the JSON array carried in entry content.
pub fn encode_actions(actions: &[Action]) -> Result<String, DBLogError> {
    serde_json::to_string(actions).map_err(|e| DBLogError::InvalidJson(e.to_string()))
}

/// Decodes entry content into actions, reporting missing/unknown pieces
/// with their position.
pub fn decode_actions(content: &str) -> Result<Vec<Action>, DBLogError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(content).map_err(|e| DBLogError::InvalidJson(e.to_string()))?;
    values
        .iter()
        .enumerate()
        .map(|(index, value)| decode_action(value, index))
        .collect()
}

fn decode_action(value: &serde_json::Value, index: usize) -> Result<Action, DBLogError> {
    let object = value
        .as_object()
        .ok_or_else(|| DBLogError::InvalidJson(format!("action at index {index} is not an object")))?;
    let name = object
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(DBLogError::MissingField {
            field: "type",
            index,
        })?;

    let required: &[&'static str] = match name {
        "schema" => &["v", "dblogindex", "table", "columns"],
        "set" => &["v", "dblogindex", "table", "id", "data"],
        "delete" => &["v", "dblogindex", "table", "id"],
        "migrate" => &["v", "dblogindex", "table", "migration"],
        _ => {
            return Err(DBLogError::UnknownAction {
                name: name.to_string(),
                index,
            });
        }
    };
    for field in required {
        if !object.contains_key(*field) {
            return Err(DBLogError::MissingField { field, index });
        }
    }
    serde_json::from_value(value.clone()).map_err(|e| DBLogError::MalformedAction {
        index,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_roundtrip() {
        let actions = vec![
            Action::Schema {
                v: 1,
                dblogindex: 0,
                table: "t".into(),
                columns: BTreeMap::from([
                    ("id".to_string(), "TEXT PRIMARY KEY".to_string()),
                    ("v".to_string(), "TEXT".to_string()),
                ]),
            },
            Action::Set {
                v: 1,
                dblogindex: 1,
                table: "t".into(),
                id: "x".into(),
                data: BTreeMap::from([("v".to_string(), Value::String("1".into()))]),
            },
        ];
        let encoded = encode_actions(&actions).unwrap();
        assert_eq!(decode_actions(&encoded).unwrap(), actions);
    }

    #[test]
    fn unknown_action_reports_name_and_index() {
        let content = r#"[{"type":"schema","v":1,"dblogindex":0,"table":"t","columns":{}},
            {"type":"truncate","v":1,"dblogindex":1,"table":"t"}]"#;
        assert_eq!(
            decode_actions(content).unwrap_err(),
            DBLogError::UnknownAction {
                name: "truncate".into(),
                index: 1
            }
        );
    }

    #[test]
    fn missing_field_reports_field_and_index() {
        let content = r#"[{"type":"set","v":1,"dblogindex":0,"table":"t","data":{}}]"#;
        assert_eq!(
            decode_actions(content).unwrap_err(),
            DBLogError::MissingField {
                field: "id",
                index: 0
            }
        );
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            decode_actions("not json"),
            Err(DBLogError::InvalidJson(_))
        ));
    }

    #[test]
    fn values_decode_with_integer_preference() {
        let content = r#"[{"type":"set","v":1,"dblogindex":0,"table":"t","id":"a",
            "data":{"i":3,"d":3.5,"b":true,"n":null,"s":"x","arr":[1,2],"obj":{"k":"v"}}}]"#;
        let actions = decode_actions(content).unwrap();
        let Action::Set { data, .. } = &actions[0] else {
            panic!("expected set");
        };
        assert_eq!(data["i"], Value::Int(3));
        assert_eq!(data["d"], Value::Double(3.5));
        assert_eq!(data["b"], Value::Bool(true));
        assert_eq!(data["n"], Value::Null);
        assert_eq!(data["arr"], Value::Array(vec![Value::Int(1), Value::Int(2)]));
    }
}
