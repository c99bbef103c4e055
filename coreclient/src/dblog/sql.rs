// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pure translation of DBLog actions into SQLite statements. Column order
//! is pinned (`id` first, the rest alphabetical) so the emitted SQL is
//! byte-identical across replays and platforms. Values travel as bound
//! parameters; [`render_for_diagnostics`] interpolates literals for log
//! output only.

use loomcommon::codec::{is_valid_identifier, quote_identifier};

use super::{Action, DBLogError, Migration, MigrationOp, Value};

/// One statement with its bound parameters, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlStatement {
    fn bare(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }
}

/// Translates one action. Migration gating happens in the replay engine;
/// this function always emits the full statement list.
pub fn translate(action: &Action) -> Result<Vec<SqlStatement>, DBLogError> {
    let table = checked_identifier(action.table())?;
    match action {
        Action::Schema { columns, .. } => {
            let mut defs = Vec::with_capacity(columns.len());
            for column in ordered_columns(columns.keys().map(String::as_str)) {
                let column_type = &columns[column];
                defs.push(format!(
                    "{} {}",
                    quote_identifier(checked_identifier(column)?),
                    column_type
                ));
            }
            Ok(vec![SqlStatement::bare(format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_identifier(table),
                defs.join(", ")
            ))])
        }
        Action::Set { id, data, .. } => {
            let columns = ordered_columns(
                data.keys()
                    .map(String::as_str)
                    .filter(|column| *column != "id"),
            );
            let mut names = vec![quote_identifier("id")];
            let mut params = vec![Value::String(id.clone())];
            for column in columns {
                names.push(quote_identifier(checked_identifier(column)?));
                params.push(data[column].clone());
            }
            let placeholders = vec!["?"; names.len()].join(", ");
            Ok(vec![SqlStatement {
                sql: format!(
                    "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                    quote_identifier(table),
                    names.join(", "),
                    placeholders
                ),
                params,
            }])
        }
        Action::Delete { id, .. } => Ok(vec![SqlStatement {
            sql: format!("DELETE FROM {} WHERE id = ?", quote_identifier(table)),
            params: vec![Value::String(id.clone())],
        }]),
        Action::Migrate { migration, .. } => translate_migration(table, migration),
    }
}

fn translate_migration(
    table: &str,
    migration: &Migration,
) -> Result<Vec<SqlStatement>, DBLogError> {
    if migration.operations.is_empty() {
        return Err(DBLogError::InvalidMigration {
            table: table.to_string(),
        });
    }
    migration
        .operations
        .iter()
        .map(|operation| {
            let sql = match operation {
                MigrationOp::AddColumn {
                    column,
                    column_type,
                } => format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_identifier(table),
                    quote_identifier(checked_identifier(column)?),
                    column_type
                ),
                MigrationOp::DropColumn { column } => format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    quote_identifier(table),
                    quote_identifier(checked_identifier(column)?)
                ),
                MigrationOp::RenameColumn { from, to } => format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    quote_identifier(table),
                    quote_identifier(checked_identifier(from)?),
                    quote_identifier(checked_identifier(to)?)
                ),
                MigrationOp::RenameTable { to } => format!(
                    "ALTER TABLE {} RENAME TO {}",
                    quote_identifier(table),
                    quote_identifier(checked_identifier(to)?)
                ),
            };
            Ok(SqlStatement::bare(sql))
        })
        .collect()
}

/// `id` first, everything else alphabetical.
fn ordered_columns<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut columns: Vec<&str> = names.collect();
    columns.sort_unstable();
    if let Some(position) = columns.iter().position(|column| *column == "id") {
        let id = columns.remove(position);
        columns.insert(0, id);
    }
    columns
}

fn checked_identifier(name: &str) -> Result<&str, DBLogError> {
    if !is_valid_identifier(name) {
        return Err(DBLogError::InvalidIdentifier(name.to_string()));
    }
    Ok(name)
}

/// SQL literal rendering for diagnostics: single-quoted strings with `'`
/// doubled, composite values as JSON text.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'", value.to_json_text().replace('\'', "''"))
        }
    }
}

/// Interpolates parameters into the statement for log output. Never used
/// for execution.
pub fn render_for_diagnostics(statement: &SqlStatement) -> String {
    let mut out = String::with_capacity(statement.sql.len());
    let mut params = statement.params.iter();
    for chunk in statement.sql.split('?') {
        out.push_str(chunk);
        if let Some(param) = params.next() {
            out.push_str(&sql_literal(param));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn schema_action() -> Action {
        Action::Schema {
            v: 1,
            dblogindex: 0,
            table: "t".into(),
            columns: BTreeMap::from([
                ("v".to_string(), "TEXT".to_string()),
                ("id".to_string(), "TEXT PRIMARY KEY".to_string()),
                ("a".to_string(), "INTEGER".to_string()),
            ]),
        }
    }

    #[test]
    fn schema_puts_id_first_then_alphabetical() {
        let statements = translate(&schema_action()).unwrap();
        assert_eq!(
            statements[0].sql,
            r#"CREATE TABLE IF NOT EXISTS "t" ("id" TEXT PRIMARY KEY, "a" INTEGER, "v" TEXT)"#
        );
    }

    #[test]
    fn set_uses_parameter_placeholders() {
        let action = Action::Set {
            v: 1,
            dblogindex: 1,
            table: "t".into(),
            id: "x".into(),
            data: BTreeMap::from([
                ("v".to_string(), Value::String("1".into())),
                ("a".to_string(), Value::Int(2)),
            ]),
        };
        let statements = translate(&action).unwrap();
        assert_eq!(
            statements[0].sql,
            r#"INSERT OR REPLACE INTO "t" ("id", "a", "v") VALUES (?, ?, ?)"#
        );
        assert_eq!(
            statements[0].params,
            vec![
                Value::String("x".into()),
                Value::Int(2),
                Value::String("1".into())
            ]
        );
    }

    #[test]
    fn delete_matches_on_id() {
        let action = Action::Delete {
            v: 1,
            dblogindex: 2,
            table: "t".into(),
            id: "x".into(),
        };
        let statements = translate(&action).unwrap();
        assert_eq!(statements[0].sql, r#"DELETE FROM "t" WHERE id = ?"#);
    }

    #[test]
    fn migration_emits_one_statement_per_operation() {
        let action = Action::Migrate {
            v: 1,
            dblogindex: 3,
            table: "t".into(),
            migration: Migration {
                version: 1,
                operations: vec![
                    MigrationOp::AddColumn {
                        column: "w".into(),
                        column_type: "INTEGER".into(),
                    },
                    MigrationOp::RenameColumn {
                        from: "a".into(),
                        to: "b".into(),
                    },
                    MigrationOp::RenameTable { to: "t2".into() },
                ],
            },
        };
        let statements = translate(&action).unwrap();
        let sql: Vec<&str> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                r#"ALTER TABLE "t" ADD COLUMN "w" INTEGER"#,
                r#"ALTER TABLE "t" RENAME COLUMN "a" TO "b""#,
                r#"ALTER TABLE "t" RENAME TO "t2""#,
            ]
        );
    }

    #[test]
    fn translation_is_deterministic() {
        let a = translate(&schema_action()).unwrap();
        let b = translate(&schema_action()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        let action = Action::Delete {
            v: 1,
            dblogindex: 0,
            table: "t;drop".into(),
            id: "x".into(),
        };
        assert_eq!(
            translate(&action).unwrap_err(),
            DBLogError::InvalidIdentifier("t;drop".into())
        );
    }

    #[test]
    fn diagnostics_escape_quotes() {
        let statement = SqlStatement {
            sql: "DELETE FROM \"t\" WHERE id = ?".into(),
            params: vec![Value::String("o'brien".into())],
        };
        assert_eq!(
            render_for_diagnostics(&statement),
            "DELETE FROM \"t\" WHERE id = 'o''brien'"
        );
    }

    #[test]
    fn empty_migration_is_invalid() {
        let action = Action::Migrate {
            v: 1,
            dblogindex: 0,
            table: "t".into(),
            migration: Migration {
                version: 1,
                operations: vec![],
            },
        };
        assert!(matches!(
            translate(&action),
            Err(DBLogError::InvalidMigration { .. })
        ));
    }
}
