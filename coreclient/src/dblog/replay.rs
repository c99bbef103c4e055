// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The replay engine: applies decoded action lists to SQLite. All
//! statements derived from one chain entry run in a single transaction
//! together with the cursor update, so either everything persists or
//! nothing does. Migrations are gated on the per-table schema version.

use std::collections::BTreeSet;

use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, query, query_scalar};
use tracing::{debug, instrument};

use super::{Action, DBLogError, Value, sql};

const CREATE_META: &str = r#"CREATE TABLE IF NOT EXISTS "_dblog_meta" (key TEXT PRIMARY KEY, value TEXT NOT NULL)"#;
const CREATE_SCHEMA_VERSIONS: &str = r#"CREATE TABLE IF NOT EXISTS "_dblog_schema_versions" (table_name TEXT PRIMARY KEY, version INTEGER NOT NULL DEFAULT 0)"#;

const LAST_CHAIN_INDEX_KEY: &str = "last_chain_index";
const LAST_DBLOG_INDEX_KEY: &str = "last_dblog_index";

/// Replay cursor: the highest fully applied entry and the highest
/// `dblogindex` inside it (`-1` before anything was applied, and for
/// entries without actions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayCursor {
    pub last_chain_index: i64,
    pub last_dblog_index: i64,
}

impl Default for ReplayCursor {
    fn default() -> Self {
        Self {
            last_chain_index: -1,
            last_dblog_index: -1,
        }
    }
}

/// Deterministic translator and executor for DBLog action streams.
pub struct ReplayEngine {
    pool: SqlitePool,
}

impl ReplayEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the reserved bookkeeping tables.
    pub async fn initialize(&self) -> Result<(), DBLogError> {
        let mut connection = self.pool.acquire().await?;
        query(CREATE_META).execute(&mut *connection).await?;
        query(CREATE_SCHEMA_VERSIONS)
            .execute(&mut *connection)
            .await?;
        Ok(())
    }

    pub async fn cursor(&self) -> Result<ReplayCursor, DBLogError> {
        let mut connection = self.pool.acquire().await?;
        load_cursor(&mut connection).await
    }

    /// Reads an auxiliary value from the bookkeeping table.
    pub(crate) async fn get_meta(&self, key: &str) -> Result<Option<String>, DBLogError> {
        let value = query_scalar(r#"SELECT value FROM "_dblog_meta" WHERE key = ?"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Stores an auxiliary value in the bookkeeping table.
    pub(crate) async fn set_meta(&self, key: &str, value: &str) -> Result<(), DBLogError> {
        query(r#"INSERT OR REPLACE INTO "_dblog_meta" (key, value) VALUES (?, ?)"#)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn schema_version(&self, table: &str) -> Result<i64, DBLogError> {
        let mut connection = self.pool.acquire().await?;
        load_schema_version(&mut connection, table).await
    }

    /// Applies all actions of one chain entry atomically, in ascending
    /// `dblogindex` order, and advances the cursor in the same
    /// transaction. Returns the set of affected tables.
    #[instrument(level = "debug", skip(self, actions), fields(actions = actions.len()))]
    pub async fn apply_entry(
        &self,
        chain_index: u64,
        actions: &[Action],
    ) -> Result<BTreeSet<String>, DBLogError> {
        let mut ordered: Vec<&Action> = actions.iter().collect();
        ordered.sort_by_key(|action| action.dblogindex());

        let mut tx = self.pool.begin().await?;
        let mut affected = BTreeSet::new();

        for action in &ordered {
            if let Action::Migrate {
                table, migration, ..
            } = action
            {
                let current = load_schema_version(&mut *tx, table).await?;
                if current >= migration.version {
                    debug!(
                        table,
                        current,
                        version = migration.version,
                        "skipping stale migration"
                    );
                    continue;
                }
            }
            for statement in sql::translate(action)? {
                let mut q = query(&statement.sql);
                for param in &statement.params {
                    q = bind_value(q, param);
                }
                q.execute(&mut *tx).await?;
            }
            if let Action::Migrate {
                table, migration, ..
            } = action
            {
                query(
                    r#"INSERT OR REPLACE INTO "_dblog_schema_versions" (table_name, version) VALUES (?, ?)"#,
                )
                .bind(table)
                .bind(migration.version)
                .execute(&mut *tx)
                .await?;
            }
            affected.insert(action.table().to_string());
        }

        let cursor = load_cursor(&mut *tx).await?;
        let last_dblog_index = ordered
            .iter()
            .map(|action| action.dblogindex())
            .max()
            .unwrap_or(-1);
        // The cursor never moves backwards; re-applying an old entry is a
        // no-op for it.
        if chain_index as i64 >= cursor.last_chain_index {
            store_cursor(
                &mut *tx,
                ReplayCursor {
                    last_chain_index: chain_index as i64,
                    last_dblog_index,
                },
            )
            .await?;
        }
        tx.commit().await?;
        Ok(affected)
    }
}

async fn load_cursor(connection: &mut SqliteConnection) -> Result<ReplayCursor, DBLogError> {
    let mut cursor = ReplayCursor::default();
    let rows = query(r#"SELECT key, value FROM "_dblog_meta" WHERE key IN (?, ?)"#)
        .bind(LAST_CHAIN_INDEX_KEY)
        .bind(LAST_DBLOG_INDEX_KEY)
        .fetch_all(&mut *connection)
        .await?;
    for row in rows {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        let parsed: i64 = value.parse().unwrap_or(-1);
        match key.as_str() {
            LAST_CHAIN_INDEX_KEY => cursor.last_chain_index = parsed,
            LAST_DBLOG_INDEX_KEY => cursor.last_dblog_index = parsed,
            _ => {}
        }
    }
    Ok(cursor)
}

async fn store_cursor(
    connection: &mut SqliteConnection,
    cursor: ReplayCursor,
) -> Result<(), DBLogError> {
    for (key, value) in [
        (LAST_CHAIN_INDEX_KEY, cursor.last_chain_index),
        (LAST_DBLOG_INDEX_KEY, cursor.last_dblog_index),
    ] {
        query(r#"INSERT OR REPLACE INTO "_dblog_meta" (key, value) VALUES (?, ?)"#)
            .bind(key)
            .bind(value.to_string())
            .execute(&mut *connection)
            .await?;
    }
    Ok(())
}

async fn load_schema_version(
    connection: &mut SqliteConnection,
    table: &str,
) -> Result<i64, DBLogError> {
    let version: Option<i64> =
        query_scalar(r#"SELECT version FROM "_dblog_schema_versions" WHERE table_name = ?"#)
            .bind(table)
            .fetch_optional(&mut *connection)
            .await?;
    Ok(version.unwrap_or(0))
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::Null => q.bind(None::<String>),
        Value::Bool(b) => q.bind(*b),
        Value::Int(i) => q.bind(*i),
        Value::Double(d) => q.bind(*d),
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(value.to_json_text()),
    }
}
