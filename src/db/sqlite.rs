// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Credentials (one Withings account per local user)
//! - Measure groups and their measures

use crate::error::AppError;
use crate::models::{Attribution, Category, Credential, Measure, MeasureGroup, MeasureType};
use crate::services::withings::ProviderMeasureGroup;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 5;

/// Database client.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database at `url` and create the schema if needed.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database,
        // so keep exactly one connection alive for its whole lifetime.
        let in_memory = url.contains(":memory:");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;

        tracing::info!(in_memory, "Connected to database");
        Ok(db)
    }

    /// Fresh in-memory database (tests, local experiments).
    pub async fn in_memory() -> Result<Self, AppError> {
        Self::connect("sqlite::memory:").await
    }

    /// Create tables and indexes.
    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS withings_credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                withings_user_id INTEGER NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                token_type TEXT NOT NULL DEFAULT 'Bearer',
                token_expiry TEXT,
                last_update TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_withings_credentials_withings_user \
             ON withings_credentials(withings_user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS measure_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                grpid INTEGER NOT NULL,
                attrib INTEGER NOT NULL,
                date TEXT NOT NULL,
                updatetime TEXT NOT NULL,
                category INTEGER NOT NULL,
                UNIQUE(user_id, grpid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS measures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES measure_groups(id) ON DELETE CASCADE,
                value INTEGER NOT NULL,
                measure_type INTEGER NOT NULL,
                unit INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_measures_group ON measures(group_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ─── Credentials ─────────────────────────────────────────────

    /// Get the credential for a local user.
    pub async fn get_credential(&self, user_id: i64) -> Result<Option<Credential>, AppError> {
        let row = sqlx::query(
            r"
            SELECT user_id, withings_user_id, access_token, refresh_token,
                   token_type, token_expiry, last_update
            FROM withings_credentials
            WHERE user_id = ?
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_credential(&r)).transpose()
    }

    /// All credentials linked to a Withings account.
    ///
    /// Withings IDs are not unique here: several local users may have
    /// linked the same account.
    pub async fn credentials_for_withings_user(
        &self,
        withings_user_id: i64,
    ) -> Result<Vec<Credential>, AppError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, withings_user_id, access_token, refresh_token,
                   token_type, token_expiry, last_update
            FROM withings_credentials
            WHERE withings_user_id = ?
            ORDER BY user_id
            ",
        )
        .bind(withings_user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_credential).collect()
    }

    /// Insert the credential, or overwrite the existing one for this user.
    pub async fn upsert_credential(&self, credential: &Credential) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO withings_credentials (
                user_id, withings_user_id, access_token, refresh_token,
                token_type, token_expiry, last_update, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                withings_user_id = excluded.withings_user_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                token_expiry = excluded.token_expiry,
                last_update = excluded.last_update,
                updated_at = excluded.updated_at
            ",
        )
        .bind(credential.user_id)
        .bind(credential.withings_user_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(&credential.token_type)
        .bind(credential.token_expiry)
        .bind(credential.last_update)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record when the user's measurements were last fetched.
    pub async fn set_last_update(
        &self,
        user_id: i64,
        last_update: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE withings_credentials SET last_update = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(last_update)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete the user's credential. Returns whether a row was removed.
    pub async fn delete_credential(&self, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM withings_credentials WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ─── Measurements ────────────────────────────────────────────

    /// Whether a group with this Withings ID is already stored for the user.
    pub async fn measure_group_exists(&self, user_id: i64, grpid: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM measure_groups WHERE user_id = ? AND grpid = ?)",
        )
        .bind(user_id)
        .bind(grpid)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Store a group and its measures in one transaction.
    ///
    /// Returns the number of measures written. A group that already exists
    /// for the user yields [`AppError::DuplicateGroup`] and writes nothing.
    pub async fn insert_measure_group(
        &self,
        user_id: i64,
        group: &ProviderMeasureGroup,
        updatetime: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO measure_groups (user_id, grpid, attrib, date, updatetime, category)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(user_id)
        .bind(group.grpid)
        .bind(group.attrib.code())
        .bind(group.date)
        .bind(updatetime)
        .bind(group.category.code())
        .execute(&mut *tx)
        .await;

        let group_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::DuplicateGroup {
                    user_id,
                    grpid: group.grpid,
                });
            }
            Err(e) => return Err(e.into()),
        };

        for measure in &group.measures {
            sqlx::query(
                "INSERT INTO measures (group_id, value, measure_type, unit) VALUES (?, ?, ?, ?)",
            )
            .bind(group_id)
            .bind(measure.value)
            .bind(measure.measure_type.code())
            .bind(measure.unit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(group.measures.len())
    }

    /// All stored groups for a user, newest first, with their measures.
    pub async fn list_measure_groups(&self, user_id: i64) -> Result<Vec<MeasureGroup>, AppError> {
        let group_rows = sqlx::query(
            r"
            SELECT id, user_id, grpid, attrib, date, updatetime, category
            FROM measure_groups
            WHERE user_id = ?
            ORDER BY date DESC, grpid DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let measure_rows = sqlx::query(
            r"
            SELECT m.id, m.group_id, m.value, m.measure_type, m.unit
            FROM measures m
            JOIN measure_groups g ON g.id = m.group_id
            WHERE g.user_id = ?
            ORDER BY m.id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut measures_by_group: HashMap<i64, Vec<Measure>> = HashMap::new();
        for row in &measure_rows {
            let measure = row_to_measure(row)?;
            measures_by_group
                .entry(measure.group_id)
                .or_default()
                .push(measure);
        }

        group_rows
            .iter()
            .map(|row| {
                let mut group = row_to_measure_group(row)?;
                group.measures = measures_by_group.remove(&group.id).unwrap_or_default();
                Ok(group)
            })
            .collect()
    }

    /// Number of groups stored for a user.
    pub async fn count_measure_groups(&self, user_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measure_groups WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of measures stored for a user.
    pub async fn count_measures(&self, user_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM measures m
            JOIN measure_groups g ON g.id = m.group_id
            WHERE g.user_id = ?
            ",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Delete one stored group; its measures go with it.
    pub async fn delete_measure_group(&self, user_id: i64, grpid: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM measure_groups WHERE user_id = ? AND grpid = ?")
            .bind(user_id)
            .bind(grpid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_credential(row: &SqliteRow) -> Result<Credential, AppError> {
    Ok(Credential {
        user_id: row.try_get("user_id")?,
        withings_user_id: row.try_get("withings_user_id")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        token_type: row.try_get("token_type")?,
        token_expiry: row.try_get("token_expiry")?,
        last_update: row.try_get("last_update")?,
    })
}

fn row_to_measure_group(row: &SqliteRow) -> Result<MeasureGroup, AppError> {
    Ok(MeasureGroup {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        grpid: row.try_get("grpid")?,
        attrib: Attribution::from_code(row.try_get("attrib")?),
        date: row.try_get("date")?,
        updatetime: row.try_get("updatetime")?,
        category: Category::from_code(row.try_get("category")?),
        measures: Vec::new(),
    })
}

fn row_to_measure(row: &SqliteRow) -> Result<Measure, AppError> {
    Ok(Measure {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        value: row.try_get("value")?,
        measure_type: MeasureType::from_code(row.try_get("measure_type")?),
        unit: row.try_get("unit")?,
    })
}
