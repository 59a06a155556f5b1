use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{InningsState, SessionId, SnapshotId},
    protocol::{InningsSnapshot, SessionSummary},
};

/// Snapshot persistence as the scorekeeper sees it.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &InningsSnapshot) -> Result<SnapshotId>;

    async fn load_latest_snapshot(&self, session_id: SessionId)
        -> Result<Option<InningsSnapshot>>;

    /// Most recent `limit` snapshots of a session, oldest first.
    async fn snapshot_history(
        &self,
        session_id: SessionId,
        limit: u32,
    ) -> Result<Vec<InningsSnapshot>>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run innings migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn create_session(&self) -> Result<SessionId> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO innings_sessions (created_at, updated_at) VALUES (?, ?) RETURNING id",
        )
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to create innings session")?;
        Ok(SessionId(rec.get::<i64, _>(0)))
    }

    pub async fn session_exists(&self, session_id: SessionId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM innings_sessions WHERE id = ?")
            .bind(session_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Session touched most recently, if any.
    pub async fn latest_session(&self) -> Result<Option<SessionId>> {
        let row = sqlx::query(
            "SELECT id FROM innings_sessions ORDER BY updated_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| SessionId(r.get::<i64, _>(0))))
    }

    pub async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT s.id, s.created_at, s.updated_at, COUNT(n.id)
             FROM innings_sessions s
             LEFT JOIN innings_snapshots n ON n.session_id = s.id
             GROUP BY s.id
             ORDER BY s.updated_at DESC, s.id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| SessionSummary {
                session_id: SessionId(r.get::<i64, _>(0)),
                created_at: r.get::<DateTime<Utc>, _>(1),
                updated_at: r.get::<DateTime<Utc>, _>(2),
                snapshot_count: r.get::<i64, _>(3),
            })
            .collect())
    }

    pub async fn save_snapshot(&self, snapshot: &InningsSnapshot) -> Result<SnapshotId> {
        let state_json =
            serde_json::to_string(&snapshot.state).context("failed to encode innings state")?;

        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO innings_snapshots (session_id, seq, state_json, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(snapshot.session_id.0)
        .bind(snapshot.seq)
        .bind(state_json)
        .bind(snapshot.updated_at)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| {
            format!(
                "failed to store snapshot {} of session {}",
                snapshot.seq, snapshot.session_id.0
            )
        })?;
        sqlx::query("UPDATE innings_sessions SET updated_at = ? WHERE id = ?")
            .bind(snapshot.updated_at)
            .bind(snapshot.session_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(SnapshotId(rec.get::<i64, _>(0)))
    }

    pub async fn load_latest_snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<Option<InningsSnapshot>> {
        let row = sqlx::query(
            "SELECT session_id, seq, state_json, created_at
             FROM innings_snapshots
             WHERE session_id = ?
             ORDER BY seq DESC
             LIMIT 1",
        )
        .bind(session_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| snapshot_from_row(&r)).transpose()
    }

    pub async fn snapshot_history(
        &self,
        session_id: SessionId,
        limit: u32,
    ) -> Result<Vec<InningsSnapshot>> {
        let mut rows = sqlx::query(
            "SELECT session_id, seq, state_json, created_at
             FROM innings_snapshots
             WHERE session_id = ?
             ORDER BY seq DESC
             LIMIT ?",
        )
        .bind(session_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        rows.iter().map(snapshot_from_row).collect()
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for Storage {
    async fn save_snapshot(&self, snapshot: &InningsSnapshot) -> Result<SnapshotId> {
        Storage::save_snapshot(self, snapshot).await
    }

    async fn load_latest_snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<Option<InningsSnapshot>> {
        Storage::load_latest_snapshot(self, session_id).await
    }

    async fn snapshot_history(
        &self,
        session_id: SessionId,
        limit: u32,
    ) -> Result<Vec<InningsSnapshot>> {
        Storage::snapshot_history(self, session_id, limit).await
    }

    async fn health_check(&self) -> Result<()> {
        Storage::health_check(self).await
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<InningsSnapshot> {
    let session_id = SessionId(row.get::<i64, _>(0));
    let seq = row.get::<i64, _>(1);
    let state: InningsState = serde_json::from_str(&row.get::<String, _>(2)).with_context(|| {
        format!(
            "snapshot {seq} of session {} holds unreadable state",
            session_id.0
        )
    })?;
    Ok(InningsSnapshot {
        session_id,
        seq,
        state,
        updated_at: row.get::<DateTime<Utc>, _>(3),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
