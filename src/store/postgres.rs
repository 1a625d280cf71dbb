//! Postgres-backed session store (source of truth)

use crate::error::{BrokerError, Result};
use crate::store::{NewSession, SessionStore};
use crate::types::{PlayerId, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

/// Durable session store on a Postgres pool.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Connect and run the idempotent schema migration.
    ///
    /// An unreachable relational store is fatal; the orchestrator cannot run
    /// without its source of truth.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| BrokerError::SessionStoreFailed {
                message: format!("Failed to connect to Postgres: {e}"),
            })?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to session store");
        Ok(store)
    }

    /// Create tables if missing and add columns introduced after the first
    /// deployment. Every statement is idempotent so replicas can race on
    /// startup.
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
              session_id text PRIMARY KEY,
              players_json text NOT NULL,
              backend_instance text,
              created_at timestamptz NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for migration in [
            "ALTER TABLE sessions ADD COLUMN IF NOT EXISTS compute_unit_id text",
            "ALTER TABLE sessions ADD COLUMN IF NOT EXISTS connect_host text NOT NULL DEFAULT ''",
            "ALTER TABLE sessions ADD COLUMN IF NOT EXISTS connect_port int NOT NULL DEFAULT 0",
            "ALTER TABLE sessions ADD COLUMN IF NOT EXISTS ended_at timestamptz",
        ] {
            sqlx::query(migration).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_players (
              session_id text NOT NULL,
              player_id text NOT NULL,
              position int NOT NULL,
              PRIMARY KEY (session_id, player_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS session_players_player_idx \
             ON session_players (player_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_session(row: &PgRow) -> Result<Session> {
        let players_json: String = row.try_get("players_json")?;
        let players: Vec<PlayerId> = serde_json::from_str(&players_json)?;
        let port: i32 = row.try_get("connect_port")?;
        Ok(Session {
            session_id: row.try_get("session_id")?,
            players,
            backend_instance: row
                .try_get::<Option<String>, _>("backend_instance")?
                .unwrap_or_default(),
            compute_unit_id: row.try_get("compute_unit_id")?,
            connect_host: row
                .try_get::<Option<String>, _>("connect_host")?
                .unwrap_or_default(),
            connect_port: u16::try_from(port).unwrap_or(0),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            ended_at: row.try_get::<Option<DateTime<Utc>>, _>("ended_at")?,
        })
    }
}

const SESSION_COLUMNS: &str = "session_id, players_json, backend_instance, compute_unit_id, \
                               connect_host, connect_port, created_at, ended_at";

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: &NewSession) -> Result<()> {
        let players_json = serde_json::to_string(&session.players)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sessions (session_id, players_json, backend_instance) \
             VALUES ($1, $2, $3)",
        )
        .bind(&session.session_id)
        .bind(&players_json)
        .bind(&session.backend_instance)
        .execute(&mut *tx)
        .await?;

        for (position, player_id) in session.players.iter().enumerate() {
            sqlx::query(
                "INSERT INTO session_players (session_id, player_id, position) \
                 VALUES ($1, $2, $3)",
            )
            .bind(&session.session_id)
            .bind(player_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_endpoint(
        &self,
        session_id: &str,
        compute_unit_id: &str,
        connect_host: &str,
        connect_port: u16,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions \
             SET compute_unit_id = $2, connect_host = $3, connect_port = $4 \
             WHERE session_id = $1 AND ended_at IS NULL AND connect_host = ''",
        )
        .bind(session_id)
        .bind(compute_unit_id)
        .bind(connect_host)
        .bind(i32::from(connect_port))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_ended(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET ended_at = now() \
             WHERE session_id = $1 AND ended_at IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn session_by_prefix(&self, prefix: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE session_id LIKE $1 || '%' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn latest_session_for_player(&self, player_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s \
             WHERE EXISTS (
               SELECT 1 FROM session_players p \
               WHERE p.session_id = s.session_id AND p.player_id = $1
             ) \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn active_sessions(&self) -> Result<Vec<Session>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE ended_at IS NULL \
               AND created_at > now() - interval '5 minutes' \
             ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_session).collect()
    }
}
