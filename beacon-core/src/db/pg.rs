use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use super::{
    CounterRow, Database, DatabaseError, PersistedState, PlayerRow, PrimaryKey, Result, SessionRow,
};
use crate::stats::{TOTAL_LAUNCHES, TOTAL_PLAYTIME, TOTAL_USERS};

/// Every schema change this crate has ever shipped, in order. New changes
/// are appended, never edited; `schema_migrations` records how far a
/// database has come.
const MIGRATIONS: &[(i32, &str)] = &[
    (
        1,
        "CREATE TABLE players (
            id BIGINT PRIMARY KEY,
            identity_key TEXT NOT NULL UNIQUE,
            total_playtime BIGINT NOT NULL DEFAULT 0,
            first_seen TIMESTAMPTZ NOT NULL,
            last_seen TIMESTAMPTZ NOT NULL
        );
        CREATE TABLE sessions (
            token TEXT PRIMARY KEY,
            player_id BIGINT NOT NULL REFERENCES players (id),
            display_name TEXT NOT NULL,
            status TEXT NOT NULL,
            minecraft_version TEXT,
            world_name TEXT,
            server_address TEXT,
            show_username BOOLEAN NOT NULL DEFAULT TRUE,
            show_version BOOLEAN NOT NULL DEFAULT TRUE,
            show_world BOOLEAN NOT NULL DEFAULT TRUE,
            show_server BOOLEAN NOT NULL DEFAULT TRUE,
            connected_at TIMESTAMPTZ NOT NULL,
            last_update TIMESTAMPTZ NOT NULL
        );
        CREATE TABLE stat_counters (
            metric TEXT PRIMARY KEY,
            value BIGINT NOT NULL DEFAULT 0
        )",
    ),
    (
        2,
        "ALTER TABLE sessions ADD COLUMN game_mode TEXT NOT NULL DEFAULT 'idle'",
    ),
];

const UPSERT_SESSION: &str = "
    INSERT INTO sessions (
        token, player_id, display_name, status,
        minecraft_version, world_name, server_address, game_mode,
        show_username, show_version, show_world, show_server,
        connected_at, last_update
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (token) DO UPDATE SET
        status = EXCLUDED.status,
        minecraft_version = EXCLUDED.minecraft_version,
        world_name = EXCLUDED.world_name,
        server_address = EXCLUDED.server_address,
        game_mode = EXCLUDED.game_mode,
        show_username = EXCLUDED.show_username,
        show_version = EXCLUDED.show_version,
        show_world = EXCLUDED.show_world,
        show_server = EXCLUDED.show_server,
        last_update = EXCLUDED.last_update";

/// A postgres implementation of beacon storage
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connects to the database and brings its schema up to date
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        let current: Option<i32> = sqlx::query_scalar("SELECT max(version) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;
        let current = current.unwrap_or(0);

        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let mut tx = self.pool.begin().await?;

            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                    DatabaseError::Migration {
                        version: *version,
                        reason: e.to_string(),
                    }
                })?;
            }

            sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
                .bind(version)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            info!("Applied schema migration {version}");
        }

        Ok(())
    }

    async fn bump_counter(
        tx: &mut Transaction<'_, Postgres>,
        metric: &str,
        delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO stat_counters (metric, value) VALUES ($1, $2)
             ON CONFLICT (metric) DO UPDATE SET value = stat_counters.value + EXCLUDED.value",
        )
        .bind(metric)
        .bind(delta)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    fn bind_session<'q>(
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        session: &'q SessionRow,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        query
            .bind(&session.token)
            .bind(session.player_id)
            .bind(&session.display_name)
            .bind(&session.status)
            .bind(&session.minecraft_version)
            .bind(&session.world_name)
            .bind(&session.server_address)
            .bind(&session.game_mode)
            .bind(session.show_username)
            .bind(session.show_version)
            .bind(session.show_world)
            .bind(session.show_server)
            .bind(session.connected_at)
            .bind(session.last_update)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn load_state(&self) -> Result<PersistedState> {
        let sessions: Vec<SessionRow> = sqlx::query_as("SELECT * FROM sessions")
            .fetch_all(&self.pool)
            .await?;

        let players: Vec<PlayerRow> = sqlx::query_as("SELECT * FROM players")
            .fetch_all(&self.pool)
            .await?;

        let counters: Vec<CounterRow> = sqlx::query_as("SELECT * FROM stat_counters")
            .fetch_all(&self.pool)
            .await?;

        Ok(PersistedState {
            sessions: sessions.into_iter().map(Into::into).collect(),
            players: players.into_iter().map(Into::into).collect(),
            counters: counters.into_iter().map(|c| (c.metric, c.value)).collect(),
        })
    }

    async fn record_connect(
        &self,
        session: &SessionRow,
        player: &PlayerRow,
        new_player: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO players (id, identity_key, total_playtime, first_seen, last_seen)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (identity_key) DO UPDATE SET last_seen = EXCLUDED.last_seen",
        )
        .bind(player.id)
        .bind(&player.identity_key)
        .bind(player.total_playtime)
        .bind(player.first_seen)
        .bind(player.last_seen)
        .execute(&mut *tx)
        .await?;

        Self::bind_session(sqlx::query(UPSERT_SESSION), session)
            .execute(&mut *tx)
            .await?;

        Self::bump_counter(&mut tx, TOTAL_LAUNCHES, 1).await?;

        if new_player {
            Self::bump_counter(&mut tx, TOTAL_USERS, 1).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn record_disconnect(
        &self,
        token: &str,
        player_id: PrimaryKey,
        playtime: i64,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE players SET total_playtime = total_playtime + $2, last_seen = $3
             WHERE id = $1",
        )
        .bind(player_id)
        .bind(playtime)
        .bind(last_seen)
        .execute(&mut *tx)
        .await?;

        Self::bump_counter(&mut tx, TOTAL_PLAYTIME, playtime).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn flush_sessions(&self, sessions: &[SessionRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for session in sessions {
            Self::bind_session(sqlx::query(UPSERT_SESSION), session)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}
