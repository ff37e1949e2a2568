use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{
    ledger::Player,
    sessions::{Privacy, Session},
};

/// The type used for primary keys in storage
pub type PrimaryKey = i64;

/// Flat storage representation of a [Session]
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub token: String,
    pub player_id: PrimaryKey,
    pub display_name: String,
    pub status: String,
    pub minecraft_version: Option<String>,
    pub world_name: Option<String>,
    pub server_address: Option<String>,
    pub game_mode: String,
    pub show_username: bool,
    pub show_version: bool,
    pub show_world: bool,
    pub show_server: bool,
    pub connected_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Flat storage representation of a [Player]
#[derive(Debug, Clone, FromRow)]
pub struct PlayerRow {
    pub id: PrimaryKey,
    pub identity_key: String,
    pub total_playtime: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CounterRow {
    pub metric: String,
    pub value: i64,
}

/// Everything the store gets back after a restart
#[derive(Debug, Default)]
pub struct PersistedState {
    pub sessions: Vec<Session>,
    pub players: Vec<Player>,
    pub counters: BTreeMap<String, i64>,
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token.clone(),
            player_id: session.player_id,
            display_name: session.display_name.clone(),
            status: session.status.clone(),
            minecraft_version: session.minecraft_version.clone(),
            world_name: session.world_name.clone(),
            server_address: session.server_address.clone(),
            game_mode: session.game_mode.clone(),
            show_username: session.privacy.show_username,
            show_version: session.privacy.show_version,
            show_world: session.privacy.show_world,
            show_server: session.privacy.show_server,
            connected_at: session.connected_at,
            last_update: session.last_update,
        }
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            token: row.token,
            player_id: row.player_id,
            display_name: row.display_name,
            status: row.status,
            minecraft_version: row.minecraft_version,
            world_name: row.world_name,
            server_address: row.server_address,
            game_mode: row.game_mode,
            privacy: Privacy {
                show_username: row.show_username,
                show_version: row.show_version,
                show_world: row.show_world,
                show_server: row.show_server,
            },
            connected_at: row.connected_at,
            last_update: row.last_update,
        }
    }
}

impl From<&Player> for PlayerRow {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            identity_key: player.identity_key.clone(),
            total_playtime: player.total_playtime,
            first_seen: player.first_seen,
            last_seen: player.last_seen,
        }
    }
}

impl From<PlayerRow> for Player {
    fn from(row: PlayerRow) -> Self {
        Self {
            id: row.id,
            identity_key: row.identity_key,
            total_playtime: row.total_playtime,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
        }
    }
}
