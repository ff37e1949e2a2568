use chrono::{DateTime, Utc};

use crate::db::PrimaryKey;

/// One connected launcher instance.
#[derive(Debug, Clone)]
pub struct Session {
    /// The unique token identifying this session, assigned at creation
    pub token: String,
    /// The player this session belongs to
    pub player_id: PrimaryKey,
    /// The raw username supplied at connect time
    pub display_name: String,
    /// `online`, `playing`, or `idle`. Other values are tolerated as-is.
    pub status: String,
    pub minecraft_version: Option<String>,
    pub world_name: Option<String>,
    pub server_address: Option<String>,
    /// Free-text secondary status
    pub game_mode: String,
    pub privacy: Privacy,
    /// Set once when the session is created, never mutated afterwards
    pub connected_at: DateTime<Utc>,
    /// Refreshed on every mutation, heartbeats included. Drives eviction.
    pub last_update: DateTime<Utc>,
}

impl Session {
    pub const DEFAULT_STATUS: &'static str = "online";
    pub const DEFAULT_GAME_MODE: &'static str = "idle";

    /// Seconds this session has been connected, as of `now`
    pub fn duration_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.connected_at).num_seconds().max(0)
    }

    pub(crate) fn apply(&mut self, patch: &SessionPatch) {
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }

        if let Some(game_mode) = &patch.game_mode {
            self.game_mode = game_mode.clone();
        }

        if let Some(version) = &patch.minecraft_version {
            self.minecraft_version = version.clone();
        }

        if let Some(world) = &patch.world_name {
            self.world_name = world.clone();
        }

        if let Some(address) = &patch.server_address {
            self.server_address = address.clone();
        }

        if let Some(privacy) = &patch.privacy {
            self.privacy.apply(privacy);
        }
    }
}

/// What a session chooses to show to observers. Anything not explicitly
/// switched off stays visible.
#[derive(Debug, Clone, Copy)]
pub struct Privacy {
    pub show_username: bool,
    pub show_version: bool,
    pub show_world: bool,
    pub show_server: bool,
}

impl Privacy {
    fn apply(&mut self, patch: &PrivacyPatch) {
        if let Some(show_username) = patch.show_username {
            self.show_username = show_username;
        }

        if let Some(show_version) = patch.show_version {
            self.show_version = show_version;
        }

        if let Some(show_world) = patch.show_world {
            self.show_world = show_world;
        }

        if let Some(show_server) = patch.show_server {
            self.show_server = show_server;
        }
    }
}

impl Default for Privacy {
    fn default() -> Self {
        Self {
            show_username: true,
            show_version: true,
            show_world: true,
            show_server: true,
        }
    }
}

/// A new connection, before the store has assigned it a token and a player.
#[derive(Debug, Default)]
pub struct NewSession {
    pub display_name: String,
    /// Stable identity of the connecting player, when the client has one.
    /// Without it the session token doubles as the identity key, making
    /// every connect look like a first-time player.
    pub identity_hint: Option<String>,
    pub privacy: Privacy,
}

/// A sparse patch to a session. `None` leaves a field untouched; the nested
/// options clear the nullable fields. An all-`None` patch is a heartbeat.
#[derive(Debug, Default, Clone)]
pub struct SessionPatch {
    pub status: Option<String>,
    pub game_mode: Option<String>,
    pub minecraft_version: Option<Option<String>>,
    pub world_name: Option<Option<String>>,
    pub server_address: Option<Option<String>>,
    pub privacy: Option<PrivacyPatch>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PrivacyPatch {
    pub show_username: Option<bool>,
    pub show_version: Option<bool>,
    pub show_world: Option<bool>,
    pub show_server: Option<bool>,
}
