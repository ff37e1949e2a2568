//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from core types

use beacon_core::{PresenceView, Session, VersionCount};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    token: String,
    status: String,
    game_mode: String,
    minecraft_version: Option<String>,
    world_name: Option<String>,
    server_address: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    username: String,
    status: String,
    minecraft_version: Option<String>,
    world_name: Option<String>,
    server_address: Option<String>,
    game_mode: String,
    /// Seconds since the session connected
    session_duration: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceList {
    sessions: Vec<Presence>,
    count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResult {
    /// How long the session lasted, in seconds
    duration: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PopularVersion {
    version: String,
    count: i64,
}

/// The shape of one server-sent notification, for documentation purposes.
/// The actual payload is serialized by the core.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotification {
    /// One of `initial`, `player_connected`, `player_updated`,
    /// `player_disconnected`, `cleanup`
    kind: String,
    sessions: Vec<Presence>,
    count: usize,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<SessionInfo> for Session {
    fn to_serialized(&self) -> SessionInfo {
        SessionInfo {
            token: self.token.clone(),
            status: self.status.clone(),
            game_mode: self.game_mode.clone(),
            minecraft_version: self.minecraft_version.clone(),
            world_name: self.world_name.clone(),
            server_address: self.server_address.clone(),
        }
    }
}

impl ToSerialized<Presence> for PresenceView {
    fn to_serialized(&self) -> Presence {
        Presence {
            username: self.username.clone(),
            status: self.status.clone(),
            minecraft_version: self.minecraft_version.clone(),
            world_name: self.world_name.clone(),
            server_address: self.server_address.clone(),
            game_mode: self.game_mode.clone(),
            session_duration: self.session_duration,
        }
    }
}

impl ToSerialized<PresenceList> for Vec<PresenceView> {
    fn to_serialized(&self) -> PresenceList {
        let sessions: Vec<Presence> = self.iter().map(|view| view.to_serialized()).collect();

        PresenceList {
            count: sessions.len(),
            sessions,
        }
    }
}

impl ToSerialized<PopularVersion> for VersionCount {
    fn to_serialized(&self) -> PopularVersion {
        PopularVersion {
            version: self.version.clone(),
            count: self.count,
        }
    }
}

impl From<i64> for DisconnectResult {
    fn from(duration: i64) -> Self {
        Self { duration }
    }
}
