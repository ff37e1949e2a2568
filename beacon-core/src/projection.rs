use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sessions::Session;

/// Username shown for sessions that hide their identity
const ANONYMOUS: &str = "Anonymous";
/// Placeholder for a server address that is set but hidden
const HIDDEN_SERVER: &str = "Hidden Server";

/// The privacy-filtered view of a session. This is the only shape observers
/// and the presence list ever see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub username: String,
    pub status: String,
    pub minecraft_version: Option<String>,
    pub world_name: Option<String>,
    pub server_address: Option<String>,
    pub game_mode: String,
    /// Seconds since the session connected, recomputed at projection time
    pub session_duration: i64,
}

/// Projects sessions into their public views, most recently connected first.
/// Equal timestamps fall back to token order so the result is deterministic.
pub fn project(sessions: &[Session], now: DateTime<Utc>) -> Vec<PresenceView> {
    let mut ordered: Vec<&Session> = sessions.iter().collect();

    ordered.sort_by(|a, b| {
        b.connected_at
            .cmp(&a.connected_at)
            .then_with(|| a.token.cmp(&b.token))
    });

    ordered
        .into_iter()
        .map(|session| view_of(session, now))
        .collect()
}

fn view_of(session: &Session, now: DateTime<Utc>) -> PresenceView {
    let privacy = session.privacy;

    let username = if privacy.show_username {
        session.display_name.clone()
    } else {
        ANONYMOUS.to_string()
    };

    // A hidden address is acknowledged with a placeholder, but only if one
    // is actually set
    let server_address = if privacy.show_server {
        session.server_address.clone()
    } else {
        session
            .server_address
            .as_ref()
            .map(|_| HIDDEN_SERVER.to_string())
    };

    PresenceView {
        username,
        status: session.status.clone(),
        minecraft_version: privacy
            .show_version
            .then(|| session.minecraft_version.clone())
            .flatten(),
        world_name: privacy
            .show_world
            .then(|| session.world_name.clone())
            .flatten(),
        server_address,
        game_mode: session.game_mode.clone(),
        session_duration: session.duration_at(now),
    }
}
