mod session;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

pub use session::*;

use crate::{clock::Clock, db::DatabaseError, util::random_string};

/// Length of a session token. 32 alphanumeric characters carry well over 128
/// bits of entropy, so collisions are not a practical concern.
const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Required input was missing or malformed
    #[error("{field} must not be empty")]
    InvalidField { field: &'static str },
    /// The token does not name a live session. A client seeing this after a
    /// long silence simply reconnects with a fresh session.
    #[error("session:{token} doesn't exist")]
    NotFound { token: String },
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

pub(crate) fn generate_token() -> String {
    random_string(TOKEN_LENGTH)
}

/// The authoritative map of live sessions. Owns every session record from
/// creation to finalization; per-session mutations serialize on the map's
/// entry locks and no lock is ever held across I/O.
pub struct SessionStore {
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            clock,
            ttl,
            sessions: Default::default(),
        }
    }

    pub(crate) fn preload(&self, sessions: Vec<Session>) {
        for session in sessions {
            self.sessions.insert(session.token.clone(), session);
        }
    }

    pub(crate) fn insert(&self, session: Session) {
        self.sessions.insert(session.token.clone(), session);
    }

    /// Puts a session back after a failed finalize
    pub(crate) fn restore(&self, session: Session) {
        self.insert(session);
    }

    /// Applies a sparse patch and refreshes `last_update`. An empty patch
    /// refreshes `last_update` and nothing else, which is how heartbeats
    /// work.
    pub fn patch(&self, token: &str, patch: &SessionPatch) -> Result<Session, SessionError> {
        let mut entry = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| SessionError::NotFound {
                token: token.to_string(),
            })?;

        entry.apply(patch);
        entry.last_update = self.clock.now();

        Ok(entry.clone())
    }

    /// Removes and returns a session, claiming it for finalization.
    pub(crate) fn take(&self, token: &str) -> Option<Session> {
        self.sessions.remove(token).map(|(_, session)| session)
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|entry| entry.clone())
    }

    /// Every session still inside the TTL window. Each returned record is a
    /// consistent copy taken under its entry lock.
    pub fn live(&self) -> Vec<Session> {
        let now = self.clock.now();

        self.sessions
            .iter()
            .filter(|entry| !self.is_stale(entry.value(), now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Everything, stale included. Used when flushing to storage.
    pub(crate) fn all(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Tokens of sessions past their TTL as of now
    pub fn stale_tokens(&self) -> Vec<String> {
        let now = self.clock.now();

        self.sessions
            .iter()
            .filter(|entry| self.is_stale(entry.value(), now))
            .map(|entry| entry.token.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_stale(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_update > self.ttl
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));

        let store = SessionStore::new(clock.clone(), Duration::minutes(5));
        (store, clock)
    }

    fn session(store: &SessionStore, token: &str) -> Session {
        let now = store.clock.now();

        Session {
            token: token.to_string(),
            player_id: 1,
            display_name: "Notch".to_string(),
            status: Session::DEFAULT_STATUS.to_string(),
            minecraft_version: None,
            world_name: None,
            server_address: None,
            game_mode: Session::DEFAULT_GAME_MODE.to_string(),
            privacy: Privacy::default(),
            connected_at: now,
            last_update: now,
        }
    }

    #[test]
    fn patch_applies_fields_independently() {
        let (store, _) = store_with_clock();
        store.insert(session(&store, "a"));

        let patch = SessionPatch {
            status: Some("playing".to_string()),
            world_name: Some(Some("Valley".to_string())),
            ..Default::default()
        };

        let updated = store.patch("a", &patch).expect("session exists");

        assert_eq!(updated.status, "playing");
        assert_eq!(updated.world_name.as_deref(), Some("Valley"));
        assert_eq!(updated.game_mode, Session::DEFAULT_GAME_MODE);
        assert_eq!(updated.minecraft_version, None);
    }

    #[test]
    fn empty_patch_only_refreshes_last_update() {
        let (store, clock) = store_with_clock();
        store.insert(session(&store, "a"));

        clock.advance(Duration::seconds(30));
        let updated = store.patch("a", &SessionPatch::default()).unwrap();

        assert_eq!(updated.status, Session::DEFAULT_STATUS);
        assert_eq!(updated.world_name, None);
        assert_eq!(updated.last_update - updated.connected_at, Duration::seconds(30));
        assert!(updated.last_update >= updated.connected_at);
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let (store, _) = store_with_clock();

        let mut existing = session(&store, "a");
        existing.server_address = Some("mc.example.net".to_string());
        store.insert(existing);

        let patch = SessionPatch {
            server_address: Some(None),
            ..Default::default()
        };

        let updated = store.patch("a", &patch).unwrap();
        assert_eq!(updated.server_address, None);
    }

    #[test]
    fn unknown_token_is_not_found() {
        let (store, _) = store_with_clock();

        let result = store.patch("missing", &SessionPatch::default());
        assert!(matches!(result, Err(SessionError::NotFound { .. })));
    }

    #[test]
    fn stale_sessions_leave_the_live_view() {
        let (store, clock) = store_with_clock();
        store.insert(session(&store, "old"));

        clock.advance(Duration::minutes(6));
        store.insert(session(&store, "fresh"));

        let live: Vec<_> = store.live().into_iter().map(|s| s.token).collect();
        assert_eq!(live, vec!["fresh".to_string()]);

        assert_eq!(store.stale_tokens(), vec!["old".to_string()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn take_claims_a_session_exactly_once() {
        let (store, _) = store_with_clock();
        store.insert(session(&store, "a"));

        assert!(store.take("a").is_some());
        assert!(store.take("a").is_none());
    }
}
