use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{Database, DatabaseError, PersistedState, PlayerRow, PrimaryKey, Result, SessionRow};
use crate::stats::{TOTAL_LAUNCHES, TOTAL_PLAYTIME, TOTAL_USERS};

/// An in-memory storage backend. It holds the same state a postgres
/// database would, which makes it useful for tests and database-less runs.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
    refuse_writes: AtomicBool,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<String, SessionRow>,
    players: HashMap<PrimaryKey, PlayerRow>,
    counters: BTreeMap<String, i64>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every following write fail, simulating an unavailable backend
    pub fn refuse_writes(&self, refuse: bool) {
        self.refuse_writes.store(refuse, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn counter(&self, metric: &str) -> i64 {
        self.state
            .lock()
            .counters
            .get(metric)
            .copied()
            .unwrap_or(0)
    }

    fn writable(&self) -> Result<()> {
        if self.refuse_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Internal("storage is refusing writes".into()));
        }

        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn load_state(&self) -> Result<PersistedState> {
        let state = self.state.lock();

        Ok(PersistedState {
            sessions: state.sessions.values().cloned().map(Into::into).collect(),
            players: state.players.values().cloned().map(Into::into).collect(),
            counters: state.counters.clone(),
        })
    }

    async fn record_connect(
        &self,
        session: &SessionRow,
        player: &PlayerRow,
        new_player: bool,
    ) -> Result<()> {
        self.writable()?;

        let mut state = self.state.lock();

        state
            .players
            .entry(player.id)
            .and_modify(|existing| existing.last_seen = player.last_seen)
            .or_insert_with(|| player.clone());

        state
            .sessions
            .insert(session.token.clone(), session.clone());

        *state.counters.entry(TOTAL_LAUNCHES.to_string()).or_default() += 1;

        if new_player {
            *state.counters.entry(TOTAL_USERS.to_string()).or_default() += 1;
        }

        Ok(())
    }

    async fn record_disconnect(
        &self,
        token: &str,
        player_id: PrimaryKey,
        playtime: i64,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        self.writable()?;

        let mut state = self.state.lock();

        state.sessions.remove(token);

        if let Some(player) = state.players.get_mut(&player_id) {
            player.total_playtime += playtime;
            player.last_seen = last_seen;
        }

        *state.counters.entry(TOTAL_PLAYTIME.to_string()).or_default() += playtime;

        Ok(())
    }

    async fn flush_sessions(&self, sessions: &[SessionRow]) -> Result<()> {
        self.writable()?;

        let mut state = self.state.lock();

        for session in sessions {
            state
                .sessions
                .insert(session.token.clone(), session.clone());
        }

        Ok(())
    }
}
