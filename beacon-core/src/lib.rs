mod clock;
mod config;
mod db;
mod events;
mod fanout;
mod ledger;
mod projection;
mod reaper;
mod sessions;
mod stats;
mod util;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};

pub use clock::*;
pub use config::*;
pub use db::{
    CounterRow, Database, DatabaseError, MemoryDatabase, PersistedState, PgDatabase, PlayerRow,
    PrimaryKey, SessionRow,
};
pub use events::*;
pub use fanout::*;
pub use ledger::*;
pub use projection::*;
pub use reaper::*;
pub use sessions::*;
pub use stats::*;
pub use util::*;

/// The beacon presence system: who is connected right now, who has ever
/// been, and a live feed of every change.
pub struct Beacon {
    context: BeaconContext,
    shutdown: watch::Sender<bool>,
}

/// A type passed to components and background tasks of the system, to
/// access state and emit notifications.
#[derive(Clone)]
pub struct BeaconContext {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub database: Arc<dyn Database>,

    pub sessions: Arc<SessionStore>,
    pub players: Arc<PlayerLedger>,
    pub stats: Arc<Statistics>,
    pub fanout: Arc<Fanout>,
}

impl Beacon {
    /// Wires up the system and restores previously persisted state
    pub async fn new(
        database: Arc<dyn Database>,
        config: Config,
    ) -> std::result::Result<Self, DatabaseError> {
        Self::with_clock(database, config, Arc::new(SystemClock)).await
    }

    /// Same as [Beacon::new], with a caller-supplied clock
    pub async fn with_clock(
        database: Arc<dyn Database>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, DatabaseError> {
        let context = BeaconContext {
            sessions: Arc::new(SessionStore::new(clock.clone(), config.session_ttl)),
            players: Arc::new(PlayerLedger::new()),
            stats: Arc::new(Statistics::new(config.version_window)),
            fanout: Fanout::new(config.observer_buffer),
            database,
            clock,
            config,
        };

        let state = context.database.load_state().await?;
        context.restore(state);

        let (shutdown, _) = watch::channel(false);

        Ok(Self { context, shutdown })
    }

    /// Spawns the background maintenance tasks
    pub fn start(&self) {
        tokio::spawn(run_reaper(self.context.clone(), self.shutdown.subscribe()));
        tokio::spawn(run_flush(self.context.clone(), self.shutdown.subscribe()));
    }

    /// Signals the background tasks to stop after their current iteration,
    /// then writes a final snapshot. Pending observer sends are abandoned.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.context.flush().await {
            error!("Final flush failed: {e}");
        }
    }

    pub fn context(&self) -> BeaconContext {
        self.context.clone()
    }

    pub async fn create_session(&self, new_session: NewSession) -> Result<Session, SessionError> {
        self.context.create_session(new_session).await
    }

    pub fn update_session(
        &self,
        token: &str,
        patch: &SessionPatch,
    ) -> Result<Session, SessionError> {
        self.context.update_session(token, patch)
    }

    pub async fn end_session(&self, token: &str) -> Result<i64, SessionError> {
        self.context.end_session(token).await
    }

    pub fn live_presence(&self) -> Vec<PresenceView> {
        self.context.live_presence()
    }

    pub fn statistics(&self) -> BTreeMap<String, i64> {
        self.context.statistics()
    }

    pub fn popular_versions(&self, limit: usize) -> Vec<VersionCount> {
        self.context.popular_versions(limit)
    }

    pub fn subscribe(&self) -> ObserverHandle {
        self.context.subscribe()
    }
}

impl BeaconContext {
    /// Registers a new session. It only becomes visible once storage has
    /// accepted it, and the launch counters move with it or not at all.
    pub async fn create_session(&self, new_session: NewSession) -> Result<Session, SessionError> {
        if new_session.display_name.trim().is_empty() {
            return Err(SessionError::InvalidField {
                field: "display_name",
            });
        }

        let now = self.clock.now();
        let token = sessions::generate_token();

        // Without a stable identity the token is the identity, which makes
        // every connect a first-time player
        let identity = new_session
            .identity_hint
            .clone()
            .unwrap_or_else(|| token.clone());

        let (player_id, new_player) = self.players.connect(&identity, now);
        let player = self.players.get(player_id).expect("player exists after connect");

        let session = Session {
            token,
            player_id,
            display_name: new_session.display_name,
            status: Session::DEFAULT_STATUS.to_string(),
            minecraft_version: None,
            world_name: None,
            server_address: None,
            game_mode: Session::DEFAULT_GAME_MODE.to_string(),
            privacy: new_session.privacy,
            connected_at: now,
            last_update: now,
        };

        let persisted = self
            .database
            .record_connect(&(&session).into(), &(&player).into(), new_player)
            .await;

        if let Err(e) = persisted {
            if new_player {
                self.players.forget(&identity, player_id);
            }

            return Err(e.into());
        }

        self.sessions.insert(session.clone());
        self.stats.increment(TOTAL_LAUNCHES, 1);

        if new_player {
            self.stats.increment(TOTAL_USERS, 1);
        }

        info!("{} connected as session {}", session.display_name, session.token);
        self.publish(PresenceEvent::PlayerConnected);

        Ok(session)
    }

    /// Applies a sparse patch to a live session. An empty patch is a
    /// heartbeat that only refreshes the TTL.
    pub fn update_session(
        &self,
        token: &str,
        patch: &SessionPatch,
    ) -> Result<Session, SessionError> {
        let updated = self.sessions.patch(token, patch)?;

        // Any update keeps the session's version current in the tally, so
        // the popularity window follows `last_update`
        if let Some(version) = &updated.minecraft_version {
            self.stats.observe_version(token, version, updated.last_update);
        }

        self.publish(PresenceEvent::PlayerUpdated);

        Ok(updated)
    }

    /// Explicit disconnect. Uses the same finalize path the reaper takes.
    pub async fn end_session(&self, token: &str) -> Result<i64, SessionError> {
        let duration = self.finalize_session(token).await?;

        info!("Session {token} disconnected after {duration}s");
        self.publish(PresenceEvent::PlayerDisconnected);

        Ok(duration)
    }

    /// Removes a session and credits its playtime, the path shared by
    /// explicit disconnects and reaper eviction. Emits no notification;
    /// callers decide what the removal means.
    pub(crate) async fn finalize_session(&self, token: &str) -> Result<i64, SessionError> {
        let session = self
            .sessions
            .take(token)
            .ok_or_else(|| SessionError::NotFound {
                token: token.to_string(),
            })?;

        let now = self.clock.now();
        let duration = session.duration_at(now);

        let persisted = self
            .database
            .record_disconnect(token, session.player_id, duration, now)
            .await;

        if let Err(e) = persisted {
            // The session stays live rather than losing its playtime
            self.sessions.restore(session);
            return Err(e.into());
        }

        self.players.record_playtime(session.player_id, duration, now);
        self.stats.increment(TOTAL_PLAYTIME, duration);

        Ok(duration)
    }

    /// The privacy-filtered projection of every live session
    pub fn live_presence(&self) -> Vec<PresenceView> {
        project(&self.sessions.live(), self.clock.now())
    }

    pub fn statistics(&self) -> BTreeMap<String, i64> {
        self.stats.all()
    }

    pub fn popular_versions(&self, limit: usize) -> Vec<VersionCount> {
        self.stats.popular_versions(limit, self.clock.now())
    }

    /// Registers a real-time observer. It immediately receives an `initial`
    /// payload with current state, and unregisters when the handle drops.
    pub fn subscribe(&self) -> ObserverHandle {
        let initial = PresencePayload::new(PresenceEvent::Initial, self.live_presence());
        self.fanout.register(initial)
    }

    /// Projects current state and hands it to every observer
    pub(crate) fn publish(&self, kind: PresenceEvent) {
        let payload = PresencePayload::new(kind, self.live_presence());
        self.fanout.publish(&payload);
    }

    pub(crate) async fn flush(&self) -> std::result::Result<(), DatabaseError> {
        let rows: Vec<SessionRow> = self.sessions.all().iter().map(Into::into).collect();
        self.database.flush_sessions(&rows).await
    }

    fn restore(&self, state: PersistedState) {
        // Sessions already past their TTL on reload are left for the first
        // sweep, which credits their playtime like any other eviction
        for session in &state.sessions {
            if let Some(version) = &session.minecraft_version {
                self.stats
                    .observe_version(&session.token, version, session.last_update);
            }
        }

        self.players.preload(state.players);
        self.sessions.preload(state.sessions);
        self.stats.preload(state.counters);
    }
}

/// Periodically writes mutable session state back to storage
async fn run_flush(context: BeaconContext, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(context.config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately and there is nothing to write yet
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = context.flush().await {
                    warn!("Failed to flush sessions, retrying next interval: {e}");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    use super::*;

    async fn beacon() -> (Arc<Beacon>, Arc<ManualClock>, Arc<MemoryDatabase>) {
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let database = Arc::new(MemoryDatabase::new());

        let beacon = Beacon::with_clock(database.clone(), Config::default(), clock.clone())
            .await
            .expect("beacon initializes");

        (Arc::new(beacon), clock, database)
    }

    fn connect(name: &str, identity: &str) -> NewSession {
        NewSession {
            display_name: name.to_string(),
            identity_hint: Some(identity.to_string()),
            privacy: Privacy::default(),
        }
    }

    #[tokio::test]
    async fn a_full_session_lifecycle() {
        let (beacon, clock, _) = beacon().await;

        let session = beacon
            .create_session(NewSession {
                display_name: "Notch".to_string(),
                identity_hint: Some("uuid-1".to_string()),
                privacy: Privacy {
                    show_server: false,
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        clock.advance(Duration::seconds(90));

        beacon
            .update_session(
                &session.token,
                &SessionPatch {
                    status: Some("playing".to_string()),
                    world_name: Some(Some("Valley".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();

        let views = beacon.live_presence();
        assert_eq!(views.len(), 1);

        let view = &views[0];
        assert_eq!(view.username, "Notch");
        assert_eq!(view.status, "playing");
        assert_eq!(view.world_name.as_deref(), Some("Valley"));
        assert_eq!(view.server_address, None);

        let duration = beacon.end_session(&session.token).await.unwrap();
        assert_eq!(duration, 90);
        assert!(beacon.live_presence().is_empty());

        let stats = beacon.statistics();
        assert_eq!(stats.get(TOTAL_LAUNCHES), Some(&1));
        assert_eq!(stats.get(TOTAL_USERS), Some(&1));
        assert_eq!(stats.get(TOTAL_PLAYTIME), Some(&90));
    }

    #[tokio::test]
    async fn a_fresh_session_has_zero_duration() {
        let (beacon, _, _) = beacon().await;

        beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();

        let views = beacon.live_presence();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].session_duration, 0);
    }

    #[tokio::test]
    async fn blank_display_names_are_rejected() {
        let (beacon, _, _) = beacon().await;

        let result = beacon
            .create_session(NewSession {
                display_name: "   ".to_string(),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(SessionError::InvalidField { .. })));
        assert!(beacon.statistics().is_empty());
    }

    #[tokio::test]
    async fn hintless_connects_are_distinct_players() {
        let (beacon, _, _) = beacon().await;

        for _ in 0..2 {
            beacon
                .create_session(NewSession {
                    display_name: "Drifter".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        assert_eq!(beacon.statistics().get(TOTAL_USERS), Some(&2));
    }

    #[tokio::test]
    async fn a_stable_identity_is_one_player_across_sessions() {
        let (beacon, _, _) = beacon().await;

        let first = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();
        beacon.end_session(&first.token).await.unwrap();
        beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();

        let stats = beacon.statistics();
        assert_eq!(stats.get(TOTAL_LAUNCHES), Some(&2));
        assert_eq!(stats.get(TOTAL_USERS), Some(&1));
    }

    #[tokio::test]
    async fn heartbeats_keep_a_session_alive_through_sweeps() {
        let (beacon, clock, _) = beacon().await;
        let context = beacon.context();

        let session = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();

        clock.advance(Duration::minutes(4));
        let updated = beacon
            .update_session(&session.token, &SessionPatch::default())
            .unwrap();

        assert_eq!(updated.status, Session::DEFAULT_STATUS);
        assert!(updated.last_update >= updated.connected_at);

        clock.advance(Duration::minutes(4));
        sweep(&context).await;
        assert_eq!(beacon.live_presence().len(), 1);

        clock.advance(Duration::minutes(6));
        sweep(&context).await;
        assert!(beacon.live_presence().is_empty());

        // The whole 14 minutes count as playtime, credited exactly once
        assert_eq!(beacon.statistics().get(TOTAL_PLAYTIME), Some(&(14 * 60)));
    }

    #[tokio::test]
    async fn stale_sessions_disappear_before_the_sweep_runs() {
        let (beacon, clock, _) = beacon().await;

        beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();
        clock.advance(Duration::minutes(6));

        assert!(beacon.live_presence().is_empty());
    }

    #[tokio::test]
    async fn a_sweep_broadcasts_a_single_cleanup() {
        let (beacon, clock, _) = beacon().await;
        let context = beacon.context();

        let mut observer = beacon.subscribe();
        assert_eq!(
            observer.next_payload().await.unwrap().kind,
            PresenceEvent::Initial
        );

        beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();
        beacon.create_session(connect("Jeb", "uuid-2")).await.unwrap();
        observer.next_payload().await.unwrap();
        observer.next_payload().await.unwrap();

        clock.advance(Duration::minutes(6));
        sweep(&context).await;

        let cleanup = observer.next_payload().await.unwrap();
        assert_eq!(cleanup.kind, PresenceEvent::Cleanup);
        assert_eq!(cleanup.count, 0);

        // Both evictions were folded into that one notification
        assert!(observer.try_next_payload().is_none());
    }

    #[tokio::test]
    async fn an_empty_sweep_broadcasts_nothing() {
        let (beacon, _, _) = beacon().await;
        let context = beacon.context();

        let mut observer = beacon.subscribe();
        observer.next_payload().await.unwrap();

        sweep(&context).await;

        assert!(observer.try_next_payload().is_none());
    }

    #[tokio::test]
    async fn updating_an_evicted_session_is_not_found() {
        let (beacon, clock, _) = beacon().await;
        let context = beacon.context();

        let session = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();

        clock.advance(Duration::minutes(6));
        sweep(&context).await;

        let result = beacon.update_session(&session.token, &SessionPatch::default());
        assert!(matches!(result, Err(SessionError::NotFound { .. })));
    }

    #[tokio::test]
    async fn a_refused_create_leaves_no_trace() {
        let (beacon, _, database) = beacon().await;

        database.refuse_writes(true);

        let result = beacon.create_session(connect("Notch", "uuid-1")).await;
        assert!(matches!(result, Err(SessionError::Storage(_))));

        assert!(beacon.live_presence().is_empty());
        assert!(beacon.statistics().is_empty());
        assert_eq!(beacon.context().players.count(), 0);
        assert_eq!(database.counter(TOTAL_LAUNCHES), 0);

        database.refuse_writes(false);
        beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();
        assert_eq!(beacon.statistics().get(TOTAL_USERS), Some(&1));
    }

    #[tokio::test]
    async fn a_refused_disconnect_keeps_the_session_alive() {
        let (beacon, _, database) = beacon().await;

        let session = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();

        database.refuse_writes(true);
        let result = beacon.end_session(&session.token).await;
        assert!(matches!(result, Err(SessionError::Storage(_))));

        assert_eq!(beacon.live_presence().len(), 1);
        assert_eq!(beacon.statistics().get(TOTAL_PLAYTIME), None);

        database.refuse_writes(false);
        beacon.end_session(&session.token).await.unwrap();
        assert!(beacon.live_presence().is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_count_every_launch() {
        let (beacon, _, _) = beacon().await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let beacon = beacon.clone();
                tokio::spawn(async move {
                    beacon
                        .create_session(connect("Player", &format!("uuid-{i}")))
                        .await
                        .unwrap()
                        .token
                })
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }

        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 16);

        let stats = beacon.statistics();
        assert_eq!(stats.get(TOTAL_LAUNCHES), Some(&16));
        assert_eq!(stats.get(TOTAL_USERS), Some(&16));
    }

    #[tokio::test]
    async fn concurrent_disjoint_updates_all_apply() {
        let (beacon, _, _) = beacon().await;

        let session = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();

        let patches = [
            SessionPatch {
                status: Some("playing".to_string()),
                ..Default::default()
            },
            SessionPatch {
                minecraft_version: Some(Some("1.20.4".to_string())),
                ..Default::default()
            },
            SessionPatch {
                world_name: Some(Some("Valley".to_string())),
                ..Default::default()
            },
        ];

        let handles: Vec<_> = patches
            .into_iter()
            .map(|patch| {
                let beacon = beacon.clone();
                let token = session.token.clone();
                tokio::spawn(async move { beacon.update_session(&token, &patch).unwrap() })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let current = beacon.context().sessions.get(&session.token).unwrap();
        assert_eq!(current.status, "playing");
        assert_eq!(current.minecraft_version.as_deref(), Some("1.20.4"));
        assert_eq!(current.world_name.as_deref(), Some("Valley"));
    }

    #[tokio::test]
    async fn state_survives_a_restart() {
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let database = Arc::new(MemoryDatabase::new());

        {
            let beacon =
                Beacon::with_clock(database.clone(), Config::default(), clock.clone())
                    .await
                    .unwrap();

            let session = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();
            beacon
                .update_session(
                    &session.token,
                    &SessionPatch {
                        minecraft_version: Some(Some("1.20.4".to_string())),
                        ..Default::default()
                    },
                )
                .unwrap();

            beacon.context().flush().await.unwrap();
        }

        let restarted = Beacon::with_clock(database, Config::default(), clock)
            .await
            .unwrap();

        let views = restarted.live_presence();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].minecraft_version.as_deref(), Some("1.20.4"));

        assert_eq!(restarted.statistics().get(TOTAL_LAUNCHES), Some(&1));
        assert_eq!(restarted.popular_versions(5).len(), 1);
        assert_eq!(restarted.context().players.count(), 1);
    }

    #[tokio::test]
    async fn observers_follow_the_whole_lifecycle() {
        let (beacon, _, _) = beacon().await;

        let mut observer = beacon.subscribe();
        assert_eq!(
            observer.next_payload().await.unwrap().kind,
            PresenceEvent::Initial
        );

        let session = beacon.create_session(connect("Notch", "uuid-1")).await.unwrap();
        let connected = observer.next_payload().await.unwrap();
        assert_eq!(connected.kind, PresenceEvent::PlayerConnected);
        assert_eq!(connected.count, 1);

        beacon
            .update_session(&session.token, &SessionPatch::default())
            .unwrap();
        assert_eq!(
            observer.next_payload().await.unwrap().kind,
            PresenceEvent::PlayerUpdated
        );

        beacon.end_session(&session.token).await.unwrap();
        let disconnected = observer.next_payload().await.unwrap();
        assert_eq!(disconnected.kind, PresenceEvent::PlayerDisconnected);
        assert_eq!(disconnected.count, 0);
    }
}
