use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;

use crate::db::PrimaryKey;

/// The lifetime record of one player identity, accumulated across all of
/// their sessions.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PrimaryKey,
    /// The key this record was found or created under
    pub identity_key: String,
    /// Accumulated seconds across all finalized sessions. Never decreases.
    pub total_playtime: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Cross-session player records, keyed by identity. A record is created on
/// first connect and updated on every connect and disconnect after that,
/// never deleted.
pub struct PlayerLedger {
    by_identity: DashMap<String, PrimaryKey>,
    players: DashMap<PrimaryKey, Player>,
    next_id: AtomicCell<PrimaryKey>,
}

impl PlayerLedger {
    pub fn new() -> Self {
        Self {
            by_identity: Default::default(),
            players: Default::default(),
            next_id: AtomicCell::new(1),
        }
    }

    pub(crate) fn preload(&self, players: Vec<Player>) {
        let mut highest = 0;

        for player in players {
            highest = highest.max(player.id);

            self.by_identity
                .insert(player.identity_key.clone(), player.id);
            self.players.insert(player.id, player);
        }

        self.next_id.store(highest + 1);
    }

    /// Whether a connect under this identity would find an existing player
    pub fn is_known(&self, identity_key: &str) -> bool {
        self.by_identity.contains_key(identity_key)
    }

    /// Finds or creates the player behind an identity, returning the id and
    /// whether the record was newly created. Concurrent connects under the
    /// same identity resolve to the same record.
    pub fn connect(&self, identity_key: &str, now: DateTime<Utc>) -> (PrimaryKey, bool) {
        let mut created = false;

        let id = *self
            .by_identity
            .entry(identity_key.to_string())
            .or_insert_with(|| {
                created = true;
                let id = self.next_id.fetch_add(1);

                self.players.insert(
                    id,
                    Player {
                        id,
                        identity_key: identity_key.to_string(),
                        total_playtime: 0,
                        first_seen: now,
                        last_seen: now,
                    },
                );

                id
            });

        if !created {
            if let Some(mut player) = self.players.get_mut(&id) {
                player.last_seen = now;
            }
        }

        (id, created)
    }

    /// Undoes a [PlayerLedger::connect] that created a record, after storage
    /// refused the session it belonged to.
    pub(crate) fn forget(&self, identity_key: &str, id: PrimaryKey) {
        self.by_identity.remove(identity_key);
        self.players.remove(&id);
    }

    /// Credits playtime from a finalized session to its player
    pub fn record_playtime(&self, id: PrimaryKey, seconds: i64, now: DateTime<Utc>) {
        if let Some(mut player) = self.players.get_mut(&id) {
            player.total_playtime += seconds.max(0);
            player.last_seen = now;
        }
    }

    pub fn get(&self, id: PrimaryKey) -> Option<Player> {
        self.players.get(&id).map(|entry| entry.clone())
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }
}

impl Default for PlayerLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn connect_creates_once_per_identity() {
        let ledger = PlayerLedger::new();

        let (first, created) = ledger.connect("uuid-1", noon());
        assert!(created);

        let (second, created) = ledger.connect("uuid-1", noon() + Duration::hours(1));
        assert!(!created);
        assert_eq!(first, second);

        let player = ledger.get(first).unwrap();
        assert_eq!(player.first_seen, noon());
        assert_eq!(player.last_seen, noon() + Duration::hours(1));
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn distinct_identities_get_distinct_players() {
        let ledger = PlayerLedger::new();

        let (a, _) = ledger.connect("uuid-1", noon());
        let (b, _) = ledger.connect("uuid-2", noon());

        assert_ne!(a, b);
        assert_eq!(ledger.count(), 2);
    }

    #[test]
    fn playtime_accumulates() {
        let ledger = PlayerLedger::new();
        let (id, _) = ledger.connect("uuid-1", noon());

        ledger.record_playtime(id, 120, noon() + Duration::minutes(2));
        ledger.record_playtime(id, 300, noon() + Duration::minutes(10));

        assert_eq!(ledger.get(id).unwrap().total_playtime, 420);
    }

    #[test]
    fn negative_playtime_is_ignored() {
        let ledger = PlayerLedger::new();
        let (id, _) = ledger.connect("uuid-1", noon());

        ledger.record_playtime(id, -5, noon());

        assert_eq!(ledger.get(id).unwrap().total_playtime, 0);
    }

    #[test]
    fn preload_continues_id_assignment() {
        let ledger = PlayerLedger::new();

        ledger.preload(vec![Player {
            id: 7,
            identity_key: "uuid-7".to_string(),
            total_playtime: 100,
            first_seen: noon(),
            last_seen: noon(),
        }]);

        let (existing, created) = ledger.connect("uuid-7", noon());
        assert!(!created);
        assert_eq!(existing, 7);

        let (fresh, created) = ledger.connect("uuid-8", noon());
        assert!(created);
        assert_eq!(fresh, 8);
    }
}
