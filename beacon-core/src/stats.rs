use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Incremented once per session created
pub const TOTAL_LAUNCHES: &str = "total_launches";
/// Incremented once per newly created player
pub const TOTAL_USERS: &str = "total_users";
/// Accumulated seconds across all finalized sessions
pub const TOTAL_PLAYTIME: &str = "total_playtime";

/// A version and how many sessions reported it recently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCount {
    pub version: String,
    pub count: i64,
}

#[derive(Debug)]
struct VersionSighting {
    version: String,
    seen_at: DateTime<Utc>,
}

/// Lifetime counters plus the rolling version tally behind version
/// popularity. Counter increments are atomic and nothing here ever decreases
/// one.
pub struct Statistics {
    counters: DashMap<String, AtomicI64>,
    /// The version each session last reported. Sightings outlive the session
    /// itself and only age out of the window, so recently ended sessions
    /// still count.
    sightings: DashMap<String, VersionSighting>,
    window: chrono::Duration,
}

impl Statistics {
    pub fn new(window: chrono::Duration) -> Self {
        Self {
            counters: Default::default(),
            sightings: Default::default(),
            window,
        }
    }

    pub(crate) fn preload(&self, counters: BTreeMap<String, i64>) {
        for (metric, value) in counters {
            self.counters.insert(metric, AtomicI64::new(value));
        }
    }

    pub fn increment(&self, metric: &str, delta: i64) {
        self.counters
            .entry(metric.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn value(&self, metric: &str) -> i64 {
        self.counters
            .get(metric)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn all(&self) -> BTreeMap<String, i64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.load(Ordering::Relaxed)))
            .collect()
    }

    /// Notes the version a session reported. A session counts once; a later
    /// report replaces the earlier one.
    pub fn observe_version(&self, token: &str, version: &str, seen_at: DateTime<Utc>) {
        self.sightings.insert(
            token.to_string(),
            VersionSighting {
                version: version.to_string(),
                seen_at,
            },
        );
    }

    /// Drops sightings that have aged out of the window
    pub(crate) fn prune_versions(&self, now: DateTime<Utc>) {
        self.sightings
            .retain(|_, sighting| now - sighting.seen_at <= self.window);
    }

    /// The most reported versions inside the window, descending by count,
    /// ties broken by version string.
    pub fn popular_versions(&self, limit: usize, now: DateTime<Utc>) -> Vec<VersionCount> {
        let mut tally: HashMap<String, i64> = HashMap::new();

        for entry in self.sightings.iter() {
            if now - entry.seen_at <= self.window {
                *tally.entry(entry.version.clone()).or_default() += 1;
            }
        }

        let mut counts: Vec<VersionCount> = tally
            .into_iter()
            .map(|(version, count)| VersionCount { version, count })
            .collect();

        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.version.cmp(&b.version)));
        counts.truncate(limit);

        counts
    }
}
