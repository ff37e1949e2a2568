use std::time::Duration;

/// The configuration of the presence system
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a session may go without any update before it counts as stale
    pub session_ttl: chrono::Duration,
    /// How often the reaper sweeps the session table for stale sessions
    pub reap_interval: Duration,
    /// How often mutable session state is written back to storage
    pub flush_interval: Duration,
    /// How many undelivered notifications an observer may accumulate before
    /// it is evicted
    pub observer_buffer: usize,
    /// How far back a reported version still counts towards popularity
    pub version_window: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Five minutes of silence means the client is gone
            session_ttl: chrono::Duration::minutes(5),
            reap_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(30),
            observer_buffer: 64,
            version_window: chrono::Duration::hours(24),
        }
    }
}
