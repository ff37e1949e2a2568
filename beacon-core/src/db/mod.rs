use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The backing store is unavailable or a write failed
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A schema migration could not be applied
    #[error("schema migration {version} failed: {reason}")]
    Migration { version: i32, reason: String },
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        Self::Internal(Box::new(error))
    }
}

/// Represents a type that can durably hold beacon state.
///
/// Every mutating method is one transactional unit: it either applies
/// completely or leaves storage untouched, so a failed call never leaves a
/// session without its counters or the other way around.
#[async_trait]
pub trait Database: Send + Sync {
    /// Loads everything persisted by a previous run
    async fn load_state(&self) -> Result<PersistedState>;

    /// Persists a new session together with its player record and the
    /// launch counters
    async fn record_connect(
        &self,
        session: &SessionRow,
        player: &PlayerRow,
        new_player: bool,
    ) -> Result<()>;

    /// Removes a finalized session and credits its playtime to the player
    /// and the playtime counter
    async fn record_disconnect(
        &self,
        token: &str,
        player_id: PrimaryKey,
        playtime: i64,
        last_seen: DateTime<Utc>,
    ) -> Result<()>;

    /// Writes the mutable fields of every given session back to storage
    async fn flush_sessions(&self, sessions: &[SessionRow]) -> Result<()>;
}
