use std::sync::Arc;

use serde::Serialize;

use crate::projection::PresenceView;

/// What happened to presence state. The serialized names are part of the
/// wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEvent {
    /// Sent once to a newly registered observer, carrying current state
    Initial,
    PlayerConnected,
    PlayerUpdated,
    PlayerDisconnected,
    /// The reaper evicted one or more stale sessions
    Cleanup,
}

/// One immutable notification. The same payload is shared with every
/// observer, so the view snapshot sits behind an [Arc].
#[derive(Debug, Clone, Serialize)]
pub struct PresencePayload {
    pub kind: PresenceEvent,
    pub sessions: Arc<Vec<PresenceView>>,
    pub count: usize,
}

impl PresencePayload {
    pub fn new(kind: PresenceEvent, sessions: Vec<PresenceView>) -> Self {
        Self {
            kind,
            count: sessions.len(),
            sessions: Arc::new(sessions),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds_serialize_to_their_wire_names() {
        let names: Vec<_> = [
            PresenceEvent::Initial,
            PresenceEvent::PlayerConnected,
            PresenceEvent::PlayerUpdated,
            PresenceEvent::PlayerDisconnected,
            PresenceEvent::Cleanup,
        ]
        .iter()
        .map(|kind| serde_json::to_string(kind).unwrap())
        .collect();

        assert_eq!(
            names,
            vec![
                "\"initial\"",
                "\"player_connected\"",
                "\"player_updated\"",
                "\"player_disconnected\"",
                "\"cleanup\"",
            ]
        );
    }

    #[test]
    fn payload_counts_its_sessions() {
        let payload = PresencePayload::new(PresenceEvent::Cleanup, vec![]);

        assert_eq!(payload.count, 0);
        assert!(payload.sessions.is_empty());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "cleanup");
        assert_eq!(json["count"], 0);
    }
}
