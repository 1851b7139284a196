use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counters for one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStats {
    /// Identifier of the call these counters belong to
    pub call_id: Uuid,

    /// When connect() started the call
    pub started_at: DateTime<Utc>,

    /// Captured frames handed to the transport
    pub frames_sent: u64,

    /// Captured frames the transport could not take (queue full or writer gone)
    pub frames_dropped: u64,

    /// Agent audio chunks scheduled for playback
    pub chunks_played: u64,

    /// Agent audio chunks dropped as undecodable
    pub chunks_dropped: u64,

    /// Barge-ins signalled by the agent
    pub interruptions: u64,

    /// Turns completed
    pub turns: u64,
}

impl CallStats {
    pub fn new(call_id: Uuid) -> Self {
        Self {
            call_id,
            started_at: Utc::now(),
            frames_sent: 0,
            frames_dropped: 0,
            chunks_played: 0,
            chunks_dropped: 0,
            interruptions: 0,
            turns: 0,
        }
    }
}
