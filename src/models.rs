use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub text: String,
    pub position: i32,
}

/// An accepted vote. Append-only; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub ip_address: Option<String>,
    pub fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-option tally inside a [`PollSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OptionTally {
    pub id: Uuid,
    pub text: String,
    pub position: i32,
    pub votes: i64,
}

/// The current tally view of a poll, recomputed from the vote rows on every
/// read. Subscribers treat each snapshot as a complete replacement of their
/// local state, never as a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub id: Uuid,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub total_votes: i64,
    pub options: Vec<OptionTally>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    /// Seconds from now until the poll closes. Absent means the poll never
    /// expires.
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option_id: Uuid,
    pub fingerprint: Option<String>,
}
