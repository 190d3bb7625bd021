use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::VoterIdentity;
use crate::models::{OptionTally, Poll, PollOption, PollSnapshot, Vote};

/// Storage surface required by the vote admission path. Kept behind a trait
/// so the admission logic can be exercised against an in-memory store.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn poll(&self, poll_id: Uuid) -> Result<Option<Poll>, AppError>;

    /// Resolves an option by id scoped to its poll; `None` covers both an
    /// unknown option and an option belonging to a different poll.
    async fn option_in_poll(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
    ) -> Result<Option<PollOption>, AppError>;

    async fn has_vote_by_ip(&self, poll_id: Uuid, ip: &str) -> Result<bool, AppError>;

    async fn has_vote_by_fingerprint(
        &self,
        poll_id: Uuid,
        fingerprint: &str,
    ) -> Result<bool, AppError>;

    /// Records an accepted vote and returns the durable row. A
    /// uniqueness-constraint violation on either identity signal surfaces
    /// as [`AppError::DuplicateVote`], which closes the race between two
    /// submissions passing the pre-check together.
    async fn insert_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        identity: &VoterIdentity,
    ) -> Result<Vote, AppError>;

    /// Computes the authoritative tally from the vote rows at call time.
    async fn snapshot(&self, poll_id: Uuid) -> Result<PollSnapshot, AppError>;
}

#[derive(Clone)]
pub struct PgPollStore {
    pool: PgPool,
}

impl PgPollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a poll and its options in one transaction; either everything
    /// lands or nothing does. Returns the zero-vote snapshot.
    pub async fn create_poll(
        &self,
        question: &str,
        options: &[String],
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<PollSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        let poll: Poll = sqlx::query_as(
            "INSERT INTO polls (question, expires_at) VALUES ($1, $2) \
             RETURNING id, question, created_at, expires_at",
        )
        .bind(question)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let mut tallies = Vec::with_capacity(options.len());
        for (position, text) in options.iter().enumerate() {
            let option: PollOption = sqlx::query_as(
                "INSERT INTO poll_options (poll_id, text, position) VALUES ($1, $2, $3) \
                 RETURNING id, poll_id, text, position",
            )
            .bind(poll.id)
            .bind(text)
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await?;

            tallies.push(OptionTally {
                id: option.id,
                text: option.text,
                position: option.position,
                votes: 0,
            });
        }

        tx.commit().await?;

        Ok(PollSnapshot {
            id: poll.id,
            question: poll.question,
            created_at: poll.created_at,
            expires_at: poll.expires_at,
            total_votes: 0,
            options: tallies,
        })
    }
}

#[async_trait]
impl PollStore for PgPollStore {
    async fn poll(&self, poll_id: Uuid) -> Result<Option<Poll>, AppError> {
        let poll = sqlx::query_as(
            "SELECT id, question, created_at, expires_at FROM polls WHERE id = $1",
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(poll)
    }

    async fn option_in_poll(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
    ) -> Result<Option<PollOption>, AppError> {
        let option = sqlx::query_as(
            "SELECT id, poll_id, text, position FROM poll_options \
             WHERE id = $1 AND poll_id = $2",
        )
        .bind(option_id)
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(option)
    }

    async fn has_vote_by_ip(&self, poll_id: Uuid, ip: &str) -> Result<bool, AppError> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM votes WHERE poll_id = $1 AND ip_address = $2",
        )
        .bind(poll_id)
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;
        Ok(existing.is_some())
    }

    async fn has_vote_by_fingerprint(
        &self,
        poll_id: Uuid,
        fingerprint: &str,
    ) -> Result<bool, AppError> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM votes WHERE poll_id = $1 AND fingerprint = $2",
        )
        .bind(poll_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(existing.is_some())
    }

    async fn insert_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        identity: &VoterIdentity,
    ) -> Result<Vote, AppError> {
        let vote: Vote = sqlx::query_as(
            "INSERT INTO votes (poll_id, option_id, ip_address, fingerprint, user_agent) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, poll_id, option_id, ip_address, fingerprint, user_agent, created_at",
        )
        .bind(poll_id)
        .bind(option_id)
        .bind(identity.ip_address.as_deref())
        .bind(identity.fingerprint.as_deref())
        .bind(identity.user_agent.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateVote,
            _ => AppError::Storage(e),
        })?;
        Ok(vote)
    }

    async fn snapshot(&self, poll_id: Uuid) -> Result<PollSnapshot, AppError> {
        let poll = self.poll(poll_id).await?.ok_or(AppError::NotFound)?;

        let options: Vec<OptionTally> = sqlx::query_as(
            "SELECT o.id, o.text, o.position, COUNT(v.id) AS votes \
             FROM poll_options o \
             LEFT JOIN votes v ON v.option_id = o.id \
             WHERE o.poll_id = $1 \
             GROUP BY o.id, o.text, o.position \
             ORDER BY o.position ASC",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        let total_votes = options.iter().map(|o| o.votes).sum();

        Ok(PollSnapshot {
            id: poll.id,
            question: poll.question,
            created_at: poll.created_at,
            expires_at: poll.expires_at,
            total_votes,
            options,
        })
    }
}
