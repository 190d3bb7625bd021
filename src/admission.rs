use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::error::AppError;
use crate::identity::VoterIdentity;
use crate::models::PollSnapshot;
use crate::store::PollStore;

/// Expiration gate. A poll with no expiration is always open; otherwise it
/// closes the instant `now` reaches `expires_at`.
pub fn is_open(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        None => true,
        Some(at) => now < at,
    }
}

/// Admits a vote: option lookup, expiration gate, duplicate pre-checks,
/// durable insert, fresh tally, fan-out.
///
/// The pre-checks and the insert are a check-then-act sequence, so two
/// concurrent submissions from the same identity can both pass the
/// pre-check. The store's uniqueness constraints resolve that race: the
/// second insert fails and is reported as [`AppError::DuplicateVote`], the
/// same outcome as a pre-check hit. No failure path leaves a vote row or a
/// published snapshot behind; a retry of an already-committed vote is
/// absorbed the same way.
pub async fn submit_vote<S: PollStore + ?Sized>(
    store: &S,
    broadcaster: &Broadcaster,
    poll_id: Uuid,
    option_id: Uuid,
    identity: &VoterIdentity,
    now: DateTime<Utc>,
) -> Result<PollSnapshot, AppError> {
    let option = store
        .option_in_poll(poll_id, option_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let poll = store.poll(poll_id).await?.ok_or(AppError::NotFound)?;
    if !is_open(poll.expires_at, now) {
        return Err(AppError::PollClosed);
    }

    if let Some(ip) = &identity.ip_address {
        if store.has_vote_by_ip(poll_id, ip).await? {
            return Err(AppError::DuplicateVote);
        }
    }
    if let Some(fingerprint) = &identity.fingerprint {
        if store.has_vote_by_fingerprint(poll_id, fingerprint).await? {
            return Err(AppError::DuplicateVote);
        }
    }

    let vote = store.insert_vote(poll_id, option.id, identity).await?;
    debug!(vote_id = %vote.id, %poll_id, option_id = %option.id, "vote recorded");

    let snapshot = store.snapshot(poll_id).await?;
    broadcaster.publish(poll_id, snapshot.clone());

    Ok(snapshot)
}
