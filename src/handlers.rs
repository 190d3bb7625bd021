use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket},
        ConnectInfo, Path, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::admission;
use crate::broadcast::Broadcaster;
use crate::error::AppError;
use crate::identity;
use crate::models::{CreatePollRequest, PollSnapshot, VoteRequest};
use crate::store::{PgPollStore, PollStore};

pub struct AppState {
    pub store: PgPollStore,
    pub broadcaster: Broadcaster,
}

/// Create a poll with its options. Returns the zero-vote snapshot.
pub async fn create_poll(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PollSnapshot>), AppError> {
    let Json(payload) = payload?;
    let (question, options, expires_at) = validate_new_poll(payload, Utc::now())?;
    let snapshot = state.store.create_poll(&question, &options, expires_at).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Current snapshot of a poll.
pub async fn get_poll(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<Uuid>,
) -> Result<Json<PollSnapshot>, AppError> {
    let snapshot = state.store.snapshot(poll_id).await?;
    Ok(Json(snapshot))
}

/// Submit a vote for an option of a poll.
pub async fn vote(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<Uuid>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(payload) = payload?;
    let voter = identity::resolve(&headers, Some(peer), payload.fingerprint);

    let snapshot = admission::submit_vote(
        &state.store,
        &state.broadcaster,
        poll_id,
        payload.option_id,
        &voter,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({ "success": true, "poll": snapshot })))
}

/// WebSocket subscription to a poll's live tally. Sends the current
/// snapshot on connect, then a full snapshot after every accepted vote.
pub async fn live(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    // Subscribe before reading the snapshot so a vote landing in between
    // is not missed; the viewer may then see the same tally twice, which
    // full-snapshot replacement makes harmless.
    let rx = state.broadcaster.subscribe(poll_id);
    let initial = match state.store.snapshot(poll_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            drop(rx);
            state.broadcaster.prune(poll_id);
            return Err(e);
        }
    };

    Ok(ws.on_upgrade(move |socket| async move {
        viewer_loop(socket, initial, rx).await;
        // The receiver is gone once the loop returns; drop the channel if
        // this was the poll's last viewer.
        state.broadcaster.prune(poll_id);
    }))
}

async fn viewer_loop(
    socket: WebSocket,
    initial: PollSnapshot,
    mut rx: broadcast::Receiver<PollSnapshot>,
) {
    let (mut sender, mut receiver) = socket.split();

    if send_snapshot(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(snapshot) => {
                    if send_snapshot(&mut sender, &snapshot).await.is_err() {
                        debug!("viewer went away");
                        return;
                    }
                }
                // Snapshots are full replacements; skipping lagged ones
                // only means the viewer jumps straight to a newer tally.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "viewer lagged, dropping stale snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = receiver.next() => match incoming {
                // Viewers only listen; ignore anything they send.
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
        }
    }
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &PollSnapshot,
) -> Result<(), axum::Error> {
    match serde_json::to_string(snapshot) {
        Ok(payload) => sender.send(Message::Text(payload.into())).await,
        Err(e) => {
            warn!("failed to serialize snapshot: {e}");
            Ok(())
        }
    }
}

/// Checks a creation request: non-blank question, at least two non-blank
/// options (blank entries are dropped, positions follow submitted order),
/// and an optional positive expiry in seconds.
fn validate_new_poll(
    payload: CreatePollRequest,
    now: DateTime<Utc>,
) -> Result<(String, Vec<String>, Option<DateTime<Utc>>), AppError> {
    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return Err(AppError::Validation("Question is required".to_string()));
    }

    let options: Vec<String> = payload
        .options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if options.len() < 2 {
        return Err(AppError::Validation(
            "At least 2 valid options are required".to_string(),
        ));
    }

    let expires_at = match payload.expires_in.filter(|&secs| secs > 0) {
        None => None,
        Some(secs) => {
            // Checked all the way through: a huge value must come back as
            // a validation error, not wrap into the past or panic.
            let at = i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|delta| now.checked_add_signed(delta));
            match at {
                Some(at) => Some(at),
                None => {
                    return Err(AppError::Validation(
                        "Expiration is too far in the future".to_string(),
                    ))
                }
            }
        }
    };

    Ok((question, options, expires_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(question: &str, options: &[&str], expires_in: Option<u64>) -> CreatePollRequest {
        CreatePollRequest {
            question: question.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            expires_in,
        }
    }

    #[test]
    fn blank_question_is_rejected() {
        let err = validate_new_poll(request("   ", &["A", "B"], None), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn blank_options_are_dropped_before_counting() {
        let err =
            validate_new_poll(request("Q?", &["A", "  ", ""], None), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn options_keep_submitted_order() {
        let (_, options, _) =
            validate_new_poll(request("Q?", &["B", " ", "A"], None), Utc::now()).unwrap();
        assert_eq!(options, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn expiry_is_relative_to_now() {
        let now = Utc::now();
        let (_, _, expires_at) =
            validate_new_poll(request("Q?", &["A", "B"], Some(60)), now).unwrap();
        assert_eq!(expires_at, Some(now + Duration::seconds(60)));
    }

    #[test]
    fn oversized_expiry_is_rejected_not_wrapped() {
        for secs in [u64::MAX, u64::MAX / 2, i64::MAX as u64] {
            let err = validate_new_poll(request("Q?", &["A", "B"], Some(secs)), Utc::now())
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "secs = {secs}");
        }
    }

    #[test]
    fn zero_expiry_means_no_expiration() {
        let (_, _, expires_at) =
            validate_new_poll(request("Q?", &["A", "B"], Some(0)), Utc::now()).unwrap();
        assert_eq!(expires_at, None);
    }
}
