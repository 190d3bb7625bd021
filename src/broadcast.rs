use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::PollSnapshot;

/// Capacity of each per-poll channel. A lagged receiver loses the oldest
/// snapshots, which is safe: every message is a complete replacement of the
/// subscriber's state, so only the newest one matters.
const CHANNEL_CAPACITY: usize = 64;

/// Fan-out registry keyed by poll id. One broadcast channel per poll with
/// live viewers; channels are created on first subscribe and pruned once
/// the last receiver is gone.
#[derive(Default)]
pub struct Broadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<PollSnapshot>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a snapshot to every live viewer of the poll. Fire and
    /// forget: a poll with no viewers is a no-op, and delivery problems
    /// never propagate to the vote that triggered the publish.
    pub fn publish(&self, poll_id: Uuid, snapshot: PollSnapshot) {
        let sender = {
            let channels = self.channels.read().expect("broadcaster lock poisoned");
            channels.get(&poll_id).cloned()
        };

        let Some(sender) = sender else {
            debug!(%poll_id, "no live viewers, skipping publish");
            return;
        };

        if sender.send(snapshot).is_err() {
            // All receivers dropped since the channel was created.
            debug!(%poll_id, "viewers gone, pruning channel");
            self.prune(poll_id);
        }
    }

    /// Drops the poll's channel if it has no live receivers left.
    pub fn prune(&self, poll_id: Uuid) {
        let mut channels = self.channels.write().expect("broadcaster lock poisoned");
        if channels
            .get(&poll_id)
            .is_some_and(|s| s.receiver_count() == 0)
        {
            channels.remove(&poll_id);
        }
    }

    /// Subscribes to a poll's channel, creating it if this is the first
    /// viewer.
    pub fn subscribe(&self, poll_id: Uuid) -> broadcast::Receiver<PollSnapshot> {
        let mut channels = self.channels.write().expect("broadcaster lock poisoned");
        channels
            .entry(poll_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(total: i64) -> PollSnapshot {
        PollSnapshot {
            id: Uuid::new_v4(),
            question: "favorite color?".to_string(),
            created_at: Utc::now(),
            expires_at: None,
            total_votes: total,
            options: vec![],
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(Uuid::new_v4(), snapshot(1));
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshot() {
        let broadcaster = Broadcaster::new();
        let poll_id = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(poll_id);

        broadcaster.publish(poll_id, snapshot(3));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.total_votes, 3);
    }

    #[tokio::test]
    async fn every_subscriber_of_the_poll_receives() {
        let broadcaster = Broadcaster::new();
        let poll_id = Uuid::new_v4();
        let mut a = broadcaster.subscribe(poll_id);
        let mut b = broadcaster.subscribe(poll_id);

        broadcaster.publish(poll_id, snapshot(7));

        assert_eq!(a.recv().await.unwrap().total_votes, 7);
        assert_eq!(b.recv().await.unwrap().total_votes, 7);
    }

    #[tokio::test]
    async fn other_polls_do_not_cross_talk() {
        let broadcaster = Broadcaster::new();
        let poll_a = Uuid::new_v4();
        let poll_b = Uuid::new_v4();
        let mut rx_b = broadcaster.subscribe(poll_b);

        broadcaster.subscribe(poll_a);
        broadcaster.publish(poll_a, snapshot(1));

        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn prune_drops_idle_channel_without_a_publish() {
        let broadcaster = Broadcaster::new();
        let poll_id = Uuid::new_v4();
        let rx = broadcaster.subscribe(poll_id);

        drop(rx);
        broadcaster.prune(poll_id);

        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn prune_keeps_channel_with_live_viewers() {
        let broadcaster = Broadcaster::new();
        let poll_id = Uuid::new_v4();
        let _rx = broadcaster.subscribe(poll_id);
        let rx2 = broadcaster.subscribe(poll_id);

        drop(rx2);
        broadcaster.prune(poll_id);

        assert_eq!(broadcaster.channel_count(), 1);
    }

    #[tokio::test]
    async fn channel_pruned_after_last_viewer_leaves() {
        let broadcaster = Broadcaster::new();
        let poll_id = Uuid::new_v4();
        let rx = broadcaster.subscribe(poll_id);
        drop(rx);

        broadcaster.publish(poll_id, snapshot(1));
        assert_eq!(broadcaster.channel_count(), 0);
    }
}
