use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BlockEvent, SpaceId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for block mutations, fanned out per space.
///
/// Lets a second session of the same owner notice edits made elsewhere and
/// invalidate its cached calendar pages. Lossy: a lagged receiver is told
/// how many events it missed and must over-invalidate to compensate.
pub struct ChangeFeed {
    channels: DashMap<SpaceId, broadcast::Sender<BlockEvent>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to mutations for a space. Creates the channel if needed.
    pub fn subscribe(&self, space_id: SpaceId) -> broadcast::Receiver<BlockEvent> {
        let sender = self
            .channels
            .entry(space_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Announce a mutation. No-op if nobody is listening.
    pub fn send(&self, event: &BlockEvent) {
        if let Some(sender) = self.channels.get(&event.space_id()) {
            let _ = sender.send(event.clone());
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockId, TimeSpan};
    use chrono::Utc;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed = ChangeFeed::new();
        let space = SpaceId::generate();
        let mut rx = feed.subscribe(space);

        let event = BlockEvent::Created {
            id: BlockId::generate(),
            space_id: space,
            date: "2025-06-10".parse().unwrap(),
            span: TimeSpan::new(840, 900),
            reason: None,
            created_at: Utc::now(),
        };
        feed.send(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let feed = ChangeFeed::new();
        // No subscriber; must not panic
        feed.send(&BlockEvent::Deleted {
            id: BlockId::generate(),
            space_id: SpaceId::generate(),
            date: "2025-06-10".parse().unwrap(),
        });
    }

    #[tokio::test]
    async fn spaces_are_isolated() {
        let feed = ChangeFeed::new();
        let watched = SpaceId::generate();
        let other = SpaceId::generate();
        let mut rx = feed.subscribe(watched);

        feed.send(&BlockEvent::Deleted {
            id: BlockId::generate(),
            space_id: other,
            date: "2025-06-10".parse().unwrap(),
        });

        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }
}
