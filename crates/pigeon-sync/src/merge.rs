use std::sync::Arc;

use pigeon_core::{Entity, LiveEvent};
use pigeon_remote::RemoteCollection;

use crate::Result;
use crate::local::LocalCollection;

/// What one live event did to the local store.
#[derive(Debug, Clone)]
pub enum MergeOutcome<T> {
    Added(T),
    Updated(T),
    Removed(String),
    /// Duplicate delivery, vanished item, or update for an uncached id.
    Ignored,
}

/// Applies live add/update/remove events to one collection's cache.
///
/// Callers feed events for one collection key through a single `Merger`
/// sequentially; the store transaction underneath is what keeps each
/// individual merge atomic.
pub struct Merger<T: Entity> {
    local: Arc<dyn LocalCollection<T>>,
    remote: Arc<dyn RemoteCollection<T>>,
}

impl<T: Entity> Merger<T> {
    pub fn new(local: Arc<dyn LocalCollection<T>>, remote: Arc<dyn RemoteCollection<T>>) -> Self {
        Self { local, remote }
    }

    pub async fn apply(&self, event: LiveEvent<T>) -> Result<MergeOutcome<T>> {
        match event {
            LiveEvent::Added { id, entity } => {
                // A fetch race with the initial page load delivers items we
                // already hold; the event is dropped whole.
                if self.local.get(&id).await?.is_some() {
                    return Ok(MergeOutcome::Ignored);
                }

                let entity = match entity {
                    Some(entity) => entity,
                    None => match self.remote.fetch_by_id(&id).await? {
                        Some(entity) => entity,
                        None => {
                            tracing::debug!("added event for vanished item {id}, dropped");
                            return Ok(MergeOutcome::Ignored);
                        }
                    },
                };

                if self.local.prepend(&entity).await? {
                    Ok(MergeOutcome::Added(entity))
                } else {
                    Ok(MergeOutcome::Ignored)
                }
            }

            LiveEvent::Updated { entity } => {
                // In-place replace; the chain position never moves on update.
                if self.local.replace(&entity).await? {
                    Ok(MergeOutcome::Updated(entity))
                } else {
                    tracing::debug!(
                        "update for uncached item {}, dropped",
                        entity.entity_id()
                    );
                    Ok(MergeOutcome::Ignored)
                }
            }

            LiveEvent::Removed { id } => {
                if self.local.remove(&id).await? {
                    Ok(MergeOutcome::Removed(id))
                } else {
                    Ok(MergeOutcome::Ignored)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MessageStore;
    use pigeon_core::{MessageContent, MessageData};
    use pigeon_db::PigeonDb;
    use pigeon_remote::memory::MemoryCollection;

    fn msg(id: &str, ts: i64) -> MessageData {
        MessageData {
            message_id: id.to_string(),
            chat_id: "c1".to_string(),
            sender_id: "u2".to_string(),
            content: MessageContent::text(format!("msg {id}")),
            timestamp: ts,
        }
    }

    async fn setup() -> (
        Arc<PigeonDb>,
        Arc<MemoryCollection<MessageData>>,
        Merger<MessageData>,
    ) {
        let db = Arc::new(PigeonDb::in_memory().await.unwrap());
        let remote = Arc::new(MemoryCollection::new());
        let local: Arc<dyn LocalCollection<MessageData>> =
            Arc::new(MessageStore::new(db.clone(), "c1"));
        let merger = Merger::new(local, remote.clone());
        (db, remote, merger)
    }

    #[tokio::test]
    async fn double_added_leaves_one_row_and_one_key() {
        let (db, _remote, merger) = setup().await;

        let first = merger.apply(LiveEvent::added(msg("m1", 100))).await.unwrap();
        assert!(matches!(first, MergeOutcome::Added(_)));

        let second = merger.apply(LiveEvent::added(msg("m1", 100))).await.unwrap();
        assert!(matches!(second, MergeOutcome::Ignored));

        assert_eq!(db.message_count("c1").await.unwrap(), 1);
        assert!(db.message_remote_key("c1", "m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn thin_added_is_completed_with_a_point_fetch() {
        let (db, remote, merger) = setup().await;
        remote.seed(vec![msg("m1", 100)]).await;

        let outcome = merger
            .apply(LiveEvent::added_thin("m1"))
            .await
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::Added(_)));

        let stored = db.get_message("c1", "m1").await.unwrap().unwrap();
        assert_eq!(stored.timestamp, 100);
    }

    #[tokio::test]
    async fn thin_added_for_vanished_item_is_dropped() {
        let (db, _remote, merger) = setup().await;

        let outcome = merger
            .apply(LiveEvent::added_thin("ghost"))
            .await
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::Ignored));
        assert_eq!(db.message_count("c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn added_events_prepend_at_the_head() {
        let (db, _remote, merger) = setup().await;

        merger.apply(LiveEvent::added(msg("m1", 100))).await.unwrap();
        merger.apply(LiveEvent::added(msg("m2", 200))).await.unwrap();

        assert_eq!(db.message_chain_head("c1").await.unwrap().unwrap().id, "m2");
        let m2 = db.message_remote_key("c1", "m2").await.unwrap().unwrap();
        assert_eq!(m2.previous_cursor.as_deref(), Some("m1"));
        assert_eq!(m2.next_cursor, None);
    }

    #[tokio::test]
    async fn updated_replaces_without_moving_the_chain() {
        let (db, _remote, merger) = setup().await;
        merger.apply(LiveEvent::added(msg("m1", 100))).await.unwrap();
        let key_before = db.message_remote_key("c1", "m1").await.unwrap().unwrap();

        let mut edited = msg("m1", 100);
        edited.content = MessageContent::text("edited");
        let outcome = merger.apply(LiveEvent::updated(edited)).await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Updated(_)));

        let stored = db.get_message("c1", "m1").await.unwrap().unwrap();
        assert_eq!(stored.content, MessageContent::text("edited"));
        let key_after = db.message_remote_key("c1", "m1").await.unwrap().unwrap();
        assert_eq!(key_before, key_after);
    }

    #[tokio::test]
    async fn updated_for_uncached_id_is_dropped() {
        let (db, _remote, merger) = setup().await;

        let outcome = merger
            .apply(LiveEvent::updated(msg("stranger", 100)))
            .await
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::Ignored));
        assert_eq!(db.message_count("c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn removed_deletes_row_and_key_together() {
        let (db, _remote, merger) = setup().await;
        merger.apply(LiveEvent::added(msg("m1", 100))).await.unwrap();

        let outcome = merger.apply(LiveEvent::removed("m1")).await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Removed(_)));

        assert!(db.get_message("c1", "m1").await.unwrap().is_none());
        assert!(db.message_remote_key("c1", "m1").await.unwrap().is_none());
    }
}
