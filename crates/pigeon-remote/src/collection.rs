use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pigeon_core::{ChatData, Cursor, Direction, Entity, LiveEvent, MessageData, UserData};

use crate::Result;

/// Live events for one collection subscription. Dropping the receiver
/// closes the subscription.
pub type EventStream<T> = mpsc::Receiver<LiveEvent<T>>;

/// One remote collection (the chat list, the friends list, or a single
/// chat's message thread).
#[async_trait]
pub trait RemoteCollection<T: Entity>: Send + Sync {
    /// Fetch up to `page_size` items, newest first. `anchor = None` starts
    /// at the most recent end; otherwise only items strictly older (or
    /// newer) than the anchor are returned. Fewer than `page_size` items is
    /// normal; an empty page means the collection is exhausted in that
    /// direction.
    async fn fetch_page(
        &self,
        anchor: Option<Cursor>,
        page_size: usize,
        direction: Direction,
    ) -> Result<Vec<T>>;

    async fn fetch_by_id(&self, id: &str) -> Result<Option<T>>;

    async fn create(&self, item: T) -> Result<T>;

    async fn update(&self, item: T) -> Result<T>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn subscribe(&self) -> Result<EventStream<T>>;
}

/// Hands out collection handles. Message collections are scoped per chat.
pub trait RemoteBackend: Send + Sync {
    fn chats(&self) -> Arc<dyn RemoteCollection<ChatData>>;

    fn friends(&self) -> Arc<dyn RemoteCollection<UserData>>;

    fn messages(&self, chat_id: &str) -> Arc<dyn RemoteCollection<MessageData>>;
}
