use std::sync::Arc;

use async_trait::async_trait;

use pigeon_core::{ChatData, Entity, MessageData, UserData};
use pigeon_db::{PigeonDb, RemoteKey, StoreChange};

use crate::Result;

/// The store side of one paginated collection, as the pager and merger see
/// it. Implementations delegate to the concrete `PigeonDb` operations; all
/// chain-mutating calls are single transactions down there.
#[async_trait]
pub trait LocalCollection<T: Entity>: Send + Sync {
    /// Change-notification topic for this collection.
    fn topic(&self) -> StoreChange;

    async fn count(&self) -> Result<i64>;

    /// Everything currently cached, newest first.
    async fn snapshot(&self) -> Result<Vec<T>>;

    async fn get(&self, id: &str) -> Result<Option<T>>;

    /// Oldest loaded key whose older cursor is unset. `None` on a non-empty
    /// chain means every candidate's older pointer is dead.
    async fn chain_tail(&self) -> Result<Option<RemoteKey>>;

    async fn insert_page(&self, page: &[T], link_to_next: Option<&str>) -> Result<bool>;

    async fn prepend(&self, item: &T) -> Result<bool>;

    async fn replace(&self, item: &T) -> Result<bool>;

    async fn remove(&self, id: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct ChatStore {
    db: Arc<PigeonDb>,
}

impl ChatStore {
    pub fn new(db: Arc<PigeonDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocalCollection<ChatData> for ChatStore {
    fn topic(&self) -> StoreChange {
        StoreChange::Chats
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.db.chat_count().await?)
    }

    async fn snapshot(&self) -> Result<Vec<ChatData>> {
        Ok(self.db.all_chats().await?)
    }

    async fn get(&self, id: &str) -> Result<Option<ChatData>> {
        Ok(self.db.get_chat(id).await?)
    }

    async fn chain_tail(&self) -> Result<Option<RemoteKey>> {
        Ok(self.db.chat_chain_tail().await?)
    }

    async fn insert_page(&self, page: &[ChatData], link_to_next: Option<&str>) -> Result<bool> {
        Ok(self.db.insert_chat_page(page, link_to_next).await?)
    }

    async fn prepend(&self, item: &ChatData) -> Result<bool> {
        Ok(self.db.prepend_chat(item).await?)
    }

    async fn replace(&self, item: &ChatData) -> Result<bool> {
        Ok(self.db.replace_chat(item).await?)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.db.remove_chat(id).await?)
    }
}

#[derive(Clone)]
pub struct FriendStore {
    db: Arc<PigeonDb>,
}

impl FriendStore {
    pub fn new(db: Arc<PigeonDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocalCollection<UserData> for FriendStore {
    fn topic(&self) -> StoreChange {
        StoreChange::Friends
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.db.friend_count().await?)
    }

    async fn snapshot(&self) -> Result<Vec<UserData>> {
        Ok(self.db.all_friends().await?)
    }

    async fn get(&self, id: &str) -> Result<Option<UserData>> {
        Ok(self.db.get_friend(id).await?)
    }

    async fn chain_tail(&self) -> Result<Option<RemoteKey>> {
        Ok(self.db.friend_chain_tail().await?)
    }

    async fn insert_page(&self, page: &[UserData], link_to_next: Option<&str>) -> Result<bool> {
        Ok(self.db.insert_friend_page(page, link_to_next).await?)
    }

    async fn prepend(&self, item: &UserData) -> Result<bool> {
        Ok(self.db.prepend_friend(item).await?)
    }

    async fn replace(&self, item: &UserData) -> Result<bool> {
        Ok(self.db.replace_friend(item).await?)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.db.remove_friend(id).await?)
    }
}

/// One chat's message thread.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<PigeonDb>,
    chat_id: String,
}

impl MessageStore {
    pub fn new(db: Arc<PigeonDb>, chat_id: impl Into<String>) -> Self {
        Self {
            db,
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl LocalCollection<MessageData> for MessageStore {
    fn topic(&self) -> StoreChange {
        StoreChange::Messages {
            chat_id: self.chat_id.clone(),
        }
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.db.message_count(&self.chat_id).await?)
    }

    async fn snapshot(&self) -> Result<Vec<MessageData>> {
        Ok(self.db.all_messages(&self.chat_id).await?)
    }

    async fn get(&self, id: &str) -> Result<Option<MessageData>> {
        Ok(self.db.get_message(&self.chat_id, id).await?)
    }

    async fn chain_tail(&self) -> Result<Option<RemoteKey>> {
        Ok(self.db.message_chain_tail(&self.chat_id).await?)
    }

    async fn insert_page(&self, page: &[MessageData], link_to_next: Option<&str>) -> Result<bool> {
        Ok(self
            .db
            .insert_message_page(&self.chat_id, page, link_to_next)
            .await?)
    }

    async fn prepend(&self, item: &MessageData) -> Result<bool> {
        Ok(self.db.prepend_message(item).await?)
    }

    async fn replace(&self, item: &MessageData) -> Result<bool> {
        Ok(self.db.replace_message(item).await?)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.db.remove_message(&self.chat_id, id).await?)
    }
}
