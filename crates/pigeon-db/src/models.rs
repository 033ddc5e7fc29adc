use serde::{Deserialize, Serialize};

use pigeon_core::{ChatData, MessageContent, MessageData, ProfileData, Screen, UserData};

use crate::error::DbError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub chat_id: String,
    pub title: Option<String>,
    pub photo_url: Option<String>,
    pub last_message: Option<String>,
    pub last_message_timestamp: i64,
    pub members_json: Option<String>,
    pub updated_at: i64,
}

impl Chat {
    pub fn into_data(self) -> Result<ChatData, DbError> {
        let last_message = self
            .last_message
            .as_deref()
            .map(serde_json::from_str::<MessageContent>)
            .transpose()?;
        let members = self
            .members_json
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?
            .unwrap_or_default();

        Ok(ChatData {
            chat_id: self.chat_id,
            title: self.title,
            photo_url: self.photo_url,
            last_message,
            last_message_timestamp: self.last_message_timestamp,
            members,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub status: Option<String>,
    pub last_seen: i64,
    pub added_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn into_data(self) -> UserData {
        UserData {
            user_id: self.user_id,
            display_name: self.display_name,
            email: self.email,
            photo_url: self.photo_url,
            status: self.status,
            last_seen: self.last_seen,
            added_at: self.added_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: String,
    pub timestamp: i64,
}

impl Message {
    pub fn into_data(self) -> Result<MessageData, DbError> {
        let content: MessageContent = serde_json::from_str(&self.content)?;
        Ok(MessageData {
            message_id: self.message_id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            content,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub status: Option<String>,
    pub last_seen: i64,
    pub updated_at: i64,
}

impl Profile {
    pub fn into_data(self) -> ProfileData {
        ProfileData {
            user_id: self.user_id,
            display_name: self.display_name,
            email: self.email,
            photo_url: self.photo_url,
            status: self.status,
            last_seen: self.last_seen,
        }
    }
}

/// Singleton settings row (fixed id 0).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AppSettings {
    pub id: i64,
    pub current_screen: String,
    pub open_chat_id: Option<String>,
    pub email_verified: bool,
}

impl AppSettings {
    pub fn screen(&self) -> Screen {
        Screen::parse(&self.current_screen)
    }
}

/// A collection item's position in the paginated remote ordering.
///
/// `previous_cursor`/`next_cursor` hold the id of the adjacent older/newer
/// item; the set of rows for one collection forms a doubly-linked chain whose
/// head (newest item) carries the largest `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RemoteKey {
    pub id: String,
    pub previous_cursor: Option<String>,
    pub next_cursor: Option<String>,
    pub created_at: i64,
}
