use serde::{Deserialize, Serialize};

use crate::message::MessageContent;
use crate::page::Entity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatData {
    pub chat_id: String,
    pub title: Option<String>,
    pub photo_url: Option<String>,
    pub last_message: Option<MessageContent>,
    /// Ordering key: timestamp of the newest message in the chat.
    pub last_message_timestamp: i64,
    pub members: Vec<String>,
}

impl ChatData {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.chat_id)
    }
}

impl Entity for ChatData {
    fn entity_id(&self) -> &str {
        &self.chat_id
    }

    fn ordering_key(&self) -> i64 {
        self.last_message_timestamp
    }
}
