use serde::{Deserialize, Serialize};

use crate::page::Entity;

/// Message body, serialized as a string-keyed map with a `type` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Image { image_url: String },
    TextImage { text: String, image_url: String },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image {
            image_url: image_url.into(),
        }
    }

    pub fn text_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self::TextImage {
            text: text.into(),
            image_url: image_url.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::TextImage { .. } => "text_image",
        }
    }

    /// Short line shown in chat rows and notifications.
    pub fn preview(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Image { .. } => "[photo]".to_string(),
            Self::TextImage { text, .. } => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: MessageContent,
    pub timestamp: i64,
}

impl Entity for MessageData {
    fn entity_id(&self) -> &str {
        &self.message_id
    }

    fn ordering_key(&self) -> i64 {
        self.timestamp
    }
}
