use serde::{Deserialize, Serialize};

/// Screen the rendering layer is currently showing, persisted so the
/// notification decision can tell whether a chat is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    Chats,
    Friends,
    Conversation,
    Profile,
    Settings,
}

impl Screen {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chats => "chats",
            Self::Friends => "friends",
            Self::Conversation => "conversation",
            Self::Profile => "profile",
            Self::Settings => "settings",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "friends" => Self::Friends,
            "conversation" => Self::Conversation,
            "profile" => Self::Profile,
            "settings" => Self::Settings,
            _ => Self::Chats,
        }
    }
}
