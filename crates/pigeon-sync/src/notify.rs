use pigeon_core::Screen;
use pigeon_db::AppSettings;

/// Thin payload delivered by the push transport.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub preview: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDecision {
    Show,
    Suppress,
}

/// A push for the chat the user is looking at (or for their own message)
/// is suppressed; everything else is shown.
pub fn decide(
    settings: &AppSettings,
    own_user_id: Option<&str>,
    push: &PushMessage,
) -> NotificationDecision {
    if own_user_id == Some(push.sender_id.as_str()) {
        return NotificationDecision::Suppress;
    }

    let chat_on_screen = settings.screen() == Screen::Conversation
        && settings.open_chat_id.as_deref() == Some(push.chat_id.as_str());
    if chat_on_screen {
        return NotificationDecision::Suppress;
    }

    NotificationDecision::Show
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(screen: &str, open_chat_id: Option<&str>) -> AppSettings {
        AppSettings {
            id: 0,
            current_screen: screen.to_string(),
            open_chat_id: open_chat_id.map(str::to_string),
            email_verified: true,
        }
    }

    fn push(chat_id: &str, sender_id: &str) -> PushMessage {
        PushMessage {
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            preview: "hi".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn suppresses_for_the_open_chat() {
        let s = settings("conversation", Some("c1"));
        assert_eq!(
            decide(&s, Some("me"), &push("c1", "u2")),
            NotificationDecision::Suppress
        );
    }

    #[test]
    fn shows_for_other_chats() {
        let s = settings("conversation", Some("c1"));
        assert_eq!(
            decide(&s, Some("me"), &push("c2", "u2")),
            NotificationDecision::Show
        );
    }

    #[test]
    fn shows_when_the_chat_list_is_on_screen() {
        let s = settings("chats", Some("c1"));
        assert_eq!(
            decide(&s, Some("me"), &push("c1", "u2")),
            NotificationDecision::Show
        );
    }

    #[test]
    fn suppresses_own_messages() {
        let s = settings("chats", None);
        assert_eq!(
            decide(&s, Some("me"), &push("c1", "me")),
            NotificationDecision::Suppress
        );
    }
}
