/// Events the facade pushes to the rendering layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    SignedIn { user_id: String },
    SignedOut,

    ChatsRefreshed,
    FriendsRefreshed,
    MessagesRefreshed { chat_id: String },

    /// A message arrived over a live subscription; feeds the notification
    /// decision.
    NewMessage {
        chat_id: String,
        sender_id: String,
        preview: String,
        timestamp: i64,
    },

    /// A live subscription dropped; the facade keeps reconnecting with
    /// backoff, updates just stall until it succeeds.
    SubscriptionLost { collection: String, error: String },

    /// Credentials were rejected; re-authentication is required, nothing is
    /// retried automatically.
    AuthExpired { collection: String, error: String },

    Error { error: String },
}
