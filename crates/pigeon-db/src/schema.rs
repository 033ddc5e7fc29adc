pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    chat_id TEXT PRIMARY KEY NOT NULL,
    title TEXT,
    photo_url TEXT,
    last_message TEXT,
    last_message_timestamp INTEGER NOT NULL DEFAULT 0,
    members_json TEXT,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chats_order ON chats(last_message_timestamp, chat_id);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY NOT NULL,
    display_name TEXT,
    email TEXT,
    photo_url TEXT,
    status TEXT,
    last_seen INTEGER NOT NULL DEFAULT 0,
    added_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_users_order ON users(added_at, user_id);

CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT NOT NULL,
    chat_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    content TEXT NOT NULL,
    message_type TEXT NOT NULL DEFAULT 'text',
    timestamp INTEGER NOT NULL,
    PRIMARY KEY (chat_id, message_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_time ON messages(chat_id, timestamp);

CREATE TABLE IF NOT EXISTS profile (
    user_id TEXT PRIMARY KEY NOT NULL,
    display_name TEXT,
    email TEXT,
    photo_url TEXT,
    status TEXT,
    last_seen INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS app_settings (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    current_screen TEXT NOT NULL DEFAULT 'chats',
    open_chat_id TEXT,
    email_verified INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS chat_remote_keys (
    chat_id TEXT PRIMARY KEY NOT NULL,
    previous_cursor TEXT,
    next_cursor TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS friend_remote_keys (
    user_id TEXT PRIMARY KEY NOT NULL,
    previous_cursor TEXT,
    next_cursor TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS message_remote_keys (
    message_id TEXT NOT NULL,
    chat_id TEXT NOT NULL,
    previous_cursor TEXT,
    next_cursor TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (chat_id, message_id)
);

CREATE INDEX IF NOT EXISTS idx_message_keys_created ON message_remote_keys(chat_id, created_at);
"#;
