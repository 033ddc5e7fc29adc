//! In-process backend used by the demo CLI and the test suites: ordered
//! in-memory collections with live-event fan-out, plus a credential-checking
//! auth provider. Failures can be injected to exercise the retry paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc};
use uuid::Uuid;

use pigeon_core::{
    ChatData, Cursor, Direction, Entity, LiveEvent, MessageData, UserData, sort_newest_first,
};

use crate::auth::{AuthClient, AuthCredentials, AuthState, AuthUser};
use crate::collection::{EventStream, RemoteBackend, RemoteCollection};
use crate::error::RemoteError;
use crate::Result;

pub struct MemoryCollection<T: Entity> {
    items: Mutex<Vec<T>>,
    events: broadcast::Sender<LiveEvent<T>>,
    fail_next: AtomicBool,
}

impl<T: Entity> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemoryCollection<T> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            items: Mutex::new(Vec::new()),
            events,
            fail_next: AtomicBool::new(false),
        }
    }

    /// Load server-side state without emitting events.
    pub async fn seed(&self, mut items: Vec<T>) {
        sort_newest_first(&mut items);
        *self.items.lock().await = items;
    }

    /// Server-side mutation helpers: store the change and push the
    /// matching live event, as a remote writer would.
    pub async fn push(&self, item: T) {
        self.store(item.clone()).await;
        let _ = self.events.send(LiveEvent::added(item));
    }

    pub async fn push_update(&self, item: T) {
        self.store(item.clone()).await;
        let _ = self.events.send(LiveEvent::updated(item));
    }

    pub async fn push_remove(&self, id: &str) {
        self.items.lock().await.retain(|i| i.entity_id() != id);
        let _ = self.events.send(LiveEvent::removed(id));
    }

    /// Emit a raw event without touching stored state (thin payloads,
    /// duplicate deliveries).
    pub fn emit(&self, event: LiveEvent<T>) {
        let _ = self.events.send(event);
    }

    /// Make the next remote call fail with a transient error.
    pub fn inject_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    async fn store(&self, item: T) {
        let mut items = self.items.lock().await;
        items.retain(|i| i.entity_id() != item.entity_id());
        items.push(item);
        sort_newest_first(&mut items);
    }

    fn take_failure(&self) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(RemoteError::Transient("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<T: Entity> RemoteCollection<T> for MemoryCollection<T> {
    async fn fetch_page(
        &self,
        anchor: Option<Cursor>,
        page_size: usize,
        direction: Direction,
    ) -> Result<Vec<T>> {
        self.take_failure()?;
        let items = self.items.lock().await;

        let page = match (&anchor, direction) {
            (None, _) => items.iter().take(page_size).cloned().collect(),
            (Some(anchor), Direction::Older) => items
                .iter()
                .filter(|i| i.cursor().is_older_than(anchor))
                .take(page_size)
                .cloned()
                .collect(),
            (Some(anchor), Direction::Newer) => {
                // The page adjacent to the anchor, still newest first.
                let newer: Vec<&T> = items
                    .iter()
                    .filter(|i| i.cursor().is_newer_than(anchor))
                    .collect();
                let start = newer.len().saturating_sub(page_size);
                newer[start..].iter().map(|i| (*i).clone()).collect()
            }
        };

        Ok(page)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<T>> {
        self.take_failure()?;
        let items = self.items.lock().await;
        Ok(items.iter().find(|i| i.entity_id() == id).cloned())
    }

    async fn create(&self, item: T) -> Result<T> {
        self.take_failure()?;
        self.store(item.clone()).await;
        let _ = self.events.send(LiveEvent::added(item.clone()));
        Ok(item)
    }

    async fn update(&self, item: T) -> Result<T> {
        self.take_failure()?;
        {
            let items = self.items.lock().await;
            if !items.iter().any(|i| i.entity_id() == item.entity_id()) {
                return Err(RemoteError::NotFound(item.entity_id().to_string()));
            }
        }
        self.store(item.clone()).await;
        let _ = self.events.send(LiveEvent::updated(item.clone()));
        Ok(item)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.take_failure()?;
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| i.entity_id() != id);
        let removed = items.len() < before;
        drop(items);

        if removed {
            let _ = self.events.send(LiveEvent::removed(id));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream<T>> {
        self.take_failure()?;
        let mut rx = self.events.subscribe();
        let (tx, stream) = mpsc::channel(256);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("memory subscription lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(stream)
    }
}

/// The full in-process backend: one chat collection, one friends
/// collection, message collections created per chat on demand.
pub struct MemoryBackend {
    chats: Arc<MemoryCollection<ChatData>>,
    friends: Arc<MemoryCollection<UserData>>,
    messages: std::sync::Mutex<HashMap<String, Arc<MemoryCollection<MessageData>>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            chats: Arc::new(MemoryCollection::new()),
            friends: Arc::new(MemoryCollection::new()),
            messages: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Concrete handles, for seeding and event injection in tests.
    pub fn chat_collection(&self) -> Arc<MemoryCollection<ChatData>> {
        self.chats.clone()
    }

    pub fn friend_collection(&self) -> Arc<MemoryCollection<UserData>> {
        self.friends.clone()
    }

    pub fn message_collection(&self, chat_id: &str) -> Arc<MemoryCollection<MessageData>> {
        let mut map = self.messages.lock().unwrap();
        map.entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new()))
            .clone()
    }
}

impl RemoteBackend for MemoryBackend {
    fn chats(&self) -> Arc<dyn RemoteCollection<ChatData>> {
        self.chats.clone()
    }

    fn friends(&self) -> Arc<dyn RemoteCollection<UserData>> {
        self.friends.clone()
    }

    fn messages(&self, chat_id: &str) -> Arc<dyn RemoteCollection<MessageData>> {
        self.message_collection(chat_id)
    }
}

/// Credential-checking auth provider for the demo backend.
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, (String, AuthUser)>>,
    tokens: Mutex<HashMap<String, AuthUser>>,
    current: Mutex<Option<AuthUser>>,
    state: broadcast::Sender<AuthState>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (state, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            state,
        }
    }

    /// Seed an email/password account.
    pub async fn register(&self, email: &str, password: &str, user: AuthUser) {
        self.accounts
            .lock()
            .await
            .insert(email.to_string(), (password.to_string(), user));
    }

    /// Seed a provider token (Google/Facebook) accepted at sign-in.
    pub async fn register_token(&self, token: &str, user: AuthUser) {
        self.tokens.lock().await.insert(token.to_string(), user);
    }

    async fn set_signed_in(&self, user: AuthUser) {
        *self.current.lock().await = Some(user.clone());
        let _ = self.state.send(AuthState::SignedIn(user));
    }
}

#[async_trait]
impl AuthClient for MemoryAuth {
    async fn sign_in(&self, credentials: AuthCredentials) -> Result<AuthUser> {
        let user = match credentials {
            AuthCredentials::EmailPassword { email, password } => {
                let accounts = self.accounts.lock().await;
                match accounts.get(&email) {
                    Some((stored, user)) if *stored == password => user.clone(),
                    _ => return Err(RemoteError::Auth("invalid email or password".into())),
                }
            }
            AuthCredentials::GoogleIdToken(token)
            | AuthCredentials::FacebookAccessToken(token) => {
                let tokens = self.tokens.lock().await;
                match tokens.get(&token) {
                    Some(user) => user.clone(),
                    None => return Err(RemoteError::Auth("provider token rejected".into())),
                }
            }
        };

        self.set_signed_in(user.clone()).await;
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<AuthUser> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(RemoteError::Auth("email already registered".into()));
        }

        let user = AuthUser {
            user_id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            display_name: Some(display_name.to_string()),
            photo_url: None,
            email_verified: false,
        };
        accounts.insert(email.to_string(), (password.to_string(), user.clone()));
        drop(accounts);

        self.set_signed_in(user.clone()).await;
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        *self.current.lock().await = None;
        let _ = self.state.send(AuthState::SignedOut);
        Ok(())
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.current.lock().await.clone()
    }

    /// The demo provider verifies instantly instead of sending mail.
    async fn send_verification_email(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        match current.as_mut() {
            Some(user) => {
                user.email_verified = true;
                let user = user.clone();
                drop(current);
                let _ = self.state.send(AuthState::SignedIn(user));
                Ok(())
            }
            None => Err(RemoteError::Auth("no signed-in user".into())),
        }
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<AuthState>> {
        let mut rx = self.state.subscribe();
        let (tx, stream) = mpsc::channel(16);

        // Deliver the current state immediately, like a real auth listener.
        let initial = match self.current.lock().await.clone() {
            Some(user) => AuthState::SignedIn(user),
            None => AuthState::SignedOut,
        };
        let _ = tx.send(initial).await;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(state) => {
                        if tx.send(state).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigeon_core::MessageContent;

    fn msg(id: &str, ts: i64) -> MessageData {
        MessageData {
            message_id: id.to_string(),
            chat_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            content: MessageContent::text(id),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn pages_anchor_strictly_older() {
        let col = MemoryCollection::new();
        col.seed(vec![msg("m1", 100), msg("m2", 200), msg("m3", 300), msg("m4", 400)])
            .await;

        let first = col.fetch_page(None, 2, Direction::Older).await.unwrap();
        let ids: Vec<_> = first.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["m4", "m3"]);

        let anchor = first.last().unwrap().cursor();
        let second = col
            .fetch_page(Some(anchor), 2, Direction::Older)
            .await
            .unwrap();
        let ids: Vec<_> = second.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["m2", "m1"]);

        let anchor = second.last().unwrap().cursor();
        let third = col
            .fetch_page(Some(anchor), 2, Direction::Older)
            .await
            .unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn shared_timestamps_do_not_duplicate_across_pages() {
        let col = MemoryCollection::new();
        // m2 and m3 share a timestamp.
        col.seed(vec![msg("m1", 100), msg("m2", 200), msg("m3", 200), msg("m4", 400)])
            .await;

        let first = col.fetch_page(None, 2, Direction::Older).await.unwrap();
        let anchor = first.last().unwrap().cursor();
        let second = col
            .fetch_page(Some(anchor), 2, Direction::Older)
            .await
            .unwrap();

        let mut all: Vec<_> = first
            .iter()
            .chain(second.iter())
            .map(|m| m.message_id.clone())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn subscription_delivers_mutations() {
        let col = MemoryCollection::new();
        let mut stream = col.subscribe().await.unwrap();

        col.push(msg("m1", 100)).await;
        col.push_remove("m1").await;

        match stream.recv().await.unwrap() {
            LiveEvent::Added { id, .. } => assert_eq!(id, "m1"),
            other => panic!("unexpected event: {other:?}"),
        }
        match stream.recv().await.unwrap() {
            LiveEvent::Removed { id } => assert_eq!(id, "m1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn injected_failure_is_transient_and_one_shot() {
        let col = MemoryCollection::<MessageData>::new();
        col.inject_failure();

        let err = col.fetch_page(None, 2, Direction::Older).await.unwrap_err();
        assert!(err.is_retryable());

        assert!(col.fetch_page(None, 2, Direction::Older).await.is_ok());
    }

    #[tokio::test]
    async fn auth_rejects_bad_credentials() {
        let auth = MemoryAuth::new();
        auth.register(
            "ada@example.com",
            "s3cret",
            AuthUser {
                user_id: "u1".into(),
                email: Some("ada@example.com".into()),
                display_name: Some("Ada".into()),
                photo_url: None,
                email_verified: true,
            },
        )
        .await;

        let err = auth
            .sign_in(AuthCredentials::EmailPassword {
                email: "ada@example.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Auth(_)));

        let user = auth
            .sign_in(AuthCredentials::EmailPassword {
                email: "ada@example.com".into(),
                password: "s3cret".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.user_id, "u1");
        assert!(auth.current_user().await.is_some());
    }
}
