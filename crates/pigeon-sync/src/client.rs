use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use pigeon_core::{ChatData, Entity, MessageContent, MessageData, ProfileData, Screen, UserData};
use pigeon_db::PigeonDb;
use pigeon_remote::{
    AuthClient, AuthCredentials, AuthUser, RemoteBackend, RemoteCollection, RemoteError,
};

use crate::Result;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::local::{ChatStore, FriendStore, LocalCollection, MessageStore};
use crate::merge::{MergeOutcome, Merger};
use crate::notify::{self, NotificationDecision, PushMessage};
use crate::pager::Pager;
use crate::paged::PagedStream;
use crate::session;

const SUBSCRIPTION_BACKOFF_START: Duration = Duration::from_secs(1);
const SUBSCRIPTION_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// The one interface the rendering layer depends on: paged streams, point
/// reads, write-through mutations, live subscriptions and the notification
/// decision, composed over the local store and the remote backend.
pub struct PigeonClient {
    db: Arc<PigeonDb>,
    backend: Arc<dyn RemoteBackend>,
    auth: Arc<dyn AuthClient>,
    event_tx: mpsc::Sender<SyncEvent>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    subscriptions: Mutex<HashMap<String, JoinHandle<()>>>,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl PigeonClient {
    /// Open the default on-disk store and compose the client over it.
    pub async fn new(
        backend: Arc<dyn RemoteBackend>,
        auth: Arc<dyn AuthClient>,
    ) -> Result<Self> {
        let db = Arc::new(PigeonDb::new().await?);
        Ok(Self::with_store(db, backend, auth))
    }

    pub fn with_store(
        db: Arc<PigeonDb>,
        backend: Arc<dyn RemoteBackend>,
        auth: Arc<dyn AuthClient>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);
        Self {
            db,
            backend,
            auth,
            event_tx,
            event_rx: Some(event_rx),
            subscriptions: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
        }
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub fn store(&self) -> Arc<PigeonDb> {
        self.db.clone()
    }

    /// Start the session listener: auth-state changes drive the profile
    /// mirror and the chat/friend feeds. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
        }

        let states = self.auth.subscribe().await?;
        *guard = Some(tokio::spawn(session::run(self.clone(), states)));
        Ok(())
    }

    /// Detach the session listener and every live subscription.
    pub async fn stop(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            handle.abort();
        }
        self.stop_subscriptions().await;
    }

    pub(crate) async fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event).await;
    }

    // ------------------------------------------------------------------
    // Paged views
    // ------------------------------------------------------------------

    pub fn chats(&self) -> PagedStream<ChatData> {
        let local: Arc<dyn LocalCollection<ChatData>> = Arc::new(ChatStore::new(self.db.clone()));
        let pager = Arc::new(Pager::new(local.clone(), self.backend.chats()));
        PagedStream::new(local, pager, self.db.changes())
    }

    pub fn friends(&self) -> PagedStream<UserData> {
        let local: Arc<dyn LocalCollection<UserData>> =
            Arc::new(FriendStore::new(self.db.clone()));
        let pager = Arc::new(Pager::new(local.clone(), self.backend.friends()));
        PagedStream::new(local, pager, self.db.changes())
    }

    pub fn messages(&self, chat_id: &str) -> PagedStream<MessageData> {
        let local: Arc<dyn LocalCollection<MessageData>> =
            Arc::new(MessageStore::new(self.db.clone(), chat_id));
        let pager = Arc::new(Pager::new(local.clone(), self.backend.messages(chat_id)));
        PagedStream::new(local, pager, self.db.changes())
    }

    // ------------------------------------------------------------------
    // Point reads: cached first, remote fallback. The fallback is not
    // cached; a row without a chain position would be unreachable by
    // pagination.
    // ------------------------------------------------------------------

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatData>> {
        if let Some(chat) = self.db.get_chat(chat_id).await? {
            return Ok(Some(chat));
        }
        Ok(self.backend.chats().fetch_by_id(chat_id).await?)
    }

    pub async fn get_friend(&self, user_id: &str) -> Result<Option<UserData>> {
        if let Some(user) = self.db.get_friend(user_id).await? {
            return Ok(Some(user));
        }
        Ok(self.backend.friends().fetch_by_id(user_id).await?)
    }

    pub async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<MessageData>> {
        if let Some(message) = self.db.get_message(chat_id, message_id).await? {
            return Ok(Some(message));
        }
        Ok(self
            .backend
            .messages(chat_id)
            .fetch_by_id(message_id)
            .await?)
    }

    // ------------------------------------------------------------------
    // Mutations: remote first, local mirror only on success. A failed
    // write leaves no local trace.
    // ------------------------------------------------------------------

    pub async fn send_message(
        &self,
        chat_id: &str,
        content: MessageContent,
    ) -> Result<MessageData> {
        let profile = self.db.get_profile().await?.ok_or(SyncError::NotSignedIn)?;

        let message = MessageData {
            message_id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_id: profile.user_id,
            content,
            timestamp: now_millis(),
        };

        let committed = self.backend.messages(chat_id).create(message).await?;
        self.db.prepend_message(&committed).await?;

        // Bump the chat row so the list reorders around the new message.
        if let Some(mut chat) = self.db.get_chat(chat_id).await? {
            chat.last_message = Some(committed.content.clone());
            chat.last_message_timestamp = committed.timestamp;
            let updated = self.backend.chats().update(chat).await?;
            self.db.replace_chat(&updated).await?;
        }

        Ok(committed)
    }

    pub async fn create_chat(
        &self,
        title: Option<String>,
        mut members: Vec<String>,
    ) -> Result<ChatData> {
        let profile = self.db.get_profile().await?.ok_or(SyncError::NotSignedIn)?;
        if !members.contains(&profile.user_id) {
            members.push(profile.user_id);
        }

        let chat = ChatData {
            chat_id: Uuid::new_v4().to_string(),
            title,
            photo_url: None,
            last_message: None,
            last_message_timestamp: now_millis(),
            members,
        };

        let committed = self.backend.chats().create(chat).await?;
        self.db.prepend_chat(&committed).await?;
        Ok(committed)
    }

    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<ChatData> {
        let mut chat = self
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| SyncError::Remote(RemoteError::NotFound(chat_id.to_string())))?;
        chat.title = Some(title.to_string());

        let committed = self.backend.chats().update(chat).await?;
        self.db.replace_chat(&committed).await?;
        Ok(committed)
    }

    /// Delete a chat remotely, then drop it and its whole thread locally.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.backend.chats().delete(chat_id).await?;
        self.db.remove_chat(chat_id).await?;
        self.unsubscribe(&message_key(chat_id)).await;
        Ok(())
    }

    pub async fn add_friend(&self, mut friend: UserData) -> Result<UserData> {
        if friend.added_at == 0 {
            friend.added_at = now_millis();
        }
        let committed = self.backend.friends().create(friend).await?;
        self.db.prepend_friend(&committed).await?;
        Ok(committed)
    }

    pub async fn remove_friend(&self, user_id: &str) -> Result<()> {
        self.backend.friends().delete(user_id).await?;
        self.db.remove_friend(user_id).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Live subscriptions: one listener per collection key, events merged
    // in arrival order, reconnect with backoff on stream loss.
    // ------------------------------------------------------------------

    pub async fn subscribe_chats(&self) -> Result<()> {
        let local: Arc<dyn LocalCollection<ChatData>> = Arc::new(ChatStore::new(self.db.clone()));
        self.spawn_subscription("chats".to_string(), local, self.backend.chats(), |outcome| {
            match outcome {
                MergeOutcome::Ignored => vec![],
                _ => vec![SyncEvent::ChatsRefreshed],
            }
        })
        .await
    }

    pub async fn subscribe_friends(&self) -> Result<()> {
        let local: Arc<dyn LocalCollection<UserData>> =
            Arc::new(FriendStore::new(self.db.clone()));
        self.spawn_subscription(
            "friends".to_string(),
            local,
            self.backend.friends(),
            |outcome| match outcome {
                MergeOutcome::Ignored => vec![],
                _ => vec![SyncEvent::FriendsRefreshed],
            },
        )
        .await
    }

    pub async fn subscribe_messages(&self, chat_id: &str) -> Result<()> {
        let local: Arc<dyn LocalCollection<MessageData>> =
            Arc::new(MessageStore::new(self.db.clone(), chat_id));
        let chat = chat_id.to_string();
        self.spawn_subscription(
            message_key(chat_id),
            local,
            self.backend.messages(chat_id),
            move |outcome| match outcome {
                MergeOutcome::Added(message) => vec![
                    SyncEvent::MessagesRefreshed {
                        chat_id: chat.clone(),
                    },
                    SyncEvent::NewMessage {
                        chat_id: message.chat_id,
                        sender_id: message.sender_id,
                        preview: message.content.preview(),
                        timestamp: message.timestamp,
                    },
                ],
                MergeOutcome::Updated(_) | MergeOutcome::Removed(_) => {
                    vec![SyncEvent::MessagesRefreshed {
                        chat_id: chat.clone(),
                    }]
                }
                MergeOutcome::Ignored => vec![],
            },
        )
        .await
    }

    pub async fn unsubscribe_messages(&self, chat_id: &str) {
        self.unsubscribe(&message_key(chat_id)).await;
    }

    pub async fn stop_subscriptions(&self) {
        let mut subs = self.subscriptions.lock().await;
        for (key, handle) in subs.drain() {
            tracing::debug!("detaching subscription {key}");
            handle.abort();
        }
    }

    async fn unsubscribe(&self, key: &str) {
        if let Some(handle) = self.subscriptions.lock().await.remove(key) {
            handle.abort();
        }
    }

    async fn spawn_subscription<T, F>(
        &self,
        key: String,
        local: Arc<dyn LocalCollection<T>>,
        remote: Arc<dyn RemoteCollection<T>>,
        on_merge: F,
    ) -> Result<()>
    where
        T: Entity,
        F: Fn(MergeOutcome<T>) -> Vec<SyncEvent> + Send + Sync + 'static,
    {
        let mut subs = self.subscriptions.lock().await;
        if let Some(handle) = subs.get(&key) {
            // One live listener per key; calling twice is a no-op.
            if !handle.is_finished() {
                return Ok(());
            }
        }

        // First attempt happens here so a rejected subscribe surfaces to
        // the caller; the task only owns the reconnect loop.
        let stream = remote.subscribe().await?;

        let merger = Merger::new(local, remote.clone());
        let event_tx = self.event_tx.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            run_subscription(task_key, merger, remote, event_tx, on_merge, stream).await;
        });
        subs.insert(key, handle);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Screen tracking and notifications
    // ------------------------------------------------------------------

    pub async fn set_current_screen(
        &self,
        screen: Screen,
        open_chat_id: Option<&str>,
    ) -> Result<()> {
        Ok(self.db.set_current_screen(screen, open_chat_id).await?)
    }

    /// Mark a chat as on screen and attach its live thread.
    pub async fn open_chat(&self, chat_id: &str) -> Result<()> {
        self.db
            .set_current_screen(Screen::Conversation, Some(chat_id))
            .await?;
        self.subscribe_messages(chat_id).await
    }

    pub async fn close_chat(&self) -> Result<()> {
        Ok(self.db.set_current_screen(Screen::Chats, None).await?)
    }

    /// Decide whether a push for `push.chat_id` should surface, based on
    /// the persisted screen state.
    pub async fn should_notify(&self, push: &PushMessage) -> Result<NotificationDecision> {
        let settings = self.db.settings().await?;
        let own = self.db.get_profile().await?.map(|p| p.user_id);
        Ok(notify::decide(&settings, own.as_deref(), push))
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    pub async fn sign_in(&self, credentials: AuthCredentials) -> Result<AuthUser> {
        Ok(self.auth.sign_in(credentials).await?)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthUser> {
        Ok(self.auth.sign_up(email, password, display_name).await?)
    }

    pub async fn sign_out(&self) -> Result<()> {
        Ok(self.auth.sign_out().await?)
    }

    pub async fn verify_email(&self) -> Result<()> {
        self.auth.send_verification_email().await?;
        self.db.set_email_verified(true).await?;
        Ok(())
    }

    pub async fn profile(&self) -> Result<Option<ProfileData>> {
        Ok(self.db.get_profile().await?)
    }

    // ------------------------------------------------------------------
    // Session bookkeeping, driven by the auth-state stream
    // ------------------------------------------------------------------

    pub(crate) async fn on_signed_in(&self, user: &AuthUser) -> Result<()> {
        let previous = self.db.get_profile().await?;
        let status = previous.and_then(|p| {
            if p.user_id == user.user_id {
                p.status
            } else {
                None
            }
        });

        self.db
            .save_profile(&ProfileData {
                user_id: user.user_id.clone(),
                display_name: user.display_name.clone(),
                email: user.email.clone(),
                photo_url: user.photo_url.clone(),
                status,
                last_seen: now_millis(),
            })
            .await?;
        self.db.set_email_verified(user.email_verified).await?;

        self.subscribe_chats().await?;
        self.subscribe_friends().await?;

        self.emit(SyncEvent::SignedIn {
            user_id: user.user_id.clone(),
        })
        .await;
        Ok(())
    }

    pub(crate) async fn on_signed_out(&self) -> Result<()> {
        self.stop_subscriptions().await;
        self.db.set_current_screen(Screen::Chats, None).await?;
        self.emit(SyncEvent::SignedOut).await;
        Ok(())
    }
}

async fn run_subscription<T, F>(
    key: String,
    merger: Merger<T>,
    remote: Arc<dyn RemoteCollection<T>>,
    event_tx: mpsc::Sender<SyncEvent>,
    on_merge: F,
    initial: pigeon_remote::EventStream<T>,
) where
    T: Entity,
    F: Fn(MergeOutcome<T>) -> Vec<SyncEvent> + Send + Sync + 'static,
{
    let mut backoff = SUBSCRIPTION_BACKOFF_START;
    let mut next_stream = Some(initial);

    loop {
        let mut stream = match next_stream.take() {
            Some(stream) => stream,
            None => match remote.subscribe().await {
                Ok(stream) => {
                    backoff = SUBSCRIPTION_BACKOFF_START;
                    stream
                }
                Err(RemoteError::Auth(reason)) => {
                    // Expired credentials are surfaced, never retried here.
                    let _ = event_tx
                        .send(SyncEvent::AuthExpired {
                            collection: key.clone(),
                            error: reason,
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    let _ = event_tx
                        .send(SyncEvent::SubscriptionLost {
                            collection: key.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(SUBSCRIPTION_BACKOFF_CAP);
                    continue;
                }
            },
        };

        // Events for one key are merged strictly in arrival order.
        while let Some(event) = stream.recv().await {
            match merger.apply(event).await {
                Ok(outcome) => {
                    for sync_event in on_merge(outcome) {
                        let _ = event_tx.send(sync_event).await;
                    }
                }
                Err(e) => {
                    tracing::error!("merge failed on {key}: {e}");
                    let _ = event_tx
                        .send(SyncEvent::Error {
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        tracing::warn!("subscription {key} closed, reconnecting");
        let _ = event_tx
            .send(SyncEvent::SubscriptionLost {
                collection: key.clone(),
                error: "stream closed".to_string(),
            })
            .await;
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(SUBSCRIPTION_BACKOFF_CAP);
    }
}

fn message_key(chat_id: &str) -> String {
    format!("messages:{chat_id}")
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
