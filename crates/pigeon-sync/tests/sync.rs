//! End-to-end flows over the facade, against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use pigeon_core::{ChatData, MessageContent, MessageData, Screen, UserData};
use pigeon_db::PigeonDb;
use pigeon_remote::memory::{MemoryAuth, MemoryBackend};
use pigeon_remote::{AuthCredentials, AuthUser, RemoteBackend};
use pigeon_sync::{NotificationDecision, PigeonClient, PushMessage, SyncEvent};

fn chat(id: &str, ts: i64) -> ChatData {
    ChatData {
        chat_id: id.to_string(),
        title: Some(format!("chat {id}")),
        photo_url: None,
        last_message: Some(MessageContent::text("hello")),
        last_message_timestamp: ts,
        members: vec!["me".into(), "u2".into()],
    }
}

fn msg(chat_id: &str, id: &str, sender: &str, ts: i64) -> MessageData {
    MessageData {
        message_id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender.to_string(),
        content: MessageContent::text(format!("msg {id}")),
        timestamp: ts,
    }
}

async fn setup() -> (
    Arc<PigeonClient>,
    mpsc::Receiver<SyncEvent>,
    Arc<MemoryBackend>,
    Arc<MemoryAuth>,
) {
    let db = Arc::new(PigeonDb::in_memory().await.unwrap());
    let backend = Arc::new(MemoryBackend::new());
    let auth = Arc::new(MemoryAuth::new());

    auth.register(
        "ada@example.com",
        "s3cret",
        AuthUser {
            user_id: "me".into(),
            email: Some("ada@example.com".into()),
            display_name: Some("Ada".into()),
            photo_url: None,
            email_verified: true,
        },
    )
    .await;

    let mut client = PigeonClient::with_store(
        db,
        backend.clone() as Arc<dyn RemoteBackend>,
        auth.clone(),
    );
    let events = client.take_event_receiver().unwrap();
    let client = Arc::new(client);
    client.start().await.unwrap();

    (client, events, backend, auth)
}

async fn sign_in(client: &Arc<PigeonClient>, events: &mut mpsc::Receiver<SyncEvent>) {
    client
        .sign_in(AuthCredentials::EmailPassword {
            email: "ada@example.com".into(),
            password: "s3cret".into(),
        })
        .await
        .unwrap();
    wait_for(events, |e| matches!(e, SyncEvent::SignedIn { .. })).await;
}

async fn wait_for(
    events: &mut mpsc::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn sign_in_mirrors_profile_and_attaches_feeds() {
    let (client, mut events, backend, _auth) = setup().await;
    backend
        .chat_collection()
        .seed(vec![chat("c1", 100), chat("c2", 200)])
        .await;

    sign_in(&client, &mut events).await;

    let profile = client.profile().await.unwrap().unwrap();
    assert_eq!(profile.user_id, "me");
    assert_eq!(profile.email.as_deref(), Some("ada@example.com"));

    // The paged view loads the seeded chats.
    let chats = client.chats();
    let snapshot = chats.snapshot().await.unwrap();
    let ids: Vec<_> = snapshot.iter().map(|c| c.chat_id.as_str()).collect();
    assert_eq!(ids, ["c2", "c1"]);

    // A chat created remotely flows through the live feed into the view.
    backend.chat_collection().push(chat("c3", 300)).await;
    wait_for(&mut events, |e| matches!(e, SyncEvent::ChatsRefreshed)).await;

    let snapshot = chats.snapshot().await.unwrap();
    let ids: Vec<_> = snapshot.iter().map(|c| c.chat_id.as_str()).collect();
    assert_eq!(ids, ["c3", "c2", "c1"]);
}

#[tokio::test]
async fn send_message_mirrors_locally_on_success_only() {
    let (client, mut events, backend, _auth) = setup().await;
    backend.chat_collection().seed(vec![chat("c1", 100)]).await;
    sign_in(&client, &mut events).await;

    let chats = client.chats();
    chats.snapshot().await.unwrap();

    let sent = client
        .send_message("c1", MessageContent::text("hi there"))
        .await
        .unwrap();
    assert_eq!(sent.sender_id, "me");

    let store = client.store();
    let thread = store.all_messages("c1").await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].message_id, sent.message_id);

    // The chat row reordered around the send.
    let c1 = store.get_chat("c1").await.unwrap().unwrap();
    assert_eq!(c1.last_message_timestamp, sent.timestamp);
    assert_eq!(c1.last_message, Some(MessageContent::text("hi there")));
}

#[tokio::test]
async fn failed_send_leaves_no_ghost_message() {
    let (client, mut events, backend, _auth) = setup().await;
    backend.chat_collection().seed(vec![chat("c1", 100)]).await;
    sign_in(&client, &mut events).await;

    backend.message_collection("c1").inject_failure();
    let err = client
        .send_message("c1", MessageContent::text("lost"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let store = client.store();
    assert_eq!(store.message_count("c1").await.unwrap(), 0);

    // Retrying the same send goes through.
    client
        .send_message("c1", MessageContent::text("second try"))
        .await
        .unwrap();
    assert_eq!(store.message_count("c1").await.unwrap(), 1);
}

#[tokio::test]
async fn open_chat_thread_follows_live_events() {
    let (client, mut events, backend, _auth) = setup().await;
    backend.chat_collection().seed(vec![chat("c1", 100)]).await;
    backend
        .message_collection("c1")
        .seed(vec![msg("c1", "m1", "u2", 100)])
        .await;
    sign_in(&client, &mut events).await;

    client.open_chat("c1").await.unwrap();

    let mut thread = client.messages("c1");
    let snapshot = thread.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);

    backend
        .message_collection("c1")
        .push(msg("c1", "m2", "u2", 200))
        .await;

    let event = wait_for(&mut events, |e| matches!(e, SyncEvent::NewMessage { .. })).await;
    match event {
        SyncEvent::NewMessage {
            chat_id, sender_id, ..
        } => {
            assert_eq!(chat_id, "c1");
            assert_eq!(sender_id, "u2");
        }
        _ => unreachable!(),
    }

    let snapshot = thread.next().await.unwrap();
    let ids: Vec<_> = snapshot.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids, ["m2", "m1"]);
}

#[tokio::test]
async fn notifications_are_suppressed_for_the_open_chat_only() {
    let (client, mut events, backend, _auth) = setup().await;
    backend
        .chat_collection()
        .seed(vec![chat("c1", 100), chat("c2", 200)])
        .await;
    sign_in(&client, &mut events).await;

    client.open_chat("c1").await.unwrap();

    let push_c1 = PushMessage {
        chat_id: "c1".into(),
        sender_id: "u2".into(),
        preview: "hi".into(),
        timestamp: 1,
    };
    let push_c2 = PushMessage {
        chat_id: "c2".into(),
        sender_id: "u2".into(),
        preview: "hi".into(),
        timestamp: 1,
    };

    assert_eq!(
        client.should_notify(&push_c1).await.unwrap(),
        NotificationDecision::Suppress
    );
    assert_eq!(
        client.should_notify(&push_c2).await.unwrap(),
        NotificationDecision::Show
    );

    client.close_chat().await.unwrap();
    assert_eq!(
        client.should_notify(&push_c1).await.unwrap(),
        NotificationDecision::Show
    );

    let settings = client.store().settings().await.unwrap();
    assert_eq!(settings.screen(), Screen::Chats);
}

#[tokio::test]
async fn friends_feed_mirrors_remote_changes() {
    let (client, mut events, _backend, _auth) = setup().await;
    sign_in(&client, &mut events).await;

    let friend = UserData {
        user_id: "u2".into(),
        display_name: Some("Grace".into()),
        email: Some("grace@example.com".into()),
        photo_url: None,
        status: Some("hi".into()),
        last_seen: 0,
        added_at: 0,
    };

    let committed = client.add_friend(friend).await.unwrap();
    assert!(committed.added_at > 0);

    let friends = client.friends();
    let snapshot = friends.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].user_id, "u2");

    client.remove_friend("u2").await.unwrap();
    let snapshot = friends.snapshot().await.unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn deleting_a_chat_drops_its_thread() {
    let (client, mut events, backend, _auth) = setup().await;
    backend.chat_collection().seed(vec![chat("c1", 100)]).await;
    backend
        .message_collection("c1")
        .seed(vec![msg("c1", "m1", "u2", 100)])
        .await;
    sign_in(&client, &mut events).await;

    client.chats().snapshot().await.unwrap();
    client.messages("c1").snapshot().await.unwrap();

    let store = client.store();
    assert_eq!(store.message_count("c1").await.unwrap(), 1);

    client.delete_chat("c1").await.unwrap();

    assert!(store.get_chat("c1").await.unwrap().is_none());
    assert!(store.chat_remote_key("c1").await.unwrap().is_none());
    assert_eq!(store.message_count("c1").await.unwrap(), 0);
    assert!(store.message_remote_key("c1", "m1").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_subscriptions_are_idempotent() {
    let (client, mut events, backend, _auth) = setup().await;
    sign_in(&client, &mut events).await;

    // The session already attached the chats feed; both of these are no-ops.
    client.subscribe_chats().await.unwrap();
    client.subscribe_chats().await.unwrap();

    backend.chat_collection().push(chat("c1", 100)).await;
    wait_for(&mut events, |e| matches!(e, SyncEvent::ChatsRefreshed)).await;

    let store = client.store();
    assert_eq!(store.chat_count().await.unwrap(), 1);
    assert!(store.chat_remote_key("c1").await.unwrap().is_some());
}

#[tokio::test]
async fn sign_out_detaches_feeds_and_resets_screen() {
    let (client, mut events, backend, _auth) = setup().await;
    sign_in(&client, &mut events).await;
    client.open_chat("c1").await.unwrap();

    client.sign_out().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SyncEvent::SignedOut)).await;

    let settings = client.store().settings().await.unwrap();
    assert_eq!(settings.screen(), Screen::Chats);
    assert!(settings.open_chat_id.is_none());

    // A remote change after sign-out no longer reaches the local store.
    backend.chat_collection().push(chat("c9", 900)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.store().get_chat("c9").await.unwrap().is_none());
}
