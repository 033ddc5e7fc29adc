use std::io::{self, Write};
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};

use pigeon_core::{ChatData, MessageContent, MessageData, UserData};
use pigeon_db::PigeonDb;
use pigeon_remote::memory::{MemoryAuth, MemoryBackend};
use pigeon_remote::{AuthCredentials, AuthUser, RemoteBackend, RemoteCollection};
use pigeon_sync::{NotificationDecision, PageOutcome, PigeonClient, PushMessage, SyncEvent};

const DEMO_EMAIL: &str = "demo@pigeon.im";
const DEMO_PASSWORD: &str = "pigeon";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .from_env_lossy()
                .add_directive("pigeon_cli=info".parse().unwrap())
                .add_directive("pigeon_sync=info".parse().unwrap())
                .add_directive("pigeon_remote=info".parse().unwrap())
                .add_directive("pigeon_db=info".parse().unwrap()),
        )
        .init();

    let backend = Arc::new(MemoryBackend::new());
    let auth = Arc::new(MemoryAuth::new());
    seed_backend(&backend, &auth).await;

    let db = Arc::new(PigeonDb::in_memory().await.wrap_err("Failed to open store")?);
    let mut client = PigeonClient::with_store(
        db,
        backend.clone() as Arc<dyn RemoteBackend>,
        auth.clone(),
    );
    let mut event_rx = client
        .take_event_receiver()
        .ok_or_else(|| color_eyre::eyre::eyre!("Failed to get event receiver"))?;

    let client = Arc::new(client);
    client.start().await.wrap_err("Failed to start client")?;

    let event_client = client.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_event(&event_client, event).await;
        }
    });

    println!("📨 Pigeon demo — backed by an in-process remote");
    println!("   Sign in with {DEMO_EMAIL} / {DEMO_PASSWORD}");

    loop {
        print_menu();
        let choice = read_line("Choice: ")?;

        let result = match choice.trim() {
            "1" => sign_in(&client).await,
            "2" => list_chats(&client).await,
            "3" => load_older_chats(&client).await,
            "4" => open_chat(&client).await,
            "5" => send_message(&client).await,
            "6" => list_friends(&client).await,
            "7" => simulate_incoming(&backend).await,
            "8" => close_chat(&client).await,
            "9" => sign_out(&client).await,
            "0" => {
                println!("👋 Shutting down...");
                client.stop().await;
                break;
            }
            _ => {
                println!("❌ Invalid choice");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("❌ {e}");
        }
    }

    Ok(())
}

fn print_menu() {
    println!();
    println!("╔════════════════════════════════════╗");
    println!("║            PIGEON CLI              ║");
    println!("╠════════════════════════════════════╣");
    println!("║  1. Sign In                        ║");
    println!("║  2. List Chats                     ║");
    println!("║  3. Load Older Chats               ║");
    println!("║  4. Open Chat                      ║");
    println!("║  5. Send Message                   ║");
    println!("║  6. List Friends                   ║");
    println!("║  7. Simulate Incoming Message      ║");
    println!("║  8. Close Chat                     ║");
    println!("║  9. Sign Out                       ║");
    println!("║  0. Exit                           ║");
    println!("╚════════════════════════════════════╝");
}

async fn handle_event(client: &Arc<PigeonClient>, event: SyncEvent) {
    match event {
        SyncEvent::SignedIn { user_id } => {
            println!("\n✅ Signed in as {user_id}");
        }
        SyncEvent::SignedOut => {
            println!("\n🚪 Signed out");
        }
        SyncEvent::NewMessage {
            chat_id,
            sender_id,
            preview,
            timestamp,
        } => {
            let push = PushMessage {
                chat_id: chat_id.clone(),
                sender_id: sender_id.clone(),
                preview: preview.clone(),
                timestamp,
            };
            match client.should_notify(&push).await {
                Ok(NotificationDecision::Show) => {
                    println!("\n🔔 {sender_id} in {chat_id}: {preview}");
                }
                Ok(NotificationDecision::Suppress) => {
                    println!("\n💬 {sender_id}: {preview}");
                }
                Err(e) => tracing::warn!("notification decision failed: {e}"),
            }
        }
        SyncEvent::SubscriptionLost { collection, error } => {
            println!("\n⚠️  Subscription {collection} lost: {error} (reconnecting)");
        }
        SyncEvent::AuthExpired { collection, error } => {
            println!("\n🔒 Subscription {collection} needs re-authentication: {error}");
        }
        SyncEvent::Error { error } => {
            println!("\n❌ Error: {error}");
        }
        other => {
            tracing::debug!("event: {other:?}");
        }
    }
}

async fn sign_in(client: &Arc<PigeonClient>) -> Result<()> {
    let email = read_line(&format!("Email [{DEMO_EMAIL}]: "))?;
    let password = read_line(&format!("Password [{DEMO_PASSWORD}]: "))?;

    let email = if email.is_empty() {
        DEMO_EMAIL.to_string()
    } else {
        email
    };
    let password = if password.is_empty() {
        DEMO_PASSWORD.to_string()
    } else {
        password
    };

    let user = client
        .sign_in(AuthCredentials::EmailPassword { email, password })
        .await?;
    println!(
        "🔑 Welcome back, {}",
        user.display_name.unwrap_or(user.user_id)
    );
    Ok(())
}

async fn list_chats(client: &Arc<PigeonClient>) -> Result<()> {
    let chats = client.chats();
    let snapshot = chats.snapshot().await?;

    if snapshot.is_empty() {
        println!("📭 No chats loaded");
        return Ok(());
    }

    println!("\n💬 Chats ({}):", snapshot.len());
    for chat in &snapshot {
        let preview = chat
            .last_message
            .as_ref()
            .map(|m| m.preview())
            .unwrap_or_default();
        println!(
            "  {} — {} [{}]",
            chat.display_title(),
            truncate(&preview, 40),
            format_time(chat.last_message_timestamp)
        );
    }
    Ok(())
}

async fn load_older_chats(client: &Arc<PigeonClient>) -> Result<()> {
    let chats = client.chats();
    match chats.load_more().await? {
        PageOutcome::Loaded(n) => println!("📥 Loaded {n} older chats"),
        PageOutcome::Cached(n) => println!("📦 {n} chats already cached"),
        PageOutcome::End => println!("🏁 No older chats"),
    }
    Ok(())
}

async fn open_chat(client: &Arc<PigeonClient>) -> Result<()> {
    let chat_id = read_line("Chat id: ")?;
    if chat_id.is_empty() {
        println!("❌ Chat id required");
        return Ok(());
    }

    client.open_chat(&chat_id).await?;

    let thread = client.messages(&chat_id);
    let snapshot = thread.snapshot().await?;

    println!("\n📖 {chat_id} ({} messages):", snapshot.len());
    for message in snapshot.iter().rev() {
        println!(
            "  [{}] {}: {}",
            format_time(message.timestamp),
            message.sender_id,
            message.content.preview()
        );
    }
    println!("👀 Chat is now on screen; its notifications are suppressed");
    Ok(())
}

async fn send_message(client: &Arc<PigeonClient>) -> Result<()> {
    let chat_id = read_line("Chat id: ")?;
    let text = read_line("Message: ")?;
    if chat_id.is_empty() || text.is_empty() {
        println!("❌ Chat id and message required");
        return Ok(());
    }

    let sent = client
        .send_message(&chat_id, MessageContent::text(text))
        .await?;
    println!("📤 Sent {}", sent.message_id);
    Ok(())
}

async fn list_friends(client: &Arc<PigeonClient>) -> Result<()> {
    let friends = client.friends();
    let snapshot = friends.snapshot().await?;

    if snapshot.is_empty() {
        println!("📭 No friends loaded");
        return Ok(());
    }

    println!("\n📇 Friends ({}):", snapshot.len());
    for friend in &snapshot {
        println!(
            "  {} — {}",
            friend.display_name(),
            friend.status.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Push a message into the remote collection, as another device would.
async fn simulate_incoming(backend: &Arc<MemoryBackend>) -> Result<()> {
    let chat_id = read_line("Chat id: ")?;
    let text = read_line("Message text: ")?;
    if chat_id.is_empty() || text.is_empty() {
        println!("❌ Chat id and text required");
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp_millis();
    backend
        .message_collection(&chat_id)
        .push(MessageData {
            message_id: format!("sim-{now}"),
            chat_id: chat_id.clone(),
            sender_id: "ursula".to_string(),
            content: MessageContent::text(text.clone()),
            timestamp: now,
        })
        .await;

    // Keep the chat list consistent with the new message.
    if let Some(mut chat) = backend
        .chat_collection()
        .fetch_by_id(&chat_id)
        .await
        .ok()
        .flatten()
    {
        chat.last_message = Some(MessageContent::text(text));
        chat.last_message_timestamp = now;
        backend.chat_collection().push_update(chat).await;
    }

    println!("📡 Pushed remote message into {chat_id}");
    Ok(())
}

async fn close_chat(client: &Arc<PigeonClient>) -> Result<()> {
    client.close_chat().await?;
    println!("🔙 Back to the chat list");
    Ok(())
}

async fn sign_out(client: &Arc<PigeonClient>) -> Result<()> {
    client.sign_out().await?;
    Ok(())
}

async fn seed_backend(backend: &Arc<MemoryBackend>, auth: &Arc<MemoryAuth>) {
    auth.register(
        DEMO_EMAIL,
        DEMO_PASSWORD,
        AuthUser {
            user_id: "demo".to_string(),
            email: Some(DEMO_EMAIL.to_string()),
            display_name: Some("Demo".to_string()),
            photo_url: None,
            email_verified: true,
        },
    )
    .await;

    let now = chrono::Utc::now().timestamp_millis();
    let chats: Vec<ChatData> = (1..=30)
        .map(|i| ChatData {
            chat_id: format!("room-{i:02}"),
            title: Some(format!("Room {i}")),
            photo_url: None,
            last_message: Some(MessageContent::text(format!("latest in room {i}"))),
            last_message_timestamp: now - (30 - i) * 60_000,
            members: vec!["demo".to_string(), "ursula".to_string()],
        })
        .collect();
    backend.chat_collection().seed(chats).await;

    let messages: Vec<MessageData> = (1..=40)
        .map(|i| MessageData {
            message_id: format!("m{i:03}"),
            chat_id: "room-30".to_string(),
            sender_id: if i % 2 == 0 { "demo" } else { "ursula" }.to_string(),
            content: MessageContent::text(format!("message number {i}")),
            timestamp: now - (40 - i) * 30_000,
        })
        .collect();
    backend.message_collection("room-30").seed(messages).await;

    backend
        .friend_collection()
        .seed(vec![UserData {
            user_id: "ursula".to_string(),
            display_name: Some("Ursula".to_string()),
            email: Some("ursula@pigeon.im".to_string()),
            photo_url: None,
            status: Some("carrier pigeon enthusiast".to_string()),
            last_seen: now,
            added_at: now - 86_400_000,
        }])
        .await;
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
