use std::sync::Arc;

use tokio::sync::mpsc;

use pigeon_remote::AuthState;

use crate::client::PigeonClient;
use crate::events::SyncEvent;

/// Session loop: one long-lived listener on the auth-state stream. Signing
/// in mirrors the profile and attaches the chat/friend feeds; signing out
/// detaches everything. Runs until the stream ends or the client stops it.
pub(crate) async fn run(client: Arc<PigeonClient>, mut states: mpsc::Receiver<AuthState>) {
    while let Some(state) = states.recv().await {
        match state {
            AuthState::SignedIn(user) => {
                tracing::info!("signed in as {}", user.user_id);
                if let Err(e) = client.on_signed_in(&user).await {
                    tracing::error!("sign-in bookkeeping failed: {e}");
                    client
                        .emit(SyncEvent::Error {
                            error: e.to_string(),
                        })
                        .await;
                }
            }
            AuthState::SignedOut => {
                tracing::info!("signed out");
                if let Err(e) = client.on_signed_out().await {
                    tracing::error!("sign-out bookkeeping failed: {e}");
                }
            }
        }
    }

    tracing::debug!("auth state stream ended");
}
