use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone)]
pub enum AuthCredentials {
    EmailPassword { email: String, password: String },
    GoogleIdToken(String),
    FacebookAccessToken(String),
}

#[derive(Debug, Clone)]
pub enum AuthState {
    SignedIn(AuthUser),
    SignedOut,
}

/// The remote auth provider.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_in(&self, credentials: AuthCredentials) -> Result<AuthUser>;

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<AuthUser>;

    async fn sign_out(&self) -> Result<()>;

    async fn current_user(&self) -> Option<AuthUser>;

    async fn send_verification_email(&self) -> Result<()>;

    /// Auth-state change stream, open until the receiver is dropped.
    async fn subscribe(&self) -> Result<mpsc::Receiver<AuthState>>;
}
