use serde::{Deserialize, Serialize};

use crate::page::Entity;

/// A friend as mirrored from the remote friends list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub status: Option<String>,
    pub last_seen: i64,
    /// Ordering key: when the friendship was created on the remote side.
    pub added_at: i64,
}

impl UserData {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }
}

impl Entity for UserData {
    fn entity_id(&self) -> &str {
        &self.user_id
    }

    fn ordering_key(&self) -> i64 {
        self.added_at
    }
}

/// The signed-in user's own record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub status: Option<String>,
    pub last_seen: i64,
}
