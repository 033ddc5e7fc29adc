mod client;
mod error;
mod events;
mod local;
mod merge;
mod notify;
mod paged;
mod pager;
mod session;

pub use client::PigeonClient;
pub use error::SyncError;
pub use events::SyncEvent;
pub use local::{ChatStore, FriendStore, LocalCollection, MessageStore};
pub use merge::{MergeOutcome, Merger};
pub use notify::{NotificationDecision, PushMessage, decide};
pub use paged::PagedStream;
pub use pager::{PageOutcome, Pager};

pub use pigeon_core::{
    ChatData, MessageContent, MessageData, ProfileData, Screen, UserData,
};
pub use pigeon_db::{PigeonDb, StoreChange};
pub use pigeon_remote::{AuthCredentials, AuthState, AuthUser};

pub type Result<T> = std::result::Result<T, SyncError>;
