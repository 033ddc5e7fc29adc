mod chats;
mod error;
mod friends;
mod messages;
mod models;
mod notifier;
mod schema;
mod store;

pub use error::DbError;
pub use models::*;
pub use notifier::StoreChange;
pub use store::PigeonDb;

pub type Result<T> = std::result::Result<T, DbError>;
