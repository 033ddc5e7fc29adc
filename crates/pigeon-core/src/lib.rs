mod chat;
mod events;
mod message;
mod page;
mod screen;
mod user;

pub use chat::*;
pub use events::*;
pub use message::*;
pub use page::*;
pub use screen::*;
pub use user::*;
