mod auth;
mod collection;
mod error;
pub mod memory;

pub use auth::{AuthClient, AuthCredentials, AuthState, AuthUser};
pub use collection::{EventStream, RemoteBackend, RemoteCollection};
pub use error::RemoteError;

pub type Result<T> = std::result::Result<T, RemoteError>;
