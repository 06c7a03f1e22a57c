//! Authentication: credentials, sessions and the session registry.

pub mod credential;
pub mod manager;
pub mod session;

pub use credential::{Service, SessionToken, generate_hash, generate_identifier};
pub use manager::SessionManager;
pub use session::{RequestOptions, RetryPolicy, Session, SessionOptions};
