//! # Volvo Connector
//!
//! Polls the Volvo Cars connected vehicle cloud API and maps the responses
//! into an observable vehicle model owned by the host application.
//!
//! ## Components
//!
//! - [`auth`]: credentials, authenticated sessions and the session registry
//! - [`cache`]: URL keyed response cache with age based freshness
//! - [`fetch`]: the cache aware fetch primitive used by every refresher
//! - [`poll`]: the background poll loop and its observables
//! - [`connector`]: lifecycle glue tying the above together
//!
//! The host supplies a [`model::Garage`], a [`store::TokenStore`], a
//! [`store::ResponseCacheStore`] and a [`transport::HttpTransport`]. In-memory
//! and file backed reference implementations are included.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod fetch;
pub mod model;
pub mod poll;
pub mod store;
pub mod test_utils;
pub mod transport;
mod util;

pub use auth::{Service, Session, SessionManager, SessionToken};
pub use cache::{CacheEntry, ResponseCache};
pub use config::{ConnectorConfig, MaxAge};
pub use connector::{Connector, ConnectorHost};
pub use error::{ConnectorError, CooldownClass, Result};
pub use fetch::{FetchOptions, Fetcher, RequestStats};
pub use poll::{ConnectionState, ConnectorStatus, PollCycle, PollLoop};
pub use store::{JsonFileStore, MemoryStore, ResponseCacheStore, StoredToken, TokenStore};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
pub use util::API_LOG_TARGET;
