//! Client half of the local reload notification channel.
//!
//! A [`ReloadManager`] connects to a running file watcher, announces itself,
//! and calls the application's [`Reloader`] whenever the watcher reports
//! that assets changed. Pings are answered and the session ends on a
//! shutdown notification, a lost connection, or [`ReloadManager::close`].

/// Environment-backed client configuration.
pub mod config;
/// Connection lifecycle and inbound message dispatch.
pub mod manager;
/// Application-supplied reload callback.
pub mod reloader;
/// Transport boundary and the Unix domain socket implementation.
pub mod transport;

#[cfg(test)]
mod mock;

pub use config::{CHANNEL_ENV, ClientConfig, ConfigError};
pub use manager::ReloadManager;
pub use reload_core::{
    ConnectionState, LinkStatus, Message, MessageType, ReloadError, ReloadErrorCategory,
    RetryPolicy, TransportError,
};
pub use reloader::Reloader;
pub use transport::{Connector, TransportHandle, UnixSocketConnector, UnixSocketHandle};
