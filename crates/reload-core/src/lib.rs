//! Core reload-notification contract shared between clients and watchers.
//!
//! This crate defines the control-message taxonomy, the connection lifecycle
//! model, the bounded backoff primitive, and the common error types.

/// Stable error types for configuration, connection and transport failures.
pub mod error;
/// Bounded exponential backoff used by startup retry loops.
pub mod retry;
/// Connection lifecycle state machine.
pub mod state_machine;
/// Protocol types (message taxonomy, messages, connection states).
pub mod types;

pub use error::{ReloadError, ReloadErrorCategory, TransportError};
pub use retry::RetryPolicy;
pub use state_machine::ConnectionStateMachine;
pub use types::{ConnectionState, LinkStatus, Message, MessageType};
