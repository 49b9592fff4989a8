use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

/// Lifecycle state of one client connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel is open; `Run` has not been called or connecting failed.
    Disconnected,
    /// `Run` is opening the channel.
    Connecting,
    /// Channel is open and the read loop is dispatching messages.
    Connected,
    /// Channel was torn down. Terminal.
    Closed,
}

/// Link status as reported by the transport itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Control message taxonomy exchanged with the watcher process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Sent once by the client after connecting.
    Startup,
    /// Watcher asks the application to reload; payload is the hint.
    Reload,
    /// Client acknowledgement of `Reload`, echoing the hint.
    Reloaded,
    /// Watcher asks the client to disconnect.
    Shutdown,
    /// Keep-alive check from the watcher.
    Ping,
    /// Reply to `Ping`.
    Pong,
    /// Transport housekeeping, opaque to the protocol.
    Internal,
}

impl MessageType {
    /// Wire tag for this message type.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Startup => 1,
            Self::Reload => 2,
            Self::Reloaded => 3,
            Self::Shutdown => 4,
            Self::Ping => 5,
            Self::Pong => 6,
            Self::Internal => 255,
        }
    }

    /// Map a wire tag back to a message type. Unknown tags yield `None`.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Startup),
            2 => Some(Self::Reload),
            3 => Some(Self::Reloaded),
            4 => Some(Self::Shutdown),
            5 => Some(Self::Ping),
            6 => Some(Self::Pong),
            255 => Some(Self::Internal),
            _ => None,
        }
    }
}

/// One typed message as carried by the transport.
///
/// The tag is kept raw so that messages from a newer watcher with types this
/// client does not know still reach the dispatcher intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    tag: u8,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self::raw(message_type.tag(), payload)
    }

    pub fn empty(message_type: MessageType) -> Self {
        Self::raw(message_type.tag(), Vec::new())
    }

    pub fn raw(tag: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_tag(self.tag)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_type() {
            Some(message_type) => write!(f, "{message_type:?}")?,
            None => write!(f, "Unknown({})", self.tag)?,
        }
        write!(f, " ({} bytes)", self.payload.len())
    }
}
