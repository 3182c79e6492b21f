//! Inbound messages and outbound replies.
//!
//! The runtime never sees protocol frames: an adapter turns whatever its
//! network delivers into a [`Message`] and hands it over, and every reply a
//! handler produces comes back out as a [`Reply`] addressed to a [`Target`].

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Target
// =============================================================================

/// Where an outbound message is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// A multi-user room or channel.
    Room(String),
    /// A single user, usually a direct conversation.
    User(String),
}

impl Target {
    /// Returns the raw identifier regardless of kind.
    pub fn id(&self) -> &str {
        match self {
            Self::Room(id) | Self::User(id) => id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(id) => write!(f, "room:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

// =============================================================================
// Message
// =============================================================================

/// A single inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The plain-text body as typed by the sender.
    pub body: String,
    /// Identifier of the sender on the chat network.
    pub sender: String,
    /// The room the message was posted in; `None` for direct messages.
    #[serde(default)]
    pub room: Option<String>,
}

impl Message {
    /// Creates a direct (one-to-one) message.
    pub fn direct(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            sender: sender.into(),
            room: None,
        }
    }

    /// Creates a message posted in a room.
    pub fn in_room(
        room: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            sender: sender.into(),
            room: Some(room.into()),
        }
    }

    /// Returns `true` when the message was not posted in a room.
    pub fn is_direct(&self) -> bool {
        self.room.is_none()
    }

    /// The target a reply to this message should go to.
    pub fn reply_target(&self) -> Target {
        match &self.room {
            Some(room) => Target::Room(room.clone()),
            None => Target::User(self.sender.clone()),
        }
    }

    /// Builds a reply to this message.
    pub fn reply(&self, text: impl Into<String>) -> Reply {
        Reply::new(self.reply_target(), text)
    }
}

// =============================================================================
// Reply
// =============================================================================

/// An outbound message produced by a handler or a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub target: Target,
    pub text: String,
}

impl Reply {
    pub fn new(target: Target, text: impl Into<String>) -> Self {
        Self {
            target,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_target_room() {
        let msg = Message::in_room("ops", "alice", "!status");
        assert!(!msg.is_direct());
        assert_eq!(msg.reply_target(), Target::Room("ops".into()));
    }

    #[test]
    fn test_reply_target_direct() {
        let msg = Message::direct("bob", "hello");
        assert!(msg.is_direct());
        let reply = msg.reply("hi");
        assert_eq!(reply.target, Target::User("bob".into()));
        assert_eq!(reply.text, "hi");
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Room("ops".into()).to_string(), "room:ops");
        assert_eq!(Target::User("bob".into()).id(), "bob");
    }
}
