//! Identifiers shared by the kiosk host, the joystick client and the transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every machine broadcast topic.
const TOPIC_PREFIX: &str = "joystick";

/// Number identifying a player seat inside a round.
pub type SlotId = u8;

/// Stable identifier of a physical kiosk terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Wrap a raw machine identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the broadcast topic scoped to this machine.
    pub fn topic(&self) -> String {
        format!("{TOPIC_PREFIX}:{}", self.0)
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ephemeral identifier minted by a phone on load; used as a slot capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random session identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session attribution carried by a message.
///
/// Legacy senders omit the session entirely; those messages decode to
/// [`SessionToken::Anonymous`], which never matches a slot owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum SessionToken {
    /// No session presented.
    #[default]
    Anonymous,
    /// A concrete session identifier.
    Session(SessionId),
}

impl SessionToken {
    /// Whether the sender presented no session.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Concrete session, if any.
    pub fn session(&self) -> Option<&SessionId> {
        match self {
            Self::Anonymous => None,
            Self::Session(id) => Some(id),
        }
    }

    /// Whether this token names exactly `session`.
    pub fn is(&self, session: &SessionId) -> bool {
        self.session() == Some(session)
    }
}

impl From<SessionId> for SessionToken {
    fn from(value: SessionId) -> Self {
        Self::Session(value)
    }
}

impl From<Option<String>> for SessionToken {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(id) if !id.trim().is_empty() => Self::Session(SessionId(id)),
            _ => Self::Anonymous,
        }
    }
}

impl From<SessionToken> for Option<String> {
    fn from(value: SessionToken) -> Self {
        match value {
            SessionToken::Anonymous => None,
            SessionToken::Session(id) => Some(id.0),
        }
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("<anonymous>"),
            Self::Session(id) => id.fmt(f),
        }
    }
}
