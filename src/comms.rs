//! Communication records exchanged between actors during a turn.
//!
//! A [`Communication`] is the primary message primitive of the simulation:
//! bilateral exchanges between two actors, coalition messages to a named
//! subset, or public broadcasts visible to everyone. Communications are
//! turn-scoped — each turn starts with an empty communication list and the
//! turn's traffic is archived with the turn's artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CommKind;

/// A single message exchange within a turn.
///
/// An empty `recipients` list means the message is public.
///
/// # Examples
///
/// ```
/// use turnloom::comms::Communication;
/// use turnloom::types::CommKind;
///
/// let dm = Communication::bilateral(3, "atlas", "borealis", "Shall we trade?");
/// assert_eq!(dm.kind, CommKind::Bilateral);
/// assert_eq!(dm.recipients, vec!["borealis".to_string()]);
///
/// let broadcast = Communication::public(3, "atlas", "I claim the northern pass.");
/// assert!(broadcast.recipients.is_empty());
/// ```
///
/// # Serialization
///
/// ```
/// use turnloom::comms::Communication;
///
/// let comm = Communication::public(1, "atlas", "hello");
/// let json = serde_json::to_string(&comm).unwrap();
/// let parsed: Communication = serde_json::from_str(&json).unwrap();
/// assert_eq!(comm, parsed);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    /// Turn in which the exchange happened.
    pub turn: u64,
    /// Name of the sending actor.
    pub sender: String,
    /// Receiving actors; empty means public.
    pub recipients: Vec<String>,
    /// Message body.
    pub content: String,
    /// Scope of the exchange.
    pub kind: CommKind,
    /// When the message was produced.
    pub timestamp: DateTime<Utc>,
}

impl Communication {
    /// Creates a bilateral message from one actor to another.
    #[must_use]
    pub fn bilateral(turn: u64, sender: &str, recipient: &str, content: &str) -> Self {
        Self {
            turn,
            sender: sender.to_string(),
            recipients: vec![recipient.to_string()],
            content: content.to_string(),
            kind: CommKind::Bilateral,
            timestamp: Utc::now(),
        }
    }

    /// Creates a coalition message addressed to a named subset of actors.
    #[must_use]
    pub fn coalition(turn: u64, sender: &str, recipients: Vec<String>, content: &str) -> Self {
        Self {
            turn,
            sender: sender.to_string(),
            recipients,
            content: content.to_string(),
            kind: CommKind::Coalition,
            timestamp: Utc::now(),
        }
    }

    /// Creates a public broadcast; the recipients list stays empty.
    #[must_use]
    pub fn public(turn: u64, sender: &str, content: &str) -> Self {
        Self {
            turn,
            sender: sender.to_string(),
            recipients: Vec::new(),
            content: content.to_string(),
            kind: CommKind::Public,
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` if the named actor can observe this message.
    ///
    /// Public messages are visible to everyone; otherwise visibility is the
    /// sender plus the listed recipients.
    #[must_use]
    pub fn visible_to(&self, actor: &str) -> bool {
        self.kind == CommKind::Public
            || self.sender == actor
            || self.recipients.iter().any(|r| r == actor)
    }
}
