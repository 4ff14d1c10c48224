use std::fmt;

use crate::{Address, ParticipantId};

/// Idempotency key of a qualifying event, e.g. a transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EventId(String);

impl EventId {
    /// Create a new event id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kind of a qualifying event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum EventKind {
    /// A participant registered with an optional referrer.
    Register {
        /// Participant.
        participant: ParticipantId,
        /// Payment address.
        address: Address,
        /// Referrer.
        ancestor: Option<ParticipantId>,
    },
    /// The participant got their second direct referral and enters auto-pool.
    SecondReferral {
        /// Participant.
        participant: ParticipantId,
        /// Referrer.
        ancestor: Option<ParticipantId>,
    },
    /// The participant performed a retopup.
    Retopup {
        /// Participant.
        participant: ParticipantId,
    },
}

impl EventKind {
    /// The participant the event is about.
    pub fn participant(&self) -> ParticipantId {
        match self {
            Self::Register { participant, .. }
            | Self::SecondReferral { participant, .. }
            | Self::Retopup { participant } => *participant,
        }
    }

    /// Short name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::SecondReferral { .. } => "second_referral",
            Self::Retopup { .. } => "retopup",
        }
    }
}

/// A qualifying event delivered by the event source, at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualifyingEvent {
    /// Idempotency key.
    pub id: EventId,
    /// Kind.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: EventKind,
}

impl QualifyingEvent {
    /// Create a new event.
    pub fn new(id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: EventId::new(id),
            kind,
        }
    }
}
