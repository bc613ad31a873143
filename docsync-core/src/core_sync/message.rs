//! Addressed transport messages
//!
//! A [`Message`] is what the pub/sub transport carries. Its `data` field is a
//! codec envelope; everything else is routing metadata used to filter foreign,
//! echoed, misaddressed and cross-epoch traffic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use super::errors::{SyncError, SyncResult};

/// Identity of the logical document a provider replicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Randomly generated identity of one running provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const BROADCAST: &str = "broadcast";

/// Message recipient: every provider of the document, or exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Broadcast,
    Peer(InstanceId),
}

impl Target {
    /// Whether a provider with `instance` should accept a message sent to this target
    pub fn accepts(&self, instance: InstanceId) -> bool {
        match self {
            Target::Broadcast => true,
            Target::Peer(peer) => *peer == instance,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Broadcast => f.write_str(BROADCAST),
            Target::Peer(peer) => write!(f, "{}", peer),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == BROADCAST {
            return Ok(Target::Broadcast);
        }
        Uuid::parse_str(&raw)
            .map(|uuid| Target::Peer(InstanceId(uuid)))
            .map_err(|e| serde::de::Error::custom(format!("invalid target '{}': {}", raw, e)))
    }
}

/// A transport message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: DocumentId,
    pub data: Vec<u8>,
    pub sender_id: InstanceId,
    pub target_id: Target,
    pub clock: u64,
}

impl Message {
    pub fn new(
        id: DocumentId,
        data: Vec<u8>,
        sender_id: InstanceId,
        target_id: Target,
        clock: u64,
    ) -> Self {
        Self { id, data, sender_id, target_id, clock }
    }

    /// Serialize for transports that carry raw bytes
    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SyncError::Message(e.to_string()))
    }

    /// Parse bytes produced by [`Message::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        bincode::deserialize(bytes).map_err(|e| SyncError::Message(e.to_string()))
    }

    /// JSON form `{ id, data, senderId, targetId, clock }` for text transports
    pub fn to_json(&self) -> SyncResult<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Message(e.to_string()))
    }

    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Message(e.to_string()))
    }
}
