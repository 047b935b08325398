//! Protocol messages for reconciliation.
//!
//! Messages travel as JSON text frames, internally tagged by `type`.

use crate::error::{ProtocolError, ProtocolResult};
use attsync_core::{Digest, Fact};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A reconciliation protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Phase 1: root digest announcement.
    Hello(Hello),
    /// Phase 2: per-group digests.
    GroupHashes(GroupHashes),
    /// Phase 3: group encodings the sender is missing.
    Need(Need),
    /// Phase 4: facts the peer asked for.
    Attestations(Attestations),
    /// Phase 5: orderly termination.
    Done(Done),
}

impl SyncMessage {
    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        match self {
            SyncMessage::Hello(_) => MessageKind::Hello,
            SyncMessage::GroupHashes(_) => MessageKind::GroupHashes,
            SyncMessage::Need(_) => MessageKind::Need,
            SyncMessage::Attestations(_) => MessageKind::Attestations,
            SyncMessage::Done(_) => MessageKind::Done,
        }
    }

    /// Encodes to a JSON string.
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decodes from a JSON string.
    ///
    /// A well-formed frame whose `type` names no known message is reported as
    /// [`ProtocolError::UnknownType`] rather than a decode failure.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        serde_json::from_str(text).map_err(|err| {
            match serde_json::from_str::<TypeTag>(text) {
                Ok(TypeTag { kind: Some(kind) }) if MessageKind::from_wire(&kind).is_none() => {
                    ProtocolError::UnknownType(kind)
                }
                _ => ProtocolError::Decode(err),
            }
        })
    }
}

/// Just the `type` field of a frame.
#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// The kind of a [`SyncMessage`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `hello`
    Hello,
    /// `group_hashes`
    GroupHashes,
    /// `need`
    Need,
    /// `attestations`
    Attestations,
    /// `done`
    Done,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Hello => "hello",
            MessageKind::GroupHashes => "group_hashes",
            MessageKind::Need => "need",
            MessageKind::Attestations => "attestations",
            MessageKind::Done => "done",
        }
    }

    /// Parses a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "hello" => Some(MessageKind::Hello),
            "group_hashes" => Some(MessageKind::GroupHashes),
            "need" => Some(MessageKind::Need),
            "attestations" => Some(MessageKind::Attestations),
            "done" => Some(MessageKind::Done),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root digest announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Sender's root digest.
    pub root_hash: Digest,
    /// Sender's human-readable name.
    #[serde(default)]
    pub peer_name: String,
}

impl Hello {
    /// Creates a hello message.
    pub fn new(root_hash: Digest, peer_name: impl Into<String>) -> Self {
        Self {
            root_hash,
            peer_name: peer_name.into(),
        }
    }
}

/// Per-group digests keyed by group encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHashes {
    /// Group encoding -> group digest.
    #[serde(default)]
    pub groups: BTreeMap<String, Digest>,
}

/// Group encodings the sender wants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Need {
    /// Requested group encodings.
    #[serde(default)]
    pub need: Vec<String>,
}

/// Facts keyed by the group encoding they were requested under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attestations {
    /// Group encoding -> facts.
    #[serde(default)]
    pub attestations: BTreeMap<String, Vec<Fact>>,
}

impl Attestations {
    /// Total number of facts across all groups.
    pub fn fact_count(&self) -> usize {
        self.attestations.values().map(Vec::len).sum()
    }
}

/// Termination acknowledgement with the sender's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Done {
    /// Facts the sender transmitted.
    #[serde(default)]
    pub sent: u64,
    /// Facts the sender applied.
    #[serde(default)]
    pub received: u64,
}

impl Done {
    /// Creates a done message.
    pub fn new(sent: u64, received: u64) -> Self {
        Self { sent, received }
    }
}
