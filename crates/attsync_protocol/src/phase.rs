//! Reconciliation phase state machine.
//!
//! ```text
//! Idle ─hello→ HelloSent ─hello← HelloReceived ─┬─ roots equal ─→ InSync ─done→ DoneSent
//!                                               └─ roots differ → Diverged
//!   Diverged ─group_hashes→ GroupDigestsSent ─group_hashes← GroupDigestsExchanged
//!   GroupDigestsExchanged ─need→ NeedSent ─need← NeedExchanged
//!   NeedExchanged ─attestations→ AttestationsSent ─attestations← AttestationsExchanged
//!   AttestationsExchanged ─done→ DoneSent ─done← DoneExchanged
//!   (any) ─close→ Closed
//! ```
//!
//! Each step sends our half first and then accepts the peer's half. A phase
//! either sends exactly one message kind or accepts exactly one inbound kind,
//! never both. The transitions here are pure, so the ordering rules can be
//! checked without a network.

use crate::error::{Direction, ProtocolViolation};
use crate::messages::MessageKind;
use attsync_core::Digest;

/// A phase of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nothing sent yet.
    Idle,
    /// Local hello sent, waiting for the peer's.
    HelloSent,
    /// Both hellos exchanged; roots not yet compared.
    HelloReceived,
    /// Roots are equal; only the done exchange remains.
    InSync,
    /// Roots differ; group digests must be exchanged.
    Diverged,
    /// Local group digests sent, waiting for the peer's.
    GroupDigestsSent,
    /// Group digests exchanged; needs must be exchanged.
    GroupDigestsExchanged,
    /// Local need sent, waiting for the peer's.
    NeedSent,
    /// Needs exchanged; facts must be exchanged.
    NeedExchanged,
    /// Requested facts sent, waiting for the peer's.
    AttestationsSent,
    /// Facts exchanged and applied; done must be exchanged.
    AttestationsExchanged,
    /// Local done sent, waiting for the peer's.
    DoneSent,
    /// Done acknowledgements exchanged.
    DoneExchanged,
    /// Transport closed.
    Closed,
}

impl Phase {
    /// The message kind this phase may send.
    pub fn outbound(&self) -> Option<MessageKind> {
        match self {
            Phase::Idle => Some(MessageKind::Hello),
            Phase::Diverged => Some(MessageKind::GroupHashes),
            Phase::GroupDigestsExchanged => Some(MessageKind::Need),
            Phase::NeedExchanged => Some(MessageKind::Attestations),
            Phase::InSync | Phase::AttestationsExchanged => Some(MessageKind::Done),
            _ => None,
        }
    }

    /// The message kind this phase accepts from the peer.
    pub fn expected(&self) -> Option<MessageKind> {
        match self {
            Phase::HelloSent => Some(MessageKind::Hello),
            Phase::GroupDigestsSent => Some(MessageKind::GroupHashes),
            Phase::NeedSent => Some(MessageKind::Need),
            Phase::AttestationsSent => Some(MessageKind::Attestations),
            Phase::DoneSent => Some(MessageKind::Done),
            _ => None,
        }
    }

    /// Transition after sending a message.
    pub fn sent(self, kind: MessageKind) -> Result<Phase, ProtocolViolation> {
        let next = match (self, kind) {
            (Phase::Idle, MessageKind::Hello) => Phase::HelloSent,
            (Phase::Diverged, MessageKind::GroupHashes) => Phase::GroupDigestsSent,
            (Phase::GroupDigestsExchanged, MessageKind::Need) => Phase::NeedSent,
            (Phase::NeedExchanged, MessageKind::Attestations) => Phase::AttestationsSent,
            (Phase::InSync | Phase::AttestationsExchanged, MessageKind::Done) => Phase::DoneSent,
            _ => return Err(self.violation(self.outbound(), kind, Direction::Sent)),
        };
        Ok(next)
    }

    /// Transition after receiving a message.
    pub fn received(self, kind: MessageKind) -> Result<Phase, ProtocolViolation> {
        let next = match (self, kind) {
            (Phase::HelloSent, MessageKind::Hello) => Phase::HelloReceived,
            (Phase::GroupDigestsSent, MessageKind::GroupHashes) => Phase::GroupDigestsExchanged,
            (Phase::NeedSent, MessageKind::Need) => Phase::NeedExchanged,
            (Phase::AttestationsSent, MessageKind::Attestations) => Phase::AttestationsExchanged,
            (Phase::DoneSent, MessageKind::Done) => Phase::DoneExchanged,
            _ => return Err(self.violation(self.expected(), kind, Direction::Received)),
        };
        Ok(next)
    }

    /// Branches on the root comparison once both hellos are known.
    ///
    /// Outside `HelloReceived` the phase is returned unchanged.
    pub fn compare_roots(self, local: &Digest, remote: &Digest) -> Phase {
        match self {
            Phase::HelloReceived if local == remote => Phase::InSync,
            Phase::HelloReceived => Phase::Diverged,
            other => other,
        }
    }

    /// Closing is valid from every phase.
    pub fn close(self) -> Phase {
        Phase::Closed
    }

    /// Returns true once the cycle has finished its message exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::DoneExchanged | Phase::Closed)
    }

    fn violation(
        self,
        expected: Option<MessageKind>,
        got: MessageKind,
        direction: Direction,
    ) -> ProtocolViolation {
        ProtocolViolation {
            phase: self,
            expected,
            got,
            direction,
        }
    }
}
