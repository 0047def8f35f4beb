//! Jupiter state machine for one side of a two-party channel.
//!
//! A `TransformationProxy` stands in for one counterpart. On the host there
//! is one per participant (the counterpart is that participant); in a
//! [`Replica`](crate::Replica) there is exactly one (the counterpart is the
//! host). Both ends run the same algorithm, so the pair converges.
//!
//! # Bookkeeping
//!
//! ```text
//! timestamp.local   operations generated towards the counterpart
//! timestamp.remote  operations received from the counterpart
//! pending           generated operations the counterpart has not acknowledged,
//!                   indexed by their generation sequence number
//! ```
//!
//! An incoming activity's timestamp is in the counterpart's frame: its
//! `remote` component says how many of our operations it had seen, which
//! acknowledges (and discards) every pending entry below that number. The
//! incoming operation is then transformed past every entry still pending,
//! and each entry is transformed past the incoming operation.

use std::collections::VecDeque;

use tandem_types::{DocumentPath, ParticipantId};

use crate::transform::transform_pair;
use crate::{Activity, Desync, Operation, OtError, Result, VectorTimestamp};

/// A generated operation awaiting acknowledgement.
#[derive(Clone, Debug)]
struct PendingOp {
    /// Local count at generation.
    seq: u64,
    /// Original author, for tie-breaking.
    source: ParticipantId,
    operation: Operation,
}

/// Per-counterpart Jupiter state.
///
/// Single logical state ("active"); dropping it is the only exit.
#[derive(Clone, Debug)]
pub struct TransformationProxy {
    counterpart: ParticipantId,
    timestamp: VectorTimestamp,
    pending: VecDeque<PendingOp>,
}

/// An incoming activity transformed against the pending history but not yet
/// installed. Produced by [`TransformationProxy::prepare_receive`].
#[derive(Debug)]
#[must_use]
pub struct Received {
    base: VectorTimestamp,
    acknowledged: u64,
    operation: Operation,
    rewritten: Vec<Operation>,
}

impl Received {
    /// The canonical operation, valid once the pending history is applied.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

impl TransformationProxy {
    /// Fresh proxy with an empty history and a zero timestamp.
    pub fn new(counterpart: ParticipantId) -> Self {
        Self {
            counterpart,
            timestamp: VectorTimestamp::ZERO,
            pending: VecDeque::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn counterpart(&self) -> &ParticipantId {
        &self.counterpart
    }

    /// This side's view of the channel.
    pub fn timestamp(&self) -> VectorTimestamp {
        self.timestamp
    }

    /// Number of operations the counterpart has not acknowledged yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number of the oldest unacknowledged operation.
    pub fn oldest_pending(&self) -> Option<u64> {
        self.pending.front().map(|p| p.seq)
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Stamp `operation` for delivery to the counterpart and buffer it until
    /// acknowledged.
    ///
    /// `operation` must be defined on this side's current document state.
    /// No transformation happens here: the emitted timestamp tells the
    /// counterpart exactly which of its own operations this one has not seen,
    /// and it transforms on arrival.
    pub fn generate_for(
        &mut self,
        operation: Operation,
        source: &ParticipantId,
        path: &DocumentPath,
    ) -> Activity {
        let stamped = self.timestamp;
        self.pending.push_back(PendingOp {
            seq: stamped.local(),
            source: source.clone(),
            operation: operation.clone(),
        });
        self.timestamp = stamped.increment_local();

        tracing::trace!(
            "generated {} #{} for {} (pending={})",
            operation.kind(),
            stamped.local(),
            self.counterpart,
            self.pending.len()
        );

        Activity::new(source.clone(), path.clone(), stamped, operation)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Check `activity` against the history and transform it, without
    /// changing any state.
    pub fn prepare_receive(&self, activity: &Activity) -> Result<Received> {
        let incoming = activity.timestamp;
        self.check_preconditions(incoming)?;

        let acknowledged = incoming.remote();
        let mut operation = activity.operation.clone();
        let mut rewritten = Vec::with_capacity(self.pending.len());
        for entry in self.pending.iter().filter(|p| p.seq >= acknowledged) {
            let (op, existing) =
                transform_pair(&operation, &activity.source, &entry.operation, &entry.source);
            operation = op;
            rewritten.push(existing);
        }

        Ok(Received {
            base: self.timestamp,
            acknowledged,
            operation,
            rewritten,
        })
    }

    /// Install a prepared receive: discard acknowledged operations, keep the
    /// transformed history and advance the remote component.
    pub fn commit(&mut self, received: Received) -> Result<Operation> {
        if received.base != self.timestamp {
            return Err(OtError::desync(
                &self.counterpart,
                Desync::OutOfSequence {
                    expected: self.timestamp.remote(),
                    got: received.base.remote(),
                },
            ));
        }

        self.pending.retain(|p| p.seq >= received.acknowledged);
        for (entry, op) in self.pending.iter_mut().zip(received.rewritten) {
            entry.operation = op;
        }
        self.timestamp = self.timestamp.increment_remote();

        Ok(received.operation)
    }

    /// Transform an operation arriving from the counterpart into one that
    /// applies to this side's current state.
    pub fn receive(&mut self, activity: &Activity) -> Result<Operation> {
        let received = self.prepare_receive(activity)?;
        self.commit(received)
    }

    fn check_preconditions(&self, incoming: VectorTimestamp) -> Result<()> {
        // Everything below the oldest pending entry, or everything generated
        // when nothing is pending, is already acknowledged.
        let oldest = self.oldest_pending().unwrap_or(self.timestamp.local());
        if incoming.remote() < oldest {
            return Err(OtError::desync(
                &self.counterpart,
                Desync::StaleAcknowledgement {
                    acked: incoming.remote(),
                    oldest,
                },
            ));
        }
        if incoming.remote() > self.timestamp.local() {
            return Err(OtError::desync(
                &self.counterpart,
                Desync::FutureAcknowledgement {
                    acked: incoming.remote(),
                    generated: self.timestamp.local(),
                },
            ));
        }
        if incoming.local() != self.timestamp.remote() {
            return Err(OtError::desync(
                &self.counterpart,
                Desync::OutOfSequence {
                    expected: self.timestamp.remote(),
                    got: incoming.local(),
                },
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Timestamp management
    // =========================================================================

    /// Whether `timestamp`, in the counterpart's frame, describes exactly the
    /// channel state this side is in. Exact match, not a causal comparison.
    pub fn is_current(&self, timestamp: VectorTimestamp) -> bool {
        timestamp == self.timestamp.mirrored()
    }

    /// Reseed the timestamp. Refused while operations are unacknowledged.
    pub fn update_vector_time(&mut self, timestamp: VectorTimestamp) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(OtError::desync(
                &self.counterpart,
                Desync::PendingHistory {
                    pending: self.pending.len(),
                },
            ));
        }
        self.timestamp = timestamp;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> DocumentPath {
        DocumentPath::parse("doc1").unwrap()
    }

    fn host() -> ParticipantId {
        ParticipantId::new("host")
    }

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    fn bob() -> ParticipantId {
        ParticipantId::new("bob")
    }

    #[test]
    fn test_generate_stamps_then_advances_local() {
        let mut proxy = TransformationProxy::new(alice());
        let first = proxy.generate_for(Operation::insert(0, "a"), &bob(), &path());
        let second = proxy.generate_for(Operation::insert(1, "b"), &bob(), &path());

        assert_eq!(first.timestamp, VectorTimestamp::new(0, 0));
        assert_eq!(second.timestamp, VectorTimestamp::new(1, 0));
        assert_eq!(first.source, bob());
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(2, 0));
        assert_eq!(proxy.pending_len(), 2);
        assert_eq!(proxy.oldest_pending(), Some(0));
    }

    #[test]
    fn test_receive_without_concurrency_passes_through() {
        let mut proxy = TransformationProxy::new(alice());
        let activity = Activity::new(alice(), path(), VectorTimestamp::ZERO, Operation::insert(0, "x"));

        let op = proxy.receive(&activity).unwrap();
        assert_eq!(op, Operation::insert(0, "x"));
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(0, 1));
    }

    #[test]
    fn test_receive_transforms_against_unacknowledged() {
        // Host sent bob's insert to alice; alice concurrently deleted char 0.
        let mut proxy = TransformationProxy::new(alice());
        proxy.generate_for(Operation::insert(0, "x"), &bob(), &path());

        let concurrent = Activity::new(alice(), path(), VectorTimestamp::ZERO, Operation::delete(0, 1));
        let op = proxy.receive(&concurrent).unwrap();

        assert_eq!(op, Operation::delete(1, 1));
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(1, 1));
        assert_eq!(proxy.pending_len(), 1);
    }

    #[test]
    fn test_acknowledged_operations_are_discarded() {
        let mut proxy = TransformationProxy::new(alice());
        proxy.generate_for(Operation::insert(0, "x"), &bob(), &path());
        proxy.generate_for(Operation::insert(1, "y"), &bob(), &path());

        // Alice saw the first operation only.
        let activity = Activity::new(alice(), path(), VectorTimestamp::new(0, 1), Operation::insert(1, "!"));
        let op = proxy.receive(&activity).unwrap();

        // Both insert at 1 and alice sorts before bob, so hers stays put.
        assert_eq!(op, Operation::insert(1, "!"));
        assert_eq!(proxy.pending_len(), 1);
        assert_eq!(proxy.oldest_pending(), Some(1));
    }

    #[test]
    fn test_remote_component_grows_by_one() {
        let mut proxy = TransformationProxy::new(alice());
        for n in 0..5u64 {
            let before = proxy.timestamp();
            let activity = Activity::new(alice(), path(), VectorTimestamp::new(n, 0), Operation::insert(0, "a"));
            proxy.receive(&activity).unwrap();
            assert_eq!(proxy.timestamp().remote(), before.remote() + 1);
            assert_eq!(proxy.timestamp().local(), before.local());
        }
    }

    #[test]
    fn test_out_of_sequence_is_desync_and_leaves_state() {
        let mut proxy = TransformationProxy::new(alice());
        let skipped = Activity::new(alice(), path(), VectorTimestamp::new(1, 0), Operation::insert(0, "a"));

        let err = proxy.receive(&skipped).unwrap_err();
        assert_eq!(err.requires_reset(), Some(&alice()));
        assert!(matches!(
            err,
            OtError::ProtocolDesynchronization {
                reason: Desync::OutOfSequence { expected: 0, got: 1 },
                ..
            }
        ));
        assert_eq!(proxy.timestamp(), VectorTimestamp::ZERO);
    }

    #[test]
    fn test_future_acknowledgement_is_desync() {
        let mut proxy = TransformationProxy::new(alice());
        let activity = Activity::new(alice(), path(), VectorTimestamp::new(0, 3), Operation::NoOp);
        let err = proxy.receive(&activity).unwrap_err();
        assert!(matches!(
            err,
            OtError::ProtocolDesynchronization {
                reason: Desync::FutureAcknowledgement { acked: 3, generated: 0 },
                ..
            }
        ));
    }

    #[test]
    fn test_stale_acknowledgement_is_desync() {
        let mut proxy = TransformationProxy::new(alice());
        proxy.generate_for(Operation::insert(0, "x"), &bob(), &path());
        proxy.generate_for(Operation::insert(0, "y"), &bob(), &path());
        proxy
            .receive(&Activity::new(alice(), path(), VectorTimestamp::new(0, 1), Operation::NoOp))
            .unwrap();

        // Claims to have seen nothing after already acknowledging #0.
        let stale = Activity::new(alice(), path(), VectorTimestamp::new(1, 0), Operation::NoOp);
        let err = proxy.receive(&stale).unwrap_err();
        assert!(matches!(
            err,
            OtError::ProtocolDesynchronization {
                reason: Desync::StaleAcknowledgement { acked: 0, oldest: 1 },
                ..
            }
        ));
        assert_eq!(proxy.pending_len(), 1);
    }

    #[test]
    fn test_regressed_acknowledgement_after_full_ack_is_desync() {
        let mut proxy = TransformationProxy::new(alice());
        proxy.generate_for(Operation::insert(0, "x"), &bob(), &path());
        proxy.generate_for(Operation::insert(0, "y"), &bob(), &path());
        proxy
            .receive(&Activity::new(alice(), path(), VectorTimestamp::new(0, 2), Operation::NoOp))
            .unwrap();
        assert_eq!(proxy.pending_len(), 0);

        // Both were acknowledged; this one claims to have seen only #0.
        let regressed = Activity::new(alice(), path(), VectorTimestamp::new(1, 1), Operation::insert(0, "z"));
        let err = proxy.receive(&regressed).unwrap_err();
        assert!(matches!(
            err,
            OtError::ProtocolDesynchronization {
                reason: Desync::StaleAcknowledgement { acked: 1, oldest: 2 },
                ..
            }
        ));
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(2, 1));
    }

    #[test]
    fn test_commit_rejects_outdated_preparation() {
        let mut proxy = TransformationProxy::new(alice());
        let activity = Activity::new(alice(), path(), VectorTimestamp::ZERO, Operation::insert(0, "a"));
        let prepared = proxy.prepare_receive(&activity).unwrap();
        proxy.receive(&activity).unwrap();

        assert!(proxy.commit(prepared).is_err());
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(0, 1));
    }

    #[test]
    fn test_two_party_convergence() {
        // Host proxy for alice, and alice's proxy for the host.
        let mut at_host = TransformationProxy::new(alice());
        let mut at_alice = TransformationProxy::new(host());
        let mut host_doc = "abc".to_string();
        let mut alice_doc = "abc".to_string();

        let from_host = Operation::insert(3, "!");
        from_host.apply(&mut host_doc).unwrap();
        let to_alice = at_host.generate_for(from_host, &host(), &path());

        let from_alice = Operation::delete(1, 2);
        from_alice.apply(&mut alice_doc).unwrap();
        let to_host = at_alice.generate_for(from_alice, &alice(), &path());

        at_host.receive(&to_host).unwrap().apply(&mut host_doc).unwrap();
        at_alice.receive(&to_alice).unwrap().apply(&mut alice_doc).unwrap();

        assert_eq!(host_doc, "a!");
        assert_eq!(host_doc, alice_doc);
        assert!(at_host.is_current(at_alice.timestamp()));
        assert!(at_alice.is_current(at_host.timestamp()));
    }

    #[test]
    fn test_is_current_is_exact() {
        let mut proxy = TransformationProxy::new(alice());
        proxy.generate_for(Operation::insert(0, "x"), &bob(), &path());
        assert!(proxy.is_current(VectorTimestamp::new(0, 1)));
        assert!(!proxy.is_current(VectorTimestamp::new(0, 0)));
        assert!(!proxy.is_current(VectorTimestamp::new(1, 0)));
    }

    #[test]
    fn test_update_vector_time_requires_empty_history() {
        let mut proxy = TransformationProxy::new(alice());
        proxy.update_vector_time(VectorTimestamp::new(4, 2)).unwrap();
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(4, 2));

        proxy.generate_for(Operation::insert(0, "x"), &bob(), &path());
        let err = proxy.update_vector_time(VectorTimestamp::ZERO).unwrap_err();
        assert!(matches!(
            err,
            OtError::ProtocolDesynchronization {
                reason: Desync::PendingHistory { pending: 1 },
                ..
            }
        ));
        assert_eq!(proxy.timestamp(), VectorTimestamp::new(5, 2));
    }
}
