//! Checksum-based divergence detection.
//!
//! Participants periodically report a checksum of their text. A report that
//! still describes the current channel state is compared with the host's
//! own text; a mismatch means the replica diverged even though the
//! timestamps agree. The checker only detects and signals. Deciding between
//! a proxy reset and a full resync is up to the session manager.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use tandem_ot::{ChecksumRecord, DocumentChecksum, DocumentPath, ParticipantId, Result};

use crate::{SessionEvent, SessionHub};

/// Result of checking one checksum report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The report no longer describes a reachable state and was discarded.
    Stale,
    /// The report matches the host. `outbound` carries it re-stamped for
    /// every other participant.
    Consistent {
        outbound: BTreeMap<ParticipantId, ChecksumRecord>,
    },
    /// The report is current but disagrees with the host.
    Diverged {
        participant: ParticipantId,
        expected: DocumentChecksum,
        outbound: BTreeMap<ParticipantId, ChecksumRecord>,
    },
}

/// Watches checksum reports across all documents of a hub.
pub struct ConsistencyChecker {
    hub: Arc<SessionHub>,
    diverged: Mutex<BTreeSet<(DocumentPath, ParticipantId)>>,
}

impl ConsistencyChecker {
    pub fn new(hub: Arc<SessionHub>) -> Self {
        Self {
            hub,
            diverged: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// Check a participant's report against the host's text.
    ///
    /// Staleness, re-stamping and the host checksum are all taken under the
    /// document's lock, so they describe one state.
    pub fn check(&self, report: &ChecksumRecord) -> Result<CheckOutcome> {
        let checked = self.hub.with_document(&report.path, |server| {
            if !server.is_current(report)? {
                return Ok(None);
            }
            Ok(Some((server.with_timestamp(report)?, server.checksum())))
        })?;

        let Some((outbound, expected)) = checked else {
            tracing::debug!(
                "{}: stale checksum from {} at {}",
                report.path,
                report.source,
                report.timestamp
            );
            return Ok(CheckOutcome::Stale);
        };

        let key = (report.path.clone(), report.source.clone());
        if report.checksum == expected {
            if self.diverged.lock().remove(&key) {
                tracing::info!("{}: {} is consistent again", report.path, report.source);
            }
            return Ok(CheckOutcome::Consistent { outbound });
        }

        tracing::warn!(
            "{}: divergence detected for {} at {}: expected {}, got {}",
            report.path,
            report.source,
            report.timestamp,
            expected,
            report.checksum
        );
        self.diverged.lock().insert(key);
        self.hub.emit(SessionEvent::DivergenceDetected {
            path: report.path.clone(),
            participant: report.source.clone(),
            expected,
            reported: report.checksum,
        });

        Ok(CheckOutcome::Diverged {
            participant: report.source.clone(),
            expected,
            outbound,
        })
    }

    pub fn is_diverged(&self, path: &DocumentPath, participant: &ParticipantId) -> bool {
        self.diverged
            .lock()
            .contains(&(path.clone(), participant.clone()))
    }

    /// Diverged (document, participant) pairs awaiting resolution.
    pub fn diverged(&self) -> Vec<(DocumentPath, ParticipantId)> {
        self.diverged.lock().iter().cloned().collect()
    }

    /// Forget a divergence, e.g. after an out-of-band resync. Returns
    /// whether one was recorded.
    pub fn resolve(&self, path: &DocumentPath, participant: &ParticipantId) -> bool {
        self.diverged
            .lock()
            .remove(&(path.clone(), participant.clone()))
    }

    /// Reset the participant's proxy and forget its divergence.
    pub fn reset_participant(&self, path: &DocumentPath, participant: &ParticipantId) -> Result<bool> {
        let reset = self.hub.reset(path, participant)?;
        self.resolve(path, participant);
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_ot::{Operation, OtError, Replica};

    use crate::EngineConfig;
    use crate::hub::shared_session_hub;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn doc1() -> DocumentPath {
        DocumentPath::parse("doc1").unwrap()
    }

    fn setup() -> ConsistencyChecker {
        let hub = shared_session_hub(EngineConfig::default());
        hub.share_document(doc1(), "abc");
        for id in ["alice", "bob"] {
            hub.add_participant(&doc1(), &pid(id)).unwrap();
        }
        ConsistencyChecker::new(hub)
    }

    fn replica(id: &str, content: &str) -> Replica {
        Replica::new(pid(id), pid("host"), doc1(), content)
    }

    #[test]
    fn test_matching_report_is_consistent() {
        let checker = setup();
        let outcome = checker.check(&replica("alice", "abc").checksum()).unwrap();
        match outcome {
            CheckOutcome::Consistent { outbound } => {
                assert_eq!(outbound.len(), 1);
                assert!(outbound.contains_key(&pid("bob")));
            }
            other => panic!("expected consistent, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_report_is_discarded() {
        let checker = setup();
        let mut alice = replica("alice", "abc");
        let stale = alice.checksum();
        let edit = alice.edit(Operation::insert(0, "x")).unwrap();
        checker.hub().transform_activity(&edit).unwrap();

        assert_eq!(checker.check(&stale).unwrap(), CheckOutcome::Stale);
        assert!(checker.diverged().is_empty());
    }

    #[test]
    fn test_mismatch_signals_divergence() {
        let checker = setup();
        let mut events = checker.hub().subscribe();

        let outcome = checker.check(&replica("alice", "abX").checksum()).unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Diverged { ref participant, .. } if *participant == pid("alice")
        ));
        assert!(checker.is_diverged(&doc1(), &pid("alice")));
        assert!(!checker.is_diverged(&doc1(), &pid("bob")));

        match events.try_recv().unwrap() {
            SessionEvent::DivergenceDetected { participant, expected, reported, .. } => {
                assert_eq!(participant, pid("alice"));
                assert_eq!(expected, DocumentChecksum::of("abc"));
                assert_eq!(reported, DocumentChecksum::of("abX"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reset_participant_clears_divergence() {
        let checker = setup();
        checker.check(&replica("alice", "abX").checksum()).unwrap();

        assert!(checker.reset_participant(&doc1(), &pid("alice")).unwrap());
        assert!(!checker.is_diverged(&doc1(), &pid("alice")));
    }

    #[test]
    fn test_consistent_report_resolves_divergence() {
        let checker = setup();
        checker.check(&replica("alice", "abX").checksum()).unwrap();
        checker.check(&replica("alice", "abc").checksum()).unwrap();
        assert!(checker.diverged().is_empty());
        assert!(!checker.resolve(&doc1(), &pid("alice")));
    }

    #[test]
    fn test_unknown_reporter_is_an_error() {
        let checker = setup();
        assert!(matches!(
            checker.check(&replica("mallory", "abc").checksum()),
            Err(OtError::UnknownParticipant { .. })
        ));
    }
}
