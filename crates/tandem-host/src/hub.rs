//! Registry of shared documents with per-document locking.
//!
//! # Concurrency Model
//!
//! - DashMap from document path to its server
//! - One parking_lot mutex per document; every operation on a document holds
//!   it for its whole (bounded, non-blocking) duration
//! - Different documents never contend
//! - Event broadcasting for join/leave/reset/divergence

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use tandem_ot::{
    Activity, ChecksumRecord, DocumentChecksum, DocumentPath, OtError, ParticipantId, Result,
    VectorTimestamp,
};

use crate::{DocumentServer, EngineConfig};

/// Exclusive-access handle to one document's state.
pub type SharedDocumentServer = Arc<Mutex<DocumentServer>>;

/// Events broadcast when sessions change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A document started being shared.
    DocumentShared { path: DocumentPath },
    /// A document stopped being shared; all its proxies are gone.
    DocumentUnshared { path: DocumentPath },
    ParticipantJoined {
        path: DocumentPath,
        participant: ParticipantId,
    },
    ParticipantLeft {
        path: DocumentPath,
        participant: ParticipantId,
    },
    /// The participant's proxy was replaced; it needs the full document.
    ParticipantReset {
        path: DocumentPath,
        participant: ParticipantId,
    },
    /// A current checksum from the participant disagrees with the host.
    DivergenceDetected {
        path: DocumentPath,
        participant: ParticipantId,
        expected: DocumentChecksum,
        reported: DocumentChecksum,
    },
}

/// All shared documents of one host.
pub struct SessionHub {
    documents: DashMap<DocumentPath, SharedDocumentServer>,
    config: EngineConfig,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHub {
    pub fn new(config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            documents: DashMap::new(),
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the event receiver for subscribing to session changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Start sharing `path`. If it is already shared the existing session is
    /// returned and `content` is ignored.
    pub fn share_document(&self, path: DocumentPath, content: impl Into<String>) -> SharedDocumentServer {
        let (doc, created) = match self.documents.entry(path.clone()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                let doc = Arc::new(Mutex::new(DocumentServer::new(
                    path.clone(),
                    content,
                    &self.config,
                )));
                e.insert(Arc::clone(&doc));
                (doc, true)
            }
        };

        if created {
            tracing::info!("sharing document {}", path);
            self.emit(SessionEvent::DocumentShared { path });
        }
        doc
    }

    /// Stop sharing `path`. Returns whether it was shared.
    pub fn unshare_document(&self, path: &DocumentPath) -> bool {
        let removed = self.documents.remove(path).is_some();
        if removed {
            tracing::info!("unshared document {}", path);
            self.emit(SessionEvent::DocumentUnshared { path: path.clone() });
        }
        removed
    }

    pub fn document(&self, path: &DocumentPath) -> Option<SharedDocumentServer> {
        self.documents.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Shared document paths, sorted.
    pub fn documents(&self) -> Vec<DocumentPath> {
        let mut paths: Vec<_> = self.documents.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Run `f` with exclusive access to the document at `path`.
    ///
    /// The map entry is released before locking, so a long holder of one
    /// document never blocks lookups of another.
    pub fn with_document<T>(
        &self,
        path: &DocumentPath,
        f: impl FnOnce(&mut DocumentServer) -> Result<T>,
    ) -> Result<T> {
        let doc = self
            .document(path)
            .ok_or_else(|| OtError::UnknownDocument(path.clone()))?;
        let mut server = doc.lock();
        f(&mut server)
    }

    // =========================================================================
    // Routed session operations
    // =========================================================================

    pub fn add_participant(&self, path: &DocumentPath, id: &ParticipantId) -> Result<()> {
        let created = self.with_document(path, |server| Ok(server.add_participant(id.clone())))?;
        if created {
            self.emit(SessionEvent::ParticipantJoined {
                path: path.clone(),
                participant: id.clone(),
            });
        }
        Ok(())
    }

    pub fn remove_participant(&self, path: &DocumentPath, id: &ParticipantId) -> Result<bool> {
        let removed = self.with_document(path, |server| Ok(server.remove_participant(id)))?;
        if removed {
            self.emit(SessionEvent::ParticipantLeft {
                path: path.clone(),
                participant: id.clone(),
            });
        }
        Ok(removed)
    }

    /// Route an activity to its document and fan it out.
    pub fn transform_activity(&self, activity: &Activity) -> Result<BTreeMap<ParticipantId, Activity>> {
        self.with_document(&activity.path, |server| server.transform_activity(activity))
            .inspect_err(|e| {
                tracing::warn!("{}: activity from {} rejected: {}", activity.path, activity.source, e);
            })
    }

    pub fn update_vector_time(
        &self,
        path: &DocumentPath,
        source: &ParticipantId,
        dest: &ParticipantId,
    ) -> Result<bool> {
        self.with_document(path, |server| Ok(server.update_vector_time(source, dest)))
    }

    /// The host's timestamp on its channel with `id`. A late joiner seeded
    /// through `update_vector_time` starts its replica from this.
    pub fn timestamp_of(
        &self,
        path: &DocumentPath,
        id: &ParticipantId,
    ) -> Result<Option<VectorTimestamp>> {
        self.with_document(path, |server| Ok(server.timestamp_of(id)))
    }

    pub fn reset(&self, path: &DocumentPath, id: &ParticipantId) -> Result<bool> {
        let reset = self.with_document(path, |server| Ok(server.reset(id)))?;
        if reset {
            self.emit(SessionEvent::ParticipantReset {
                path: path.clone(),
                participant: id.clone(),
            });
        }
        Ok(reset)
    }

    pub fn with_timestamp(
        &self,
        record: &ChecksumRecord,
    ) -> Result<BTreeMap<ParticipantId, ChecksumRecord>> {
        self.with_document(&record.path, |server| server.with_timestamp(record))
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Create a new shared SessionHub.
pub fn shared_session_hub(config: EngineConfig) -> Arc<SessionHub> {
    Arc::new(SessionHub::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_ot::{Operation, Replica};

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn path(s: &str) -> DocumentPath {
        DocumentPath::parse(s).unwrap()
    }

    #[test]
    fn test_share_is_idempotent() {
        let hub = SessionHub::default();
        let mut events = hub.subscribe();

        let first = hub.share_document(path("doc1"), "abc");
        let second = hub.share_document(path("doc1"), "ignored");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().content(), "abc");

        assert_eq!(events.try_recv().unwrap(), SessionEvent::DocumentShared { path: path("doc1") });
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_unshare_drops_session() {
        let hub = SessionHub::default();
        hub.share_document(path("doc1"), "");
        hub.add_participant(&path("doc1"), &pid("alice")).unwrap();

        assert!(hub.unshare_document(&path("doc1")));
        assert!(!hub.unshare_document(&path("doc1")));
        assert!(hub.document(&path("doc1")).is_none());
        assert_eq!(
            hub.add_participant(&path("doc1"), &pid("alice")),
            Err(OtError::UnknownDocument(path("doc1")))
        );
    }

    #[test]
    fn test_membership_events() {
        let hub = SessionHub::default();
        hub.share_document(path("doc1"), "");
        let mut events = hub.subscribe();

        hub.add_participant(&path("doc1"), &pid("alice")).unwrap();
        hub.add_participant(&path("doc1"), &pid("alice")).unwrap();
        assert!(hub.reset(&path("doc1"), &pid("alice")).unwrap());
        assert!(hub.remove_participant(&path("doc1"), &pid("alice")).unwrap());
        assert!(!hub.reset(&path("doc1"), &pid("alice")).unwrap());

        let participant = pid("alice");
        let doc = path("doc1");
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ParticipantJoined { path: doc.clone(), participant: participant.clone() }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ParticipantReset { path: doc.clone(), participant: participant.clone() }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ParticipantLeft { path: doc, participant }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_documents_sorted() {
        let hub = SessionHub::default();
        hub.share_document(path("b.txt"), "");
        hub.share_document(path("a.txt"), "");
        assert_eq!(hub.documents(), vec![path("a.txt"), path("b.txt")]);
    }

    #[test]
    fn test_transform_routes_by_path() {
        let hub = SessionHub::default();
        for doc in ["doc1", "doc2"] {
            hub.share_document(path(doc), "abc");
            hub.add_participant(&path(doc), &pid("alice")).unwrap();
            hub.add_participant(&path(doc), &pid("bob")).unwrap();
        }

        let mut alice = Replica::new(pid("alice"), pid("host"), path("doc2"), "abc");
        let out = hub
            .transform_activity(&alice.edit(Operation::insert(3, "!")).unwrap())
            .unwrap();
        assert_eq!(out.len(), 1);

        assert_eq!(hub.document(&path("doc1")).unwrap().lock().content(), "abc");
        assert_eq!(hub.document(&path("doc2")).unwrap().lock().content(), "abc!");
    }

    #[test]
    fn test_unknown_document_is_an_error() {
        let hub = SessionHub::default();
        let mut alice = Replica::new(pid("alice"), pid("host"), path("nowhere"), "");
        let activity = alice.edit(Operation::insert(0, "a")).unwrap();
        assert_eq!(
            hub.transform_activity(&activity),
            Err(OtError::UnknownDocument(path("nowhere")))
        );
    }

    #[test]
    fn test_documents_progress_in_parallel() {
        let hub = shared_session_hub(EngineConfig::default());
        let docs: Vec<_> = (0..4).map(|n| path(&format!("doc{n}"))).collect();
        for doc in &docs {
            hub.share_document(doc.clone(), "");
            hub.add_participant(doc, &pid("alice")).unwrap();
            hub.add_participant(doc, &pid("bob")).unwrap();
        }

        std::thread::scope(|scope| {
            for doc in &docs {
                let hub = &hub;
                scope.spawn(move || {
                    let mut alice = Replica::new(pid("alice"), pid("host"), doc.clone(), "");
                    for _ in 0..100 {
                        let activity = alice.edit(Operation::insert(0, "a")).unwrap();
                        hub.transform_activity(&activity).unwrap();
                    }
                });
            }
        });

        for doc in &docs {
            let server = hub.document(doc).unwrap();
            let server = server.lock();
            assert_eq!(server.content().len(), 100);
            assert_eq!(server.timestamp_of(&pid("alice")), Some(VectorTimestamp::new(0, 100)));
            assert_eq!(server.timestamp_of(&pid("bob")), Some(VectorTimestamp::new(100, 0)));
        }
    }
}
