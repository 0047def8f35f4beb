//! Document session multiplexer.
//!
//! A `DocumentServer` is the host's state for one shared document: the
//! authoritative text and one [`TransformationProxy`] per participant. An
//! activity from participant A is transformed through A's proxy into a
//! canonical operation on the host text, which every other proxy then stamps
//! for its own participant.
//!
//! All methods take `&mut self` or `&self`; exclusive access per document is
//! the caller's job (see [`SessionHub`](crate::SessionHub)).
//!
//! # Failure atomicity
//!
//! `transform_activity` validates everything (sender known, sender
//! timestamp consistent, recipients not backlogged, canonical operation fits
//! the host text) before mutating anything. A failed call leaves every proxy
//! and the host text exactly as they were; the error names the participant
//! whose proxy must be reset.

use std::collections::BTreeMap;

use tandem_ot::{
    Activity, ChecksumRecord, Desync, DocumentChecksum, DocumentPath, Operation, OtError,
    ParticipantId, Result, TransformationProxy, VectorTimestamp,
};

use crate::EngineConfig;

/// Host-side state for one shared document.
#[derive(Debug)]
pub struct DocumentServer {
    path: DocumentPath,
    content: String,
    proxies: BTreeMap<ParticipantId, TransformationProxy>,
    max_pending: usize,
}

impl DocumentServer {
    /// Start sharing `path` with `content` as the initial text.
    pub fn new(path: DocumentPath, content: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            path,
            content: content.into(),
            proxies: BTreeMap::new(),
            max_pending: config.max_pending_operations,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// The host's authoritative text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checksum of the host's text.
    pub fn checksum(&self) -> DocumentChecksum {
        DocumentChecksum::of(&self.content)
    }

    /// Participants in id order.
    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.proxies.keys()
    }

    pub fn participant_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.proxies.contains_key(id)
    }

    pub fn proxy(&self, id: &ParticipantId) -> Option<&TransformationProxy> {
        self.proxies.get(id)
    }

    /// The host's timestamp on its channel with `id`.
    pub fn timestamp_of(&self, id: &ParticipantId) -> Option<VectorTimestamp> {
        self.proxies.get(id).map(TransformationProxy::timestamp)
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Create a fresh proxy for `id` unless one exists. Returns whether one
    /// was created.
    pub fn add_participant(&mut self, id: ParticipantId) -> bool {
        if self.proxies.contains_key(&id) {
            return false;
        }
        tracing::debug!("{}: participant {} joined", self.path, id);
        self.proxies.insert(id.clone(), TransformationProxy::new(id));
        true
    }

    /// Drop the proxy for `id`. Returns whether one existed.
    pub fn remove_participant(&mut self, id: &ParticipantId) -> bool {
        let removed = self.proxies.remove(id).is_some();
        if removed {
            tracing::debug!("{}: participant {} left", self.path, id);
        }
        removed
    }

    /// Replace the proxy for `id` with a fresh one, discarding its history.
    /// Other proxies are untouched. Returns whether `id` was present.
    pub fn reset(&mut self, id: &ParticipantId) -> bool {
        match self.proxies.get_mut(id) {
            Some(proxy) => {
                tracing::info!(
                    "{}: resetting proxy for {} (was {}, {} pending)",
                    self.path,
                    id,
                    proxy.timestamp(),
                    proxy.pending_len()
                );
                *proxy = TransformationProxy::new(id.clone());
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Transformation
    // =========================================================================

    /// Transform an activity from its author and produce one outbound
    /// activity per other participant.
    pub fn transform_activity(
        &mut self,
        activity: &Activity,
    ) -> Result<BTreeMap<ParticipantId, Activity>> {
        self.check_path(&activity.path)?;
        let source = &activity.source;
        let sender = self
            .proxies
            .get(source)
            .ok_or_else(|| self.unknown_participant(source))?;

        for (id, proxy) in self.proxies.iter().filter(|(id, _)| *id != source) {
            if proxy.pending_len() >= self.max_pending {
                return Err(OtError::ProtocolDesynchronization {
                    participant: id.clone(),
                    reason: Desync::BacklogFull {
                        pending: proxy.pending_len(),
                        limit: self.max_pending,
                    },
                });
            }
        }

        let received = sender.prepare_receive(activity)?;
        let mut content = self.content.clone();
        received
            .operation()
            .apply(&mut content)
            .map_err(|e| match e {
                OtError::PositionOutOfBounds { position, len } => {
                    OtError::ProtocolDesynchronization {
                        participant: source.clone(),
                        reason: Desync::Inapplicable { position, len },
                    }
                }
                other => other,
            })?;

        // Nothing below can fail.
        let operation = match self.proxies.get_mut(source) {
            Some(proxy) => proxy.commit(received)?,
            None => return Err(self.unknown_participant(source)),
        };
        self.content = content;

        tracing::debug!(
            "{}: {} from {} at {} relayed to {} participants",
            self.path,
            operation.kind(),
            source,
            activity.timestamp,
            self.proxies.len() - 1
        );

        Ok(self.fan_out(&operation, source))
    }

    fn fan_out(
        &mut self,
        operation: &Operation,
        source: &ParticipantId,
    ) -> BTreeMap<ParticipantId, Activity> {
        let mut outbound = BTreeMap::new();
        for (id, proxy) in self.proxies.iter_mut() {
            if id == source {
                continue;
            }
            let activity = proxy.generate_for(operation.clone(), source, &self.path);
            outbound.insert(id.clone(), activity);
        }
        outbound
    }

    /// Seed `dest`'s proxy with `source`'s channel state, mirrored.
    ///
    /// Best effort: a missing proxy or a refused reseed is logged and
    /// ignored. Returns whether the timestamp was updated.
    pub fn update_vector_time(&mut self, source: &ParticipantId, dest: &ParticipantId) -> bool {
        let Some(timestamp) = self.timestamp_of(source) else {
            tracing::error!("{}: no proxy found for source {}", self.path, source);
            return false;
        };
        let Some(proxy) = self.proxies.get_mut(dest) else {
            tracing::error!("{}: no proxy found for destination {}", self.path, dest);
            return false;
        };
        match proxy.update_vector_time(timestamp.mirrored()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("{}: error during update vector time for {}: {}", self.path, dest, e);
                false
            }
        }
    }

    // =========================================================================
    // Checksums
    // =========================================================================

    /// Whether `record` was computed at exactly the state the host's channel
    /// with its source is in.
    pub fn is_current(&self, record: &ChecksumRecord) -> Result<bool> {
        self.check_path(&record.path)?;
        let proxy = self
            .proxies
            .get(&record.source)
            .ok_or_else(|| self.unknown_participant(&record.source))?;
        Ok(proxy.is_current(record.timestamp))
    }

    /// Re-stamp a checksum report for every other participant.
    ///
    /// A stale report (one that no longer describes the current channel
    /// state) yields an empty map; that is a normal outcome of concurrent
    /// editing, not an error.
    pub fn with_timestamp(
        &self,
        record: &ChecksumRecord,
    ) -> Result<BTreeMap<ParticipantId, ChecksumRecord>> {
        if !self.is_current(record)? {
            tracing::debug!(
                "{}: discarding stale checksum from {} at {}",
                self.path,
                record.source,
                record.timestamp
            );
            return Ok(BTreeMap::new());
        }

        Ok(self
            .proxies
            .iter()
            .filter(|(id, _)| **id != record.source)
            .map(|(id, proxy)| (id.clone(), record.with_timestamp(proxy.timestamp())))
            .collect())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn check_path(&self, path: &DocumentPath) -> Result<()> {
        if *path != self.path {
            return Err(OtError::WrongDocument {
                expected: self.path.clone(),
                got: path.clone(),
            });
        }
        Ok(())
    }

    fn unknown_participant(&self, id: &ParticipantId) -> OtError {
        OtError::UnknownParticipant {
            participant: id.clone(),
            path: self.path.clone(),
        }
    }
}
