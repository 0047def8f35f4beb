//! Participant-side document replica.
//!
//! A `Replica` is what a participant runs against the host: its own copy of
//! the text plus a [`TransformationProxy`] whose counterpart is the host.
//! Local edits are applied immediately and stamped for the host; activities
//! relayed by the host are transformed past any local edits the host has not
//! acknowledged yet, then applied.

use tandem_types::{DocumentPath, ParticipantId};

use crate::{
    Activity, ChecksumRecord, DocumentChecksum, Operation, Result, TransformationProxy,
    VectorTimestamp,
};

/// A participant's copy of one shared document.
#[derive(Clone, Debug)]
pub struct Replica {
    id: ParticipantId,
    path: DocumentPath,
    content: String,
    host: TransformationProxy,
}

impl Replica {
    /// Start from `content`, which must equal the host's text when the
    /// host's proxy for this participant was created.
    pub fn new(
        id: ParticipantId,
        host: ParticipantId,
        path: DocumentPath,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            path,
            content: content.into(),
            host: TransformationProxy::new(host),
        }
    }

    /// Join a session whose host proxy was reseeded (late join).
    ///
    /// `timestamp` is the host's timestamp for this participant, in the
    /// host's frame; the replica starts at its mirror. `content` must be the
    /// host's text at that point.
    pub fn seeded(
        id: ParticipantId,
        host: ParticipantId,
        path: DocumentPath,
        content: impl Into<String>,
        timestamp: VectorTimestamp,
    ) -> Result<Self> {
        let mut replica = Self::new(id, host, path, content);
        replica.host.update_vector_time(timestamp.mirrored())?;
        Ok(replica)
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> VectorTimestamp {
        self.host.timestamp()
    }

    /// Local edits the host has not acknowledged yet.
    pub fn unacknowledged(&self) -> usize {
        self.host.pending_len()
    }

    /// Apply a local edit and produce the activity to send to the host.
    ///
    /// Nothing is recorded if the edit does not fit the current text.
    pub fn edit(&mut self, operation: Operation) -> Result<Activity> {
        operation.apply(&mut self.content)?;
        Ok(self.host.generate_for(operation, &self.id, &self.path))
    }

    /// Integrate an activity relayed by the host. Returns the operation as
    /// applied to the local text.
    pub fn receive(&mut self, activity: &Activity) -> Result<Operation> {
        let received = self.host.prepare_receive(activity)?;
        let mut content = self.content.clone();
        received.operation().apply(&mut content)?;

        let operation = self.host.commit(received)?;
        self.content = content;
        Ok(operation)
    }

    /// Checksum of the current text, stamped with this replica's timestamp.
    pub fn checksum(&self) -> ChecksumRecord {
        ChecksumRecord::new(
            self.id.clone(),
            self.path.clone(),
            DocumentChecksum::of(&self.content),
            self.host.timestamp(),
        )
    }

    /// Whether a checksum stamped by the host describes the state this
    /// replica is in.
    pub fn is_current(&self, record: &ChecksumRecord) -> bool {
        self.host.is_current(record.timestamp)
    }

    /// Replace the text and restart the channel, e.g. after the host reset
    /// this participant's proxy and resent the whole document.
    pub fn resynchronize(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.host = TransformationProxy::new(self.host.counterpart().clone());
    }
}
