//! A simulated collaborating client.

use std::collections::VecDeque;
use std::mem;

use serde_json::Value;
use tracing::{debug, error, warn};
use weft_edit::EditManager;
use weft_pending::{
    FlushMode, PendingLocalState, PendingMessage, PendingStateConfig, PendingStateError,
    PendingStateManager, RuntimeStateHandler,
};
use weft_rebase::{apply_text, TextChange, TextRebaser};
use weft_types::{Commit, RevisionTag, SequenceNumber, SessionId};
use weft_wire::{
    BatchPacker, ChunkOutcome, ChunkedMessageProcessor, ContainerMessageType, OpDecompressor,
    OutboundMessage, SequencedMessage, WireCodec, WireError,
};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::sequencer::Sequencer;

/// The container runtime of one client: document, edit manager, and the
/// outbound half of the wire.
pub struct ClientRuntime {
    edits: EditManager<TextRebaser>,
    document: String,
    client_id: Option<String>,
    connected: bool,
    flush_mode: FlushMode,
    next_csn: u64,
    /// Wire sequence number of the last message processed.
    last_processed_seq: u64,
    outbox: Vec<OutboundMessage>,
    frames: VecDeque<Vec<u8>>,
    packer: BatchPacker,
    codec: WireCodec,
    flush_error: Option<WireError>,
    closed: Option<PendingStateError>,
}

impl ClientRuntime {
    pub fn new(session_id: SessionId, config: &SimConfig) -> Self {
        Self {
            edits: EditManager::new(TextRebaser, session_id, config.edit.clone()),
            document: String::new(),
            client_id: None,
            connected: false,
            flush_mode: FlushMode::Immediate,
            next_csn: 1,
            last_processed_seq: 0,
            outbox: Vec::new(),
            frames: VecDeque::new(),
            packer: BatchPacker::new(config.wire.clone()),
            codec: WireCodec::new(config.wire.max_frame_size),
            flush_error: None,
            closed: None,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn edits(&self) -> &EditManager<TextRebaser> {
        &self.edits
    }

    /// Queue an op for sending and describe it for the pending queue.
    fn submit_op(&mut self, contents: Value, revision: RevisionTag) -> PendingMessage<RevisionTag> {
        let csn = self.next_csn;
        self.next_csn += 1;
        let reference = self.last_processed_seq;
        if self.connected {
            self.outbox.push(OutboundMessage::new(
                ContainerMessageType::DataStoreOp,
                csn,
                reference,
                contents.clone(),
            ));
            if self.flush_mode == FlushMode::Immediate {
                self.flush_outbox();
            }
        }
        PendingMessage::new(
            ContainerMessageType::DataStoreOp,
            csn,
            reference,
            contents,
            Some(revision),
        )
    }

    fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let batch = mem::take(&mut self.outbox);
        let packed = self
            .packer
            .pack(batch)
            .and_then(|ops| self.codec.encode_all(&ops));
        match packed {
            Ok(bytes) => self.frames.push_back(bytes),
            Err(err) => {
                error!(error = %err, "failed to pack batch");
                self.flush_error = Some(err);
            }
        }
    }

    fn local_commit(&self, revision: RevisionTag) -> Option<&Commit<TextChange>> {
        self.edits.local_commits().find(|c| c.revision == revision)
    }
}

impl RuntimeStateHandler for ClientRuntime {
    type LocalOpMetadata = RevisionTag;

    fn connected(&self) -> bool {
        self.connected
    }

    fn client_id(&self) -> Option<String> {
        self.client_id.clone()
    }

    fn set_flush_mode(&mut self, mode: FlushMode) {
        self.flush_mode = mode;
    }

    fn flush(&mut self) {
        self.flush_outbox();
    }

    fn resubmit(&mut self, message: PendingMessage<RevisionTag>) -> Option<PendingMessage<RevisionTag>> {
        let revision = message.local_op_metadata?;
        // Resend the commit in its current, rebased form.
        let contents = match self.local_commit(revision).map(serde_json::to_value) {
            Some(Ok(contents)) => contents,
            Some(Err(err)) => {
                warn!(revision = %revision, error = %err, "cannot encode commit for resubmit");
                return None;
            }
            None => {
                warn!(revision = %revision, "resubmitted op has no local commit");
                return None;
            }
        };
        Some(self.submit_op(contents, revision))
    }

    fn apply_stashed_op(
        &mut self,
        message_type: ContainerMessageType,
        content: &Value,
    ) -> Result<RevisionTag, PendingStateError> {
        if message_type != ContainerMessageType::DataStoreOp {
            return Err(PendingStateError::StashedOpRejected(format!(
                "unexpected {message_type} op"
            )));
        }
        let commit: Commit<TextChange> = serde_json::from_value(content.clone())
            .map_err(|e| PendingStateError::StashedOpRejected(e.to_string()))?;
        if commit.session_id != self.edits.session_id() {
            return Err(PendingStateError::StashedOpRejected(format!(
                "commit {} belongs to session {}",
                commit.revision, commit.session_id
            )));
        }
        let document = apply_text(&self.document, &commit.change)
            .map_err(|e| PendingStateError::StashedOpRejected(e.to_string()))?;
        // The ack for a stashed op carries its original revision.
        self.edits
            .apply_edit_with_revision(commit.revision, commit.change)
            .map_err(|e| PendingStateError::StashedOpRejected(e.to_string()))?;
        self.document = document;
        Ok(commit.revision)
    }

    fn close(&mut self, error: &PendingStateError) {
        error!(client_id = ?self.client_id, error = %error, "container closed");
        self.closed = Some(error.clone());
    }
}

/// One simulated client: the runtime plus the inbound half of the wire.
pub struct SimClient {
    index: usize,
    pending: PendingStateManager<ClientRuntime>,
    decompressor: OpDecompressor,
    chunks: ChunkedMessageProcessor,
    /// Wire sequence numbers of the trunk commits above the trimmed prefix.
    /// Chunks consume wire sequence numbers without becoming commits.
    trunk_wire_seqs: VecDeque<u64>,
    trimmed_commits: u64,
    cursor: usize,
    max_batch_ops: usize,
    unflushed_ops: usize,
}

impl SimClient {
    pub fn new(index: usize, config: &SimConfig) -> Self {
        let session_id = SessionId::from_u128(index as u128 + 1);
        Self {
            index,
            pending: PendingStateManager::new(
                ClientRuntime::new(session_id, config),
                PendingStateConfig::default(),
            ),
            decompressor: OpDecompressor::new(),
            chunks: ChunkedMessageProcessor::new(),
            trunk_wire_seqs: VecDeque::new(),
            trimmed_commits: 0,
            cursor: 0,
            max_batch_ops: config.max_batch_ops,
            unflushed_ops: 0,
        }
    }

    /// Rebuild a client from a stashed pending queue after a restart. The
    /// client starts from an empty document and re-applies each stashed op
    /// once inbound processing reaches the op's reference sequence number.
    pub fn resume(
        index: usize,
        config: &SimConfig,
        state: PendingLocalState<RevisionTag>,
    ) -> SimResult<Self> {
        let mut client = Self::new(index, config);
        let runtime = ClientRuntime::new(client.runtime().edits().session_id(), config);
        client.pending =
            PendingStateManager::with_local_state(runtime, PendingStateConfig::default(), state);
        client.pending.apply_stashed_ops_at(Some(0))?;
        client.check()?;
        Ok(client)
    }

    /// Snapshot of the pending queue, `None` when nothing is pending.
    pub fn local_state(&self) -> SimResult<Option<PendingLocalState<RevisionTag>>> {
        Ok(self.pending.get_local_state()?)
    }

    fn runtime(&self) -> &ClientRuntime {
        self.pending.handler()
    }

    fn runtime_mut(&mut self) -> &mut ClientRuntime {
        self.pending.handler_mut()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn document(&self) -> &str {
        self.runtime().document()
    }

    pub fn is_connected(&self) -> bool {
        self.runtime().connected
    }

    pub fn client_id(&self) -> Option<&str> {
        self.runtime().client_id.as_deref()
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.runtime().flush_mode
    }

    pub fn has_pending_messages(&self) -> bool {
        self.pending.has_pending_messages()
    }

    pub fn local_branch_len(&self) -> usize {
        self.runtime().edits().local_branch_len()
    }

    pub fn has_unsent_frames(&self) -> bool {
        !self.runtime().frames.is_empty()
    }

    pub fn is_caught_up(&self, sequencer: &Sequencer) -> bool {
        self.cursor >= sequencer.log().len()
    }

    fn check(&mut self) -> SimResult<()> {
        if self.runtime().closed.is_some() {
            return Err(SimError::ClientClosed(self.index));
        }
        if let Some(err) = self.runtime_mut().flush_error.take() {
            return Err(err.into());
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------

    /// Join the service, catch up on everything sequenced so far, and replay
    /// pending ops under the new client id.
    pub fn connect(&mut self, sequencer: &mut Sequencer) -> SimResult<()> {
        let client_id = sequencer.join();
        let runtime = self.runtime_mut();
        runtime.client_id = Some(client_id);
        runtime.connected = true;
        runtime.next_csn = 1;
        self.process_inbound(sequencer, usize::MAX)?;
        self.pending.replay_pending_states()?;
        self.check()
    }

    /// Drop the connection. Anything not yet transmitted is lost and will be
    /// replayed on reconnect.
    pub fn disconnect(&mut self, sequencer: &mut Sequencer) {
        let runtime = self.runtime_mut();
        runtime.connected = false;
        runtime.outbox.clear();
        runtime.frames.clear();
        if let Some(client_id) = runtime.client_id.clone() {
            sequencer.leave(&client_id);
        }
    }

    // ---------------------------------------------------------------
    // Outbound
    // ---------------------------------------------------------------

    /// Apply a change authored against the current document.
    pub fn edit(&mut self, change: TextChange) -> SimResult<RevisionTag> {
        let runtime = self.runtime_mut();
        let document = apply_text(&runtime.document, &change)?;
        let revision = runtime.edits.apply_edit(change)?;
        runtime.document = document;
        let commit = runtime
            .local_commit(revision)
            .map(serde_json::to_value)
            .transpose()?
            .unwrap_or(Value::Null);
        let message = runtime.submit_op(commit, revision);
        self.pending.on_submit_message(message)?;

        if self.flush_mode() == FlushMode::TurnBased {
            self.unflushed_ops += 1;
            if self.unflushed_ops >= self.max_batch_ops {
                self.flush()?;
            }
        }
        self.check()?;
        Ok(revision)
    }

    pub fn insert(&mut self, pos: usize, text: &str) -> SimResult<RevisionTag> {
        let author = self.runtime().edits().session_id();
        self.edit(TextChange::insert(author, pos, text))
    }

    pub fn delete(&mut self, pos: usize, len: usize) -> SimResult<RevisionTag> {
        let runtime = self.runtime();
        let change = TextChange::delete(runtime.edits().session_id(), runtime.document(), pos, len)?;
        self.edit(change)
    }

    /// Undo an earlier edit of any client.
    pub fn revert(&mut self, revision: RevisionTag) -> SimResult<RevisionTag> {
        let runtime = self.runtime_mut();
        let undo = runtime.edits.revert(revision)?;
        runtime.document = apply_text(&runtime.document, &undo.change)?;
        let contents = serde_json::to_value(&undo)?;
        let message = runtime.submit_op(contents, undo.revision);
        self.pending.on_submit_message(message)?;
        self.check()?;
        Ok(undo.revision)
    }

    pub fn flush(&mut self) -> SimResult<()> {
        self.unflushed_ops = 0;
        self.runtime_mut().flush_outbox();
        self.pending.on_flush()?;
        self.check()
    }

    pub fn set_flush_mode(&mut self, mode: FlushMode) -> SimResult<()> {
        if mode == self.flush_mode() {
            return Ok(());
        }
        if mode == FlushMode::Immediate {
            self.flush()?;
        }
        self.runtime_mut().set_flush_mode(mode);
        self.pending.on_flush_mode_updated(mode)?;
        debug!(client = self.index, mode = ?mode, "flush mode changed");
        Ok(())
    }

    /// Hand every packed batch to the service.
    pub fn transmit(&mut self, sequencer: &mut Sequencer) -> SimResult<usize> {
        let Some(client_id) = self.client_id().map(str::to_string) else {
            return Ok(0);
        };
        if !self.is_connected() {
            return Ok(0);
        }
        let frames: Vec<Vec<u8>> = self.runtime_mut().frames.drain(..).collect();
        let mut sent = 0;
        for frame in frames {
            sent += sequencer.submit(&client_id, &frame)?;
        }
        Ok(sent)
    }

    // ---------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------

    /// Process up to `limit` sequenced messages.
    pub fn process_inbound(&mut self, sequencer: &Sequencer, limit: usize) -> SimResult<usize> {
        let messages: Vec<SequencedMessage> = sequencer
            .messages_since(self.cursor)
            .iter()
            .take(limit)
            .cloned()
            .collect();
        let count = messages.len();
        for message in messages {
            self.cursor += 1;
            let wire_seq = message.sequence_number;
            self.process_message(message)?;
            self.pending.apply_stashed_ops_at(Some(wire_seq))?;
            self.check()?;
        }
        Ok(count)
    }

    fn process_message(&mut self, message: SequencedMessage) -> SimResult<()> {
        let wire_seq = message.sequence_number;
        let wire_msn = message.minimum_sequence_number;
        let local = match self.client_id() {
            Some(id) => message.is_from(id),
            None => false,
        };

        let message = match self.chunks.process(message)? {
            ChunkOutcome::Pending => {
                self.runtime_mut().last_processed_seq = wire_seq;
                return Ok(());
            }
            ChunkOutcome::Complete(message) => message,
        };
        let message = self.decompressor.process(message)?;
        let metadata = self.pending.process_message(&message, local)?;

        let commit: Commit<TextChange> = serde_json::from_value(message.contents)?;
        if let Some(expected) = metadata {
            if expected != commit.revision {
                return Err(SimError::AckMismatch {
                    expected,
                    received: commit.revision,
                });
            }
        }

        let trunk_seq = SequenceNumber::new(self.trimmed_commits + self.trunk_wire_seqs.len() as u64 + 1);
        let reference = self.trunk_position(message.reference_sequence_number);
        self.trunk_wire_seqs.push_back(wire_seq);

        let runtime = self.runtime_mut();
        if let Some(delta) = runtime.edits.add_sequenced_change(commit, trunk_seq, reference)? {
            runtime.document = apply_text(&runtime.document, &delta)?;
        }
        runtime.last_processed_seq = wire_seq;

        let minimum = self.trunk_position(wire_msn);
        self.runtime_mut()
            .edits
            .advance_minimum_sequence_number(minimum)?;
        while self.trunk_wire_seqs.front().is_some_and(|w| *w <= wire_msn) {
            self.trunk_wire_seqs.pop_front();
            self.trimmed_commits += 1;
        }
        self.check()
    }

    /// Number of trunk commits sequenced at or before a wire sequence number.
    fn trunk_position(&self, wire_seq: u64) -> SequenceNumber {
        let retained = self.trunk_wire_seqs.partition_point(|w| *w <= wire_seq);
        SequenceNumber::new(self.trimmed_commits + retained as u64)
    }
}
