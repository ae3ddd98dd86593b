//! The pending queue and its ack, replay and resume logic.

use std::collections::VecDeque;
use std::mem;

use tracing::{debug, error, info};
use weft_wire::{ContainerMessageType, SequencedMessage};

use crate::config::PendingStateConfig;
use crate::error::{PendingResult, PendingStateError};
use crate::handler::RuntimeStateHandler;
use crate::state::{FlushMode, PendingLocalState, PendingMessage, PendingState};

/// First op of the batch currently being acknowledged.
#[derive(Clone, Copy, Debug)]
struct OpenBatch {
    begin_flag: Option<bool>,
    begin_csn: u64,
}

type Metadata<H> = <H as RuntimeStateHandler>::LocalOpMetadata;

/// Tracks unacknowledged local ops and the batch markers between them.
pub struct PendingStateManager<H: RuntimeStateHandler> {
    handler: H,
    pending_states: VecDeque<PendingState<Metadata<H>>>,
    /// Stashed states loaded from a previous session, not yet applied.
    initial_states: VecDeque<PendingState<Metadata<H>>>,
    pending_messages_count: usize,
    /// Mode last reported through `on_flush_mode_updated`.
    flush_mode: FlushMode,
    /// Mode in effect at the front of the queue.
    front_flush_mode: FlushMode,
    open_batch: Option<OpenBatch>,
    /// Client id the queued ops were submitted under.
    client_id: Option<String>,
    closed: bool,
    disposed: bool,
}

impl<H: RuntimeStateHandler> PendingStateManager<H> {
    pub fn new(handler: H, config: PendingStateConfig) -> Self {
        Self {
            handler,
            pending_states: VecDeque::new(),
            initial_states: VecDeque::new(),
            pending_messages_count: 0,
            flush_mode: config.initial_flush_mode,
            front_flush_mode: config.initial_flush_mode,
            open_batch: None,
            client_id: None,
            closed: false,
            disposed: false,
        }
    }

    /// Resume from a queue persisted by [`get_local_state`](Self::get_local_state).
    /// The stashed ops are applied later through
    /// [`apply_stashed_ops_at`](Self::apply_stashed_ops_at).
    pub fn with_local_state(
        handler: H,
        config: PendingStateConfig,
        state: PendingLocalState<Metadata<H>>,
    ) -> Self {
        let mut manager = Self::new(handler, config);
        manager.initial_states = state.pending_states.into();
        manager.client_id = state.client_id;
        manager.front_flush_mode = FlushMode::Immediate;
        manager
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn pending_messages_count(&self) -> usize {
        self.pending_messages_count
    }

    pub fn pending_states(&self) -> impl Iterator<Item = &PendingState<Metadata<H>>> {
        self.pending_states.iter()
    }

    pub fn has_pending_messages(&self) -> bool {
        self.pending_messages_count != 0 || !self.initial_states.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Snapshot of the queue for persisting across a restart, or `None` when
    /// nothing is pending.
    pub fn get_local_state(&self) -> PendingResult<Option<PendingLocalState<Metadata<H>>>> {
        if !self.initial_states.is_empty() {
            return Err(PendingStateError::InitialStatesPending);
        }
        if !self.has_pending_messages() {
            return Ok(None);
        }
        let mut pending_states = Vec::with_capacity(self.pending_states.len() + 1);
        if self.front_flush_mode != FlushMode::Immediate {
            pending_states.push(PendingState::FlushMode {
                flush_mode: self.front_flush_mode,
            });
        }
        pending_states.extend(self.pending_states.iter().map(PendingState::stashed));
        Ok(Some(PendingLocalState {
            client_id: self.client_id.clone(),
            pending_states,
        }))
    }

    // ---------------------------------------------------------------
    // Submission side
    // ---------------------------------------------------------------

    pub fn on_submit_message(&mut self, message: PendingMessage<Metadata<H>>) -> PendingResult<()> {
        self.ensure_open()?;
        self.pending_states.push_back(PendingState::Message(message));
        self.pending_messages_count += 1;
        Ok(())
    }

    pub fn on_flush_mode_updated(&mut self, mode: FlushMode) -> PendingResult<()> {
        self.ensure_open()?;
        if mode == self.flush_mode {
            return Ok(());
        }
        self.flush_mode = mode;

        if mode == FlushMode::Immediate {
            // A trailing flush is implied by the switch itself.
            if matches!(self.pending_states.back(), Some(PendingState::Flush)) {
                self.pending_states.pop_back();
            }
            // Turn-based with nothing submitted: drop the pair.
            if matches!(
                self.pending_states.back(),
                Some(PendingState::FlushMode {
                    flush_mode: FlushMode::TurnBased
                })
            ) {
                self.pending_states.pop_back();
                return Ok(());
            }
        }
        self.pending_states
            .push_back(PendingState::FlushMode { flush_mode: mode });
        Ok(())
    }

    pub fn on_flush(&mut self) -> PendingResult<()> {
        self.ensure_open()?;
        if self.flush_mode != FlushMode::Immediate
            && matches!(self.pending_states.back(), Some(PendingState::Message(_)))
        {
            self.pending_states.push_back(PendingState::Flush);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Ack side
    // ---------------------------------------------------------------

    /// Process a sequenced op.
    ///
    /// For this client's own ops the oldest pending op is removed and its
    /// local metadata returned. Remote ops only matter when they acknowledge
    /// an op submitted under the previous client id.
    pub fn process_message(
        &mut self,
        message: &SequencedMessage,
        local: bool,
    ) -> PendingResult<Option<Metadata<H>>> {
        self.ensure_open()?;
        if message.message_type == ContainerMessageType::ChunkedOp {
            return Ok(None);
        }
        let result = if local {
            self.process_local(message)
        } else {
            Ok(self.process_remote(message))
        };
        result.map_err(|err| self.fail(err))
    }

    fn process_local(&mut self, message: &SequencedMessage) -> PendingResult<Option<Metadata<H>>> {
        if self.open_batch.is_none() {
            self.consume_markers();
        }
        let pending = match self.pending_states.pop_front() {
            Some(PendingState::Message(pending)) => pending,
            Some(_) | None => return Err(PendingStateError::NoPendingMessage),
        };
        if pending.client_sequence_number != message.client_sequence_number {
            return Err(PendingStateError::DataCorruption {
                expected: pending.client_sequence_number,
                actual: message.client_sequence_number,
            });
        }
        self.pending_messages_count -= 1;

        let csn = message.client_sequence_number;
        let flag = message.batch_flag();
        let batch = match self.open_batch {
            Some(batch) => {
                if flag == Some(true) {
                    return Err(PendingStateError::BatchFraming(format!(
                        "op {csn} starts a batch inside an open batch"
                    )));
                }
                batch
            }
            None if self.front_flush_mode == FlushMode::TurnBased => {
                debug!(csn, "batch begin");
                let batch = OpenBatch {
                    begin_flag: flag,
                    begin_csn: csn,
                };
                self.open_batch = Some(batch);
                batch
            }
            None => {
                if flag.is_some() {
                    return Err(PendingStateError::BatchFraming(format!(
                        "op {csn} sent immediately carries batch metadata"
                    )));
                }
                return Ok(pending.local_op_metadata);
            }
        };

        match self.pending_states.front() {
            Some(PendingState::Message(_)) => {
                if batch.begin_csn != csn && flag.is_some() {
                    return Err(PendingStateError::BatchFraming(format!(
                        "op {csn} inside a batch carries batch metadata"
                    )));
                }
            }
            Some(_) => {
                self.end_batch(batch, csn, flag)?;
            }
            None => {
                return Err(PendingStateError::BatchFraming(format!(
                    "queue drained inside the batch started at {}",
                    batch.begin_csn
                )));
            }
        }
        Ok(pending.local_op_metadata)
    }

    fn end_batch(&mut self, batch: OpenBatch, csn: u64, flag: Option<bool>) -> PendingResult<()> {
        self.open_batch = None;
        if batch.begin_csn == csn {
            if batch.begin_flag.is_some() {
                return Err(PendingStateError::BatchFraming(format!(
                    "single-op batch {csn} carries batch metadata"
                )));
            }
        } else if batch.begin_flag != Some(true) || flag != Some(false) {
            return Err(PendingStateError::BatchFraming(format!(
                "batch {}..={csn} is not framed by begin and end flags",
                batch.begin_csn
            )));
        }
        debug!(begin = batch.begin_csn, end = csn, "batch end");
        Ok(())
    }

    fn process_remote(&mut self, message: &SequencedMessage) -> Option<Metadata<H>> {
        let from_previous = matches!(
            (&self.client_id, &message.client_id),
            (Some(ours), Some(theirs)) if ours == theirs
        );
        if !from_previous {
            return None;
        }
        let index = self.pending_states.iter().position(PendingState::is_message)?;
        match &self.pending_states[index] {
            PendingState::Message(m) if m.client_sequence_number == message.client_sequence_number => {}
            _ => return None,
        }
        self.consume_markers();
        let Some(PendingState::Message(pending)) = self.pending_states.pop_front() else {
            return None;
        };
        self.pending_messages_count -= 1;
        debug!(
            csn = pending.client_sequence_number,
            "acknowledged op from previous connection"
        );
        pending.local_op_metadata
    }

    /// Pop markers at the front of the queue, tracking the flush mode they
    /// establish.
    fn consume_markers(&mut self) {
        while let Some(state) = self.pending_states.front() {
            match state {
                PendingState::Message(_) => break,
                PendingState::FlushMode { flush_mode } => self.front_flush_mode = *flush_mode,
                PendingState::Flush => {}
            }
            self.pending_states.pop_front();
        }
    }

    // ---------------------------------------------------------------
    // Reconnect and resume
    // ---------------------------------------------------------------

    /// Resubmit every queued state after a reconnect.
    ///
    /// The queue is detached before the walk, so only the entries present
    /// when the call started are replayed.
    pub fn replay_pending_states(&mut self) -> PendingResult<()> {
        self.ensure_open()?;
        if !self.handler.connected() {
            return Err(PendingStateError::NotConnected);
        }
        let client_id = self.handler.client_id();
        if client_id.is_some() && client_id == self.client_id {
            return Err(PendingStateError::ReplayedTwice);
        }
        if !self.initial_states.is_empty() {
            return Err(PendingStateError::InitialStatesPending);
        }
        self.client_id = client_id;

        let states = mem::take(&mut self.pending_states);
        let start_mode = self.front_flush_mode;
        let saved_mode = self.flush_mode;
        self.pending_messages_count = 0;
        self.open_batch = None;
        self.front_flush_mode = saved_mode;
        info!(
            states = states.len(),
            client_id = ?self.client_id,
            "replaying pending states"
        );

        self.switch_flush_mode(start_mode)?;
        for state in states {
            match state {
                PendingState::Message(message) => {
                    if let Some(resubmitted) = self.handler.resubmit(message) {
                        self.on_submit_message(resubmitted)?;
                    }
                }
                PendingState::FlushMode { flush_mode } => self.switch_flush_mode(flush_mode)?,
                PendingState::Flush => {
                    self.handler.flush();
                    self.on_flush()?;
                }
            }
        }
        self.switch_flush_mode(saved_mode)
    }

    fn switch_flush_mode(&mut self, mode: FlushMode) -> PendingResult<()> {
        if mode == self.flush_mode {
            return Ok(());
        }
        if mode == FlushMode::Immediate {
            self.handler.flush();
            self.on_flush()?;
        }
        self.handler.set_flush_mode(mode);
        self.on_flush_mode_updated(mode)
    }

    /// Apply stashed ops whose reference sequence number equals `sequence`.
    ///
    /// Stops at the first op referencing something later. An op referencing
    /// something earlier means the snapshot is newer than the op's base,
    /// which is fatal. `None` applies everything.
    pub fn apply_stashed_ops_at(&mut self, sequence: Option<u64>) -> PendingResult<()> {
        self.ensure_open()?;
        self.apply_stashed(sequence).map_err(|err| self.fail(err))
    }

    fn apply_stashed(&mut self, sequence: Option<u64>) -> PendingResult<()> {
        let mut applied = 0usize;
        while let Some(front) = self.initial_states.front() {
            if let (PendingState::Message(message), Some(sequence)) = (front, sequence) {
                let reference = message.reference_sequence_number;
                if reference > sequence {
                    break;
                }
                if reference < sequence {
                    return Err(PendingStateError::StashedOpTooOld {
                        reference,
                        sequence,
                    });
                }
            }
            let Some(state) = self.initial_states.pop_front() else {
                break;
            };
            match state {
                PendingState::Message(mut message) => {
                    let metadata = self
                        .handler
                        .apply_stashed_op(message.message_type, &message.content)?;
                    message.local_op_metadata = Some(metadata);
                    self.pending_states.push_back(PendingState::Message(message));
                    self.pending_messages_count += 1;
                    applied += 1;
                }
                marker => self.pending_states.push_back(marker),
            }
        }
        if applied > 0 {
            debug!(applied, sequence = ?sequence, "applied stashed ops");
        }
        Ok(())
    }

    /// Drop all pending state. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.pending_states.clear();
        self.initial_states.clear();
        self.pending_messages_count = 0;
        self.open_batch = None;
        self.disposed = true;
    }

    fn ensure_open(&self) -> PendingResult<()> {
        if self.disposed {
            return Err(PendingStateError::Disposed);
        }
        if self.closed {
            return Err(PendingStateError::Closed);
        }
        Ok(())
    }

    fn fail(&mut self, err: PendingStateError) -> PendingStateError {
        if err.is_fatal() && !self.closed {
            error!(error = %err, "closing container");
            self.closed = true;
            self.handler.close(&err);
        }
        err
    }
}
