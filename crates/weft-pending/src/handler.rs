use serde_json::Value;
use weft_wire::ContainerMessageType;

use crate::error::PendingStateError;
use crate::state::{FlushMode, PendingMessage};

/// The container runtime as seen by the [`PendingStateManager`].
///
/// The manager owns its handler and calls into it; the handler never calls
/// back into the manager. Anything the handler wants queued is returned.
///
/// [`PendingStateManager`]: crate::PendingStateManager
pub trait RuntimeStateHandler {
    /// Datatype-private data attached to each pending op.
    type LocalOpMetadata;

    fn connected(&self) -> bool;

    /// Client id of the current connection.
    fn client_id(&self) -> Option<String>;

    fn set_flush_mode(&mut self, mode: FlushMode);

    /// Send everything buffered in the current batch.
    fn flush(&mut self);

    /// Regenerate and resend a pending op after a reconnect. Returns the op
    /// as it was resubmitted, or `None` if the datatype dropped it.
    fn resubmit(
        &mut self,
        message: PendingMessage<Self::LocalOpMetadata>,
    ) -> Option<PendingMessage<Self::LocalOpMetadata>>;

    /// Re-apply a stashed op locally, producing fresh local metadata.
    fn apply_stashed_op(
        &mut self,
        message_type: ContainerMessageType,
        content: &Value,
    ) -> Result<Self::LocalOpMetadata, PendingStateError>;

    /// Close the container. Called once, on the first fatal error.
    fn close(&mut self, error: &PendingStateError);
}
