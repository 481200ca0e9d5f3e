use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use tracing::warn;

/// One record plus the conduit used to acknowledge that its processing
/// reached a terminal state.
#[derive(Debug, Clone)]
pub struct CheckpointIdentifier {
    pub id: String,
    pub shard_id: String,
    pub payload: String,
    channel: SyncSender<u8>,
}

impl CheckpointIdentifier {
    /// Create an identifier with a fresh single-slot acknowledgement conduit.
    /// The receiver belongs to the checkpoint tracker.
    /// The slot belongs to this record alone.
    pub fn new(
        id: impl Into<String>,
        shard_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> (Self, Receiver<u8>) {
        let (channel, rx) = mpsc::sync_channel(1);
        let ident = Self {
            id: id.into(),
            shard_id: shard_id.into(),
            payload: payload.into(),
            channel,
        };
        (ident, rx)
    }

    /// Signal completion. Never blocks; a full or closed conduit is logged.
    pub fn acknowledge(&self) {
        match self.channel.try_send(1) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(record = %self.id, shard = %self.shard_id, "checkpoint conduit full, acknowledgement dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(record = %self.id, shard = %self.shard_id, "checkpoint tracker gone, acknowledgement dropped");
            }
        }
    }
}
