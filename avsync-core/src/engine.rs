//! Decoder engine port
//!
//! The core never talks to a decoding library directly. Whatever decodes
//! the media pushes buffers in through the coordinator's allocate/commit
//! calls and receives control commands through [`DecoderEngine`].

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::{Error, Result};

/// Control surface of an external decoder
pub trait DecoderEngine: Send + Sync {
    /// Reposition the decoder. Buffers committed after the seek takes
    /// effect report timestamps starting at `timestamp_ms`.
    fn seek_to(&self, timestamp_ms: i64) -> Result<()>;

    /// Stop producing buffers
    fn stop(&self);
}

impl<E: DecoderEngine + ?Sized> DecoderEngine for Arc<E> {
    fn seek_to(&self, timestamp_ms: i64) -> Result<()> {
        (**self).seek_to(timestamp_ms)
    }

    fn stop(&self) {
        (**self).stop()
    }
}

impl<E: DecoderEngine + ?Sized> DecoderEngine for Box<E> {
    fn seek_to(&self, timestamp_ms: i64) -> Result<()> {
        (**self).seek_to(timestamp_ms)
    }

    fn stop(&self) {
        (**self).stop()
    }
}

/// Engine command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Seek to a timestamp in milliseconds
    Seek { timestamp_ms: i64 },
    /// Stop decoding
    Stop,
}

/// Engine that forwards commands to a decode loop over a bounded channel
pub struct ChannelEngine {
    command_tx: Sender<EngineCommand>,
    log_target: String,
}

impl ChannelEngine {
    /// Create the engine and the receiver the decode loop polls
    pub fn new(capacity: usize) -> (Self, Receiver<EngineCommand>) {
        Self::with_log_target(capacity, "avsync")
    }

    /// Same as [`new`](Self::new), logging under `log_target`
    pub fn with_log_target(
        capacity: usize,
        log_target: impl Into<String>,
    ) -> (Self, Receiver<EngineCommand>) {
        let (command_tx, command_rx) = bounded(capacity.max(1));
        let engine = Self {
            command_tx,
            log_target: log_target.into(),
        };
        (engine, command_rx)
    }

    pub fn log_target(&self) -> &str {
        &self.log_target
    }
}

impl DecoderEngine for ChannelEngine {
    fn seek_to(&self, timestamp_ms: i64) -> Result<()> {
        self.command_tx
            .send(EngineCommand::Seek { timestamp_ms })
            .map_err(Error::from)
    }

    fn stop(&self) {
        match self.command_tx.try_send(EngineCommand::Stop) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    target: self.log_target(),
                    "Engine command queue full, stop not delivered"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!(target: self.log_target(), "Engine already gone, stop ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_engine_forwards_commands() {
        let (engine, rx) = ChannelEngine::new(4);
        engine.seek_to(1600).unwrap();
        engine.stop();

        assert_eq!(rx.recv().unwrap(), EngineCommand::Seek { timestamp_ms: 1600 });
        assert_eq!(rx.recv().unwrap(), EngineCommand::Stop);
    }

    #[test]
    fn test_seek_fails_without_decode_loop() {
        let (engine, rx) = ChannelEngine::new(1);
        drop(rx);
        assert!(matches!(engine.seek_to(0), Err(Error::Channel(_))));
        // stop never fails
        engine.stop();
    }

    #[test]
    fn test_shared_engine() {
        let (engine, rx) = ChannelEngine::new(2);
        let shared: Arc<dyn DecoderEngine> = Arc::new(engine);
        shared.seek_to(40).unwrap();
        assert_eq!(rx.try_recv().unwrap(), EngineCommand::Seek { timestamp_ms: 40 });
    }

    #[test]
    fn test_log_target() {
        let (engine, _rx) = ChannelEngine::new(1);
        assert_eq!(engine.log_target(), "avsync");

        let (engine, rx) = ChannelEngine::with_log_target(1, "avsync::decoder");
        assert_eq!(engine.log_target(), "avsync::decoder");
        engine.stop();
        // full queue only logs
        engine.stop();
        assert_eq!(rx.try_recv().unwrap(), EngineCommand::Stop);
    }
}
