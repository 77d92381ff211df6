//! Assembled frame types

use std::sync::Arc;

use crate::config::{AudioFormat, ImageFormat};

/// Sequential frame index requested by the consumer
pub type Position = i64;

/// Sentinel reported over FFI when no position is available
pub const INVALID_POSITION: Position = -1;

/// Shared handle to an assembled frame; cloning shares ownership
pub type FrameHandle = Arc<AssembledFrame>;

/// Audio samples covering exactly one frame interval
#[derive(Clone)]
pub struct AudioPayload {
    /// Interleaved sample bytes
    pub data: Vec<u8>,

    /// Sample format
    pub format: AudioFormat,

    /// Number of channels
    pub channels: u32,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of samples per channel
    pub samples: u32,
}

impl AudioPayload {
    /// Get data size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Duration in microseconds
    pub fn duration_us(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples as i64 * 1_000_000) / self.sample_rate as i64
    }
}

/// One decoded image
#[derive(Clone)]
pub struct VideoPayload {
    /// Raw pixel data
    pub data: Vec<u8>,

    /// Pixel format
    pub format: ImageFormat,

    /// Image width
    pub width: u32,

    /// Image height
    pub height: u32,
}

impl VideoPayload {
    /// Get data size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }
}

/// One video image plus the audio belonging to its frame interval
#[derive(Clone)]
pub struct AssembledFrame {
    /// Frame position
    pub position: Position,

    /// Audio for this frame
    pub audio: AudioPayload,

    /// Image for this frame
    pub video: VideoPayload,
}

impl AssembledFrame {
    pub fn new(position: Position, audio: AudioPayload, video: VideoPayload) -> Self {
        Self {
            position,
            audio,
            video,
        }
    }

    /// Total payload bytes held by the frame
    pub fn memory_size(&self) -> usize {
        self.audio.data_size() + self.video.data_size()
    }

    /// Wrap into a shared handle
    pub fn into_handle(self) -> FrameHandle {
        Arc::new(self)
    }

    /// Create a test frame (for testing only)
    #[cfg(test)]
    pub fn test_frame(position: Position) -> Self {
        Self {
            position,
            audio: AudioPayload {
                data: vec![0u8; 1920 * 4],
                format: AudioFormat::S16,
                channels: 2,
                sample_rate: 48000,
                samples: 1920,
            },
            video: VideoPayload {
                data: vec![position as u8; 12],
                format: ImageFormat::Rgb24,
                width: 2,
                height: 2,
            },
        }
    }
}

impl std::fmt::Debug for AssembledFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssembledFrame")
            .field("position", &self.position)
            .field("samples", &self.audio.samples)
            .field("audio_size", &self.audio.data.len())
            .field("width", &self.video.width)
            .field("height", &self.video.height)
            .field("video_size", &self.video.data.len())
            .finish()
    }
}
