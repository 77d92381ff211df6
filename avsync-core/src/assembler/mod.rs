//! Raw buffer reassembly
//!
//! The decoder hands over audio and video in blocks of whatever size it
//! likes. The assembler queues those blocks and cuts them into one image plus
//! exactly one frame interval of audio per position.
//!
//! None of the operations here are synchronized; the owner serializes access.

use std::collections::VecDeque;

use crate::config::{AudioFormat, FrameRate, ImageFormat, ProducerConfig};
use crate::frame::{AssembledFrame, AudioPayload, Position, VideoPayload};

/// One decoder-delivered byte block with a read cursor
#[derive(Debug)]
pub struct RawBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl RawBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    /// Total length of the block
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes already consumed
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn is_consumed(&self) -> bool {
        self.cursor == self.data.len()
    }

    /// Consume up to `max` bytes, advancing the cursor
    fn take(&mut self, max: usize) -> &[u8] {
        let end = self.cursor + max.min(self.remaining());
        let slice = &self.data[self.cursor..end];
        self.cursor = end;
        slice
    }

    /// Unconsumed bytes, without copying when nothing was consumed yet
    fn into_remaining(mut self) -> Vec<u8> {
        if self.cursor > 0 {
            self.data.drain(..self.cursor);
        }
        self.data
    }
}

/// Audio layout the assembler emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTarget {
    pub format: AudioFormat,
    pub channels: u32,
    pub sample_rate: u32,
}

/// Image layout the assembler emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTarget {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Reassembles raw audio/video buffers into per-frame payloads
pub struct SampleAssembler {
    audio: VecDeque<RawBuffer>,
    video: VecDeque<RawBuffer>,

    /// Per-channel samples queued in `audio`. Counted by integer division,
    /// so buffers whose size is not a multiple of the sample frame size make
    /// it drift from the real byte count.
    buffered_samples: u64,

    audio_target: AudioTarget,
    video_target: VideoTarget,
    frame_rate: FrameRate,
    log_target: String,
}

impl SampleAssembler {
    pub fn new(
        audio_target: AudioTarget,
        video_target: VideoTarget,
        frame_rate: FrameRate,
        log_target: impl Into<String>,
    ) -> Self {
        Self {
            audio: VecDeque::new(),
            video: VecDeque::new(),
            buffered_samples: 0,
            audio_target,
            video_target,
            frame_rate,
            log_target: log_target.into(),
        }
    }

    /// Create an assembler for the formats named in `config`
    pub fn from_config(config: &ProducerConfig, log_target: impl Into<String>) -> Self {
        Self::new(
            AudioTarget {
                format: config.audio_format,
                channels: config.channels,
                sample_rate: config.sample_rate,
            },
            VideoTarget {
                format: config.image_format,
                width: config.width,
                height: config.height,
            },
            config.frame_rate,
            log_target,
        )
    }

    fn target(&self) -> &str {
        &self.log_target
    }

    fn frame_size(&self) -> usize {
        self.audio_target.format.frame_size(self.audio_target.channels)
    }

    /// Queue a block of interleaved audio
    pub fn insert_audio(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }

        let frame_size = self.frame_size();
        let size = data.len();
        if size % frame_size != 0 {
            log::warn!(
                target: self.target(),
                "Invalid audio buffer size {} (not a multiple of {})",
                size,
                frame_size
            );
        }

        self.buffered_samples += (size / frame_size) as u64;
        self.audio.push_back(RawBuffer::new(data));
    }

    /// Queue one decoded image
    pub fn insert_video(&mut self, data: Vec<u8>) {
        self.video.push_back(RawBuffer::new(data));
    }

    /// Per-channel samples the frame at `position` needs
    pub fn samples_needed(&self, position: Position) -> u32 {
        self.frame_rate
            .samples_for(position, self.audio_target.sample_rate)
    }

    /// Build the frame for `position` if one image and enough audio are queued.
    ///
    /// Only one image is consumed per call. Audio is drained oldest first; a
    /// block that straddles the frame boundary stays at the head of the queue
    /// with its cursor advanced.
    pub fn pack_frame(&mut self, position: Position) -> Option<AssembledFrame> {
        if self.video.is_empty() {
            return None;
        }

        let needed = self.samples_needed(position);
        if needed as u64 > self.buffered_samples {
            return None;
        }

        let image = self.video.pop_front()?.into_remaining();

        let size = self
            .audio_target
            .format
            .buffer_size(needed, self.audio_target.channels);
        let mut audio = Vec::with_capacity(size);
        while audio.len() < size {
            let Some(front) = self.audio.front_mut() else {
                log::warn!(
                    target: self.target(),
                    "Audio queue ran dry {} bytes short at position {}, padding with silence",
                    size - audio.len(),
                    position
                );
                audio.resize(size, 0);
                break;
            };

            audio.extend_from_slice(front.take(size - audio.len()));
            if front.is_consumed() {
                self.audio.pop_front();
            }
        }
        self.buffered_samples -= needed as u64;

        Some(AssembledFrame::new(
            position,
            AudioPayload {
                data: audio,
                format: self.audio_target.format,
                channels: self.audio_target.channels,
                sample_rate: self.audio_target.sample_rate,
                samples: needed,
            },
            VideoPayload {
                data: image,
                format: self.video_target.format,
                width: self.video_target.width,
                height: self.video_target.height,
            },
        ))
    }

    /// Drop every queued buffer
    pub fn purge(&mut self) {
        self.audio.clear();
        self.video.clear();
        self.buffered_samples = 0;
    }

    /// Purge and release queue storage
    pub fn close(&mut self) {
        self.purge();
        self.audio.shrink_to_fit();
        self.video.shrink_to_fit();
    }

    pub fn buffered_samples(&self) -> u64 {
        self.buffered_samples
    }

    pub fn audio_buffer_count(&self) -> usize {
        self.audio.len()
    }

    pub fn video_buffer_count(&self) -> usize {
        self.video.len()
    }

    /// Unconsumed audio bytes across the queue
    pub fn queued_audio_bytes(&self) -> usize {
        self.audio.iter().map(RawBuffer::remaining).sum()
    }

    /// Read cursor of the oldest queued audio block
    pub fn front_audio_cursor(&self) -> Option<usize> {
        self.audio.front().map(RawBuffer::cursor)
    }

    pub fn audio_target(&self) -> AudioTarget {
        self.audio_target
    }

    pub fn video_target(&self) -> VideoTarget {
        self.video_target
    }
}
