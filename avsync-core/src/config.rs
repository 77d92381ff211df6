//! Producer configuration and media target formats

use std::time::Duration;

use crate::error::{Error, Result};
use crate::frame::Position;

/// Sample format of interleaved audio delivered by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioFormat {
    /// 16-bit signed little-endian integer
    S16 = 0,
    /// 32-bit signed little-endian integer
    S32 = 1,
    /// 32-bit float
    Float32 = 2,
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat::S16
    }
}

impl AudioFormat {
    /// Bytes occupied by one sample of one channel
    pub fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::S16 => 2,
            AudioFormat::S32 | AudioFormat::Float32 => 4,
        }
    }

    /// Bytes occupied by one sample across all channels
    pub fn frame_size(self, channels: u32) -> usize {
        self.bytes_per_sample() * channels as usize
    }

    /// Bytes needed for `samples` per-channel samples
    pub fn buffer_size(self, samples: u32, channels: u32) -> usize {
        self.frame_size(channels) * samples as usize
    }

    pub(crate) fn from_ffi(value: u8) -> Self {
        match value {
            1 => AudioFormat::S32,
            2 => AudioFormat::Float32,
            _ => AudioFormat::S16,
        }
    }
}

/// Pixel layout of decoded images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageFormat {
    /// Packed 24-bit RGB
    Rgb24 = 0,
    /// Packed 32-bit RGBA
    Rgba = 1,
    /// Packed YUV 4:2:2
    Yuv422 = 2,
    /// Planar YUV 4:2:0
    Yuv420p = 3,
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Rgb24
    }
}

impl ImageFormat {
    /// Calculate expected image size for the given geometry
    pub fn image_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            ImageFormat::Rgb24 => pixels * 3,
            ImageFormat::Rgba => pixels * 4,
            ImageFormat::Yuv422 => pixels * 2,
            ImageFormat::Yuv420p => pixels * 3 / 2,
        }
    }

    pub(crate) fn from_ffi(value: u8) -> Self {
        match value {
            1 => ImageFormat::Rgba,
            2 => ImageFormat::Yuv422,
            3 => ImageFormat::Yuv420p,
            _ => ImageFormat::Rgb24,
        }
    }
}

/// Exact frame rate as a rational number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// `round(scaled / num)` without overflowing for any non-negative position
    fn round_div(self, scaled: u128) -> u128 {
        let num = self.num as u128;
        let rounds_up = 2 * (scaled % num) >= num;
        scaled / num + rounds_up as u128
    }

    /// Samples elapsed before `position`, i.e. `round(position * rate / fps)`.
    fn samples_before(self, position: Position, sample_rate: u32) -> u128 {
        let p = position.max(0) as u128;
        self.round_div(p * sample_rate as u128 * self.den as u128)
    }

    /// Per-channel samples belonging to the frame at `position`.
    ///
    /// Rounding is applied to cumulative sample counts, so summing this over
    /// positions `0..n` always equals the rounded duration of `n` frames.
    pub fn samples_for(self, position: Position, sample_rate: u32) -> u32 {
        let end = self.samples_before(position.saturating_add(1), sample_rate);
        let start = self.samples_before(position, sample_rate);
        u32::try_from(end - start).unwrap_or(u32::MAX)
    }

    /// Decoder timestamp of `position` in milliseconds, `round(1000 * position / fps)`,
    /// or None when it does not fit in an `i64`
    pub fn checked_timestamp_ms(self, position: Position) -> Option<i64> {
        let p = position.max(0) as u128;
        i64::try_from(self.round_div(p * 1000 * self.den as u128)).ok()
    }

    /// [`checked_timestamp_ms`](Self::checked_timestamp_ms), saturating at `i64::MAX`
    pub fn timestamp_ms(self, position: Position) -> i64 {
        self.checked_timestamp_ms(position).unwrap_or(i64::MAX)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(25, 1)
    }
}

/// Producer configuration
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Number of assembled frames kept in the frame cache
    pub cache_capacity: usize,

    /// Frames past the cached window that are awaited instead of seeking
    pub seek_threshold: i64,

    /// Output frame rate
    pub frame_rate: FrameRate,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved audio channels
    pub channels: u32,

    /// Audio sample format
    pub audio_format: AudioFormat,

    /// Image pixel format
    pub image_format: ImageFormat,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Upper bound for a consumer pull (None = wait indefinitely)
    pub wait_timeout: Option<Duration>,

    /// Upper bound for the seek handshake (None = wait indefinitely)
    pub seek_timeout: Option<Duration>,

    /// Accepted distance between the reported and the target timestamp
    pub seek_tolerance_ms: i64,

    /// Prefix of the per-instance log target
    pub log_target: String,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            seek_threshold: 25,
            frame_rate: FrameRate::default(),
            sample_rate: 48000,
            channels: 2,
            audio_format: AudioFormat::S16,
            image_format: ImageFormat::Rgb24,
            width: 1920,
            height: 1080,
            wait_timeout: None,
            seek_timeout: None,
            seek_tolerance_ms: 0,
            log_target: "avsync".to_string(),
        }
    }
}

impl ProducerConfig {
    /// Small cache and bounded waits, for interactive playback
    pub fn low_latency() -> Self {
        Self {
            cache_capacity: 10,
            seek_threshold: 10,
            wait_timeout: Some(Duration::from_secs(2)),
            seek_timeout: Some(Duration::from_secs(5)),
            ..Self::default()
        }
    }

    /// Large cache and a wide threshold, for timeline scrubbing
    pub fn scrubbing() -> Self {
        Self {
            cache_capacity: 250,
            seek_threshold: 50,
            seek_timeout: Some(Duration::from_secs(10)),
            ..Self::default()
        }
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity < 1 {
            return Err(Error::InvalidCapacity(self.cache_capacity));
        }
        if self.frame_rate.num == 0 || self.frame_rate.den == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame rate {}/{}",
                self.frame_rate.num, self.frame_rate.den
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample rate 0".to_string()));
        }
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channel count 0".to_string()));
        }
        if self.seek_threshold < 0 {
            return Err(Error::InvalidConfig(format!(
                "seek threshold {}",
                self.seek_threshold
            )));
        }
        if self.seek_tolerance_ms < 0 {
            return Err(Error::InvalidConfig(format!(
                "seek tolerance {} ms",
                self.seek_tolerance_ms
            )));
        }
        Ok(())
    }

    /// Bytes per audio sample across all channels
    pub fn audio_frame_size(&self) -> usize {
        self.audio_format.frame_size(self.channels)
    }
}
