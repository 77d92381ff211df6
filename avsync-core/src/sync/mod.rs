//! Decoder/consumer synchronization
//!
//! The decoder thread pushes raw buffers through the allocate/commit calls;
//! the consumer thread pulls assembled frames by position. Both sides share
//! one mutex guarding the assembler, the frame cache and the seek state, and
//! one condition variable that is broadcast on every change either side may
//! be waiting for.
//!
//! ```text
//! decoder ── commit ──► SampleAssembler ── pack ──► FrameCache ◄── get_frame ── consumer
//!    ▲                                                                   │
//!    └──────────────────────── seek_to / stop ◄──────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::assembler::SampleAssembler;
use crate::cache::{CacheStatistics, FrameCache};
use crate::config::ProducerConfig;
use crate::engine::DecoderEngine;
use crate::error::{Error, Result};
use crate::frame::{FrameHandle, Position};

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Buffers are packed into frames as they arrive
    Running,
    /// Waiting for the decoder to report the seek target timestamp
    SeekPending,
    /// Shutting down; every call returns without blocking
    Terminating,
}

/// In-flight seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekState {
    /// Position the consumer asked for
    pub position: Position,

    /// Decoder timestamp expected for `position`
    pub timestamp_ms: i64,

    /// When the seek command was issued
    pub issued_at: Instant,
}

/// Properties of an audio buffer reported by the decoder on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioBufferInfo {
    pub channels: u32,
    pub sample_rate: u32,
    /// Per-channel samples the decoder wrote
    pub sample_count: u32,
    pub bits_per_sample: u32,
    /// Bytes the decoder wrote
    pub size: usize,
    pub timestamp_ms: i64,
}

/// Properties of a video buffer reported by the decoder on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoBufferInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes the decoder wrote
    pub size: usize,
    pub timestamp_ms: i64,
}

/// Cached window snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedWindow {
    pub earliest: Position,
    pub latest: Position,
    pub len: usize,
}

/// Synchronization statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatistics {
    /// Audio buffers accepted
    pub audio_commits: u64,

    /// Video buffers accepted
    pub video_commits: u64,

    /// Frames assembled and cached
    pub frames_packed: u64,

    /// Seek commands sent to the decoder
    pub seeks_issued: u64,

    /// Seeks whose target timestamp was reported
    pub seeks_completed: u64,

    /// Commits that had to wait for the consumer
    pub backpressure_waits: u64,

    /// Buffers discarded because the producer was closing or because they
    /// arrived before the decoder reported the seek target
    pub dropped_buffers: u64,
}

/// Consistent view of the coordinator, taken under one lock
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub state: SyncState,
    pub window: Option<CachedWindow>,
    pub next_position: Position,
    pub pending_seek: Option<SeekState>,
    pub buffered_samples: u64,
    pub sync: SyncStatistics,
    pub cache: CacheStatistics,
}

/// State guarded by the coordinator lock
struct Shared {
    terminating: bool,
    seek: Option<SeekState>,
    assembler: SampleAssembler,
    cache: FrameCache,

    /// Position the next packed frame gets
    next_position: Position,

    /// Position the consumer asked for last
    requested: Position,

    stats: SyncStatistics,
}

impl Shared {
    fn window(&self) -> Option<CachedWindow> {
        Some(CachedWindow {
            earliest: self.cache.earliest_position()?,
            latest: self.cache.latest_position()?,
            len: self.cache.len(),
        })
    }

    fn state(&self) -> SyncState {
        if self.terminating {
            SyncState::Terminating
        } else if self.seek.is_some() {
            SyncState::SeekPending
        } else {
            SyncState::Running
        }
    }

    /// The decoder must not evict the frame the consumer is about to take
    fn must_hold_back(&self) -> bool {
        !self.terminating
            && self.seek.is_none()
            && self.cache.is_full()
            && self.cache.earliest_position() == Some(self.requested)
    }

    /// Window the seek decision is made against. When nothing is cached it
    /// is the empty window starting where production will resume.
    fn reference_window(&self) -> (Position, Position) {
        if let Some(seek) = self.seek {
            return (seek.position, seek.position - 1);
        }
        match (self.cache.earliest_position(), self.cache.latest_position()) {
            (Some(earliest), Some(latest)) => (earliest, latest),
            _ => (self.next_position, self.next_position - 1),
        }
    }
}

/// Bridges the push-based decoder with the pull-based consumer
pub struct SyncCoordinator {
    config: ProducerConfig,
    engine: Box<dyn DecoderEngine>,
    shared: Mutex<Shared>,
    changed: Condvar,
    log_target: String,
}

impl SyncCoordinator {
    /// Create a coordinator feeding frames from `engine`
    pub fn new<E: DecoderEngine + 'static>(config: ProducerConfig, engine: E) -> Result<Self> {
        config.validate()?;

        let log_target = config.log_target.clone();
        let cache = FrameCache::new(config.cache_capacity)?;
        let assembler = SampleAssembler::from_config(&config, log_target.clone());

        log::info!(
            target: log_target.as_str(),
            "Producer created: {}x{} @ {}/{} fps, {} Hz x{}, cache {}",
            config.width,
            config.height,
            config.frame_rate.num,
            config.frame_rate.den,
            config.sample_rate,
            config.channels,
            config.cache_capacity
        );

        Ok(Self {
            config,
            engine: Box::new(engine),
            shared: Mutex::new(Shared {
                terminating: false,
                seek: None,
                assembler,
                cache,
                next_position: 0,
                requested: 0,
                stats: SyncStatistics::default(),
            }),
            changed: Condvar::new(),
            log_target,
        })
    }

    fn target(&self) -> &str {
        &self.log_target
    }

    // -------------------------------------------------------------------------
    // Decoder side
    // -------------------------------------------------------------------------

    /// Buffer for the decoder to write audio into
    pub fn allocate_audio_buffer(&self, size: usize) -> Result<Vec<u8>> {
        self.allocate(size)
    }

    /// Buffer for the decoder to write one image into
    pub fn allocate_video_buffer(&self, size: usize) -> Result<Vec<u8>> {
        self.allocate(size)
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        if self.shared.lock().terminating {
            return Err(Error::Closed);
        }

        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(size).is_err() {
            log::error!(target: self.target(), "Failed to allocate {} byte buffer", size);
            return Err(Error::AllocationFailure { size });
        }
        buffer.resize(size, 0);
        Ok(buffer)
    }

    /// Hand a filled audio buffer back. May block while the cache is full
    /// and its oldest frame is the one the consumer is on.
    pub fn commit_audio_buffer(&self, mut buffer: Vec<u8>, info: AudioBufferInfo) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.terminating {
            shared.stats.dropped_buffers += 1;
            return Err(Error::Closed);
        }

        self.check_audio(&info, buffer.len());
        self.clamp(&mut buffer, info.size);
        log::trace!(
            target: self.target(),
            "Audio commit: {} bytes, {} samples @ {} ms",
            buffer.len(),
            info.sample_count,
            info.timestamp_ms
        );

        self.match_seek_target(&mut shared, info.timestamp_ms);
        if shared.seek.is_some() {
            shared.stats.dropped_buffers += 1;
            return Ok(());
        }
        shared.assembler.insert_audio(buffer);
        shared.stats.audio_commits += 1;

        self.pack_and_hold(&mut shared);
        Ok(())
    }

    /// Hand a filled image buffer back. Blocks under the same condition as
    /// [`commit_audio_buffer`](Self::commit_audio_buffer).
    pub fn commit_video_buffer(&self, mut buffer: Vec<u8>, info: VideoBufferInfo) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.terminating {
            shared.stats.dropped_buffers += 1;
            return Err(Error::Closed);
        }

        self.check_video(&info, buffer.len());
        self.clamp(&mut buffer, info.size);
        log::trace!(
            target: self.target(),
            "Video commit: {} bytes @ {} ms",
            buffer.len(),
            info.timestamp_ms
        );

        self.match_seek_target(&mut shared, info.timestamp_ms);
        if shared.seek.is_some() {
            shared.stats.dropped_buffers += 1;
            return Ok(());
        }
        shared.assembler.insert_video(buffer);
        shared.stats.video_commits += 1;

        self.pack_and_hold(&mut shared);
        Ok(())
    }

    fn check_audio(&self, info: &AudioBufferInfo, len: usize) {
        if info.channels != self.config.channels || info.sample_rate != self.config.sample_rate {
            log::warn!(
                target: self.target(),
                "Audio buffer is {} Hz x{}, expected {} Hz x{}",
                info.sample_rate,
                info.channels,
                self.config.sample_rate,
                self.config.channels
            );
        }

        let bits = self.config.audio_format.bytes_per_sample() as u32 * 8;
        if info.bits_per_sample != bits {
            log::warn!(
                target: self.target(),
                "Audio buffer has {} bits per sample, expected {}",
                info.bits_per_sample,
                bits
            );
        }

        let declared = self
            .config
            .audio_format
            .buffer_size(info.sample_count, info.channels);
        if declared > info.size.min(len) {
            log::warn!(
                target: self.target(),
                "Audio buffer claims {} samples but holds only {} bytes",
                info.sample_count,
                info.size.min(len)
            );
        }
    }

    fn check_video(&self, info: &VideoBufferInfo, len: usize) {
        if info.width != self.config.width || info.height != self.config.height {
            log::warn!(
                target: self.target(),
                "Video buffer is {}x{}, expected {}x{}",
                info.width,
                info.height,
                self.config.width,
                self.config.height
            );
        }

        let expected = self
            .config
            .image_format
            .image_size(self.config.width, self.config.height);
        if info.size.min(len) < expected {
            log::warn!(
                target: self.target(),
                "Video buffer holds {} bytes, expected {}",
                info.size.min(len),
                expected
            );
        }
    }

    fn clamp(&self, buffer: &mut Vec<u8>, size: usize) {
        if size > buffer.len() {
            log::warn!(
                target: self.target(),
                "Committed size {} exceeds buffer length {}",
                size,
                buffer.len()
            );
            return;
        }
        buffer.truncate(size);
    }

    /// Complete a pending seek when the decoder reports its target timestamp
    fn match_seek_target(&self, shared: &mut MutexGuard<'_, Shared>, timestamp_ms: i64) {
        let Some(seek) = shared.seek else {
            return;
        };
        if timestamp_ms.abs_diff(seek.timestamp_ms) > self.config.seek_tolerance_ms as u64 {
            return;
        }

        shared.assembler.purge();
        shared.cache.purge();
        shared.seek = None;
        shared.next_position = seek.position;
        shared.stats.seeks_completed += 1;

        log::info!(
            target: self.target(),
            "Seek to position {} complete after {:?}",
            seek.position,
            seek.issued_at.elapsed()
        );
        self.changed.notify_all();
    }

    /// Pack every frame the queued buffers allow. Each pack is followed by
    /// the backpressure check, so the frame the consumer is on never gets
    /// evicted.
    fn pack_and_hold(&self, shared: &mut MutexGuard<'_, Shared>) {
        loop {
            self.hold_back(shared);
            if shared.terminating || shared.seek.is_some() {
                break;
            }

            let position = shared.next_position;
            let Some(next) = position.checked_add(1) else {
                break;
            };
            let Some(frame) = shared.assembler.pack_frame(position) else {
                break;
            };
            shared.cache.put(frame.into_handle());
            shared.next_position = next;
            shared.stats.frames_packed += 1;
            self.changed.notify_all();
        }
    }

    fn hold_back(&self, shared: &mut MutexGuard<'_, Shared>) {
        if !shared.must_hold_back() {
            return;
        }

        shared.stats.backpressure_waits += 1;
        log::debug!(
            target: self.target(),
            "Cache full at position {}, waiting for consumer",
            shared.requested
        );
        while shared.must_hold_back() {
            self.changed.wait(shared);
        }
    }

    // -------------------------------------------------------------------------
    // Consumer side
    // -------------------------------------------------------------------------

    /// Frame at `position`, waiting for it to be produced and seeking the
    /// decoder when it lies too far from the cached window. Bounded by
    /// `wait_timeout` when configured.
    pub fn get_frame(&self, position: Position) -> Result<FrameHandle> {
        self.fetch(position, self.config.wait_timeout)
    }

    /// [`get_frame`](Self::get_frame) with an explicit bound on the wait
    pub fn get_frame_timeout(&self, position: Position, timeout: Duration) -> Result<FrameHandle> {
        self.fetch(position, Some(timeout))
    }

    fn fetch(&self, position: Position, timeout: Option<Duration>) -> Result<FrameHandle> {
        if position < 0
            || position == Position::MAX
            || self.config.frame_rate.checked_timestamp_ms(position).is_none()
        {
            return Err(Error::InvalidPosition(position));
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut shared = self.shared.lock();
        if shared.requested != position {
            shared.requested = position;
            self.changed.notify_all();
        }

        let mut missed = false;
        loop {
            if shared.terminating {
                return Err(Error::Closed);
            }

            if shared.cache.contains(position) {
                if let Some(frame) = shared.cache.get(position) {
                    return Ok(frame);
                }
            }
            if !missed {
                shared.cache.record_miss();
                missed = true;
            }

            if self.needs_seek(&shared, position) {
                self.issue_seek(&mut shared, position)?;
                continue;
            }

            let seek_deadline = shared
                .seek
                .filter(|seek| seek.position == position)
                .and_then(|seek| self.config.seek_timeout.map(|t| seek.issued_at + t));

            let wake_at = match (deadline, seek_deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            match wake_at {
                None => self.changed.wait(&mut shared),
                Some(wake_at) => {
                    if !self.changed.wait_until(&mut shared, wake_at).timed_out() {
                        continue;
                    }
                    if shared.terminating {
                        return Err(Error::Closed);
                    }
                    if let Some(frame) = shared.cache.get(position) {
                        return Ok(frame);
                    }
                    return Err(self.timeout_error(&shared, position, timeout));
                }
            }
        }
    }

    fn timeout_error(&self, shared: &Shared, position: Position, timeout: Option<Duration>) -> Error {
        match shared.seek {
            Some(seek) if seek.position == position => {
                log::error!(
                    target: self.target(),
                    "Decoder never reported {} ms for position {}",
                    seek.timestamp_ms,
                    position
                );
                Error::SeekTimeout {
                    position,
                    timestamp_ms: seek.timestamp_ms,
                }
            }
            _ => Error::Timeout(timeout.unwrap_or_default()),
        }
    }

    fn needs_seek(&self, shared: &Shared, position: Position) -> bool {
        let (earliest, latest) = shared.reference_window();
        if earliest <= position && position <= latest {
            return false;
        }
        !(earliest <= position && position.saturating_sub(latest) <= self.config.seek_threshold)
    }

    fn issue_seek(&self, shared: &mut MutexGuard<'_, Shared>, position: Position) -> Result<()> {
        let timestamp_ms = self.config.frame_rate.timestamp_ms(position);
        let seek = SeekState {
            position,
            timestamp_ms,
            issued_at: Instant::now(),
        };
        let previous = shared.seek.replace(seek);
        shared.stats.seeks_issued += 1;

        log::info!(
            target: self.target(),
            "Seeking decoder to position {} ({} ms)",
            position,
            timestamp_ms
        );

        // a decoder held back by a full cache must get going again
        self.changed.notify_all();

        // the decoder may need this lock to act on the command
        let result = MutexGuard::unlocked(shared, || self.engine.seek_to(timestamp_ms));

        if let Err(e) = result {
            log::error!(target: self.target(), "Seek to {} ms failed: {}", timestamp_ms, e);
            // the decoder is still heading for the earlier target, if any
            if shared.seek == Some(seek) {
                shared.seek = previous;
                self.changed.notify_all();
            }
            return Err(e);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lifecycle and introspection
    // -------------------------------------------------------------------------

    /// Stop the decoder and release every queued and cached buffer.
    /// Safe to call more than once.
    pub fn close(&self) {
        {
            let mut shared = self.shared.lock();
            if shared.terminating {
                return;
            }
            shared.terminating = true;
            self.changed.notify_all();
        }

        log::info!(target: self.target(), "Closing producer");
        self.engine.stop();

        let mut shared = self.shared.lock();
        shared.seek = None;
        shared.assembler.close();
        shared.cache.close();
    }

    pub fn state(&self) -> SyncState {
        self.shared.lock().state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().terminating
    }

    /// Positions currently cached
    pub fn cached_window(&self) -> Option<CachedWindow> {
        self.shared.lock().window()
    }

    /// Position the next assembled frame will get
    pub fn next_position(&self) -> Position {
        self.shared.lock().next_position
    }

    pub fn pending_seek(&self) -> Option<SeekState> {
        self.shared.lock().seek
    }

    /// Per-channel audio samples waiting to be packed
    pub fn buffered_samples(&self) -> u64 {
        self.shared.lock().assembler.buffered_samples()
    }

    pub fn statistics(&self) -> SyncStatistics {
        self.shared.lock().stats.clone()
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        self.shared.lock().cache.statistics()
    }

    /// State, window and statistics as of one instant
    pub fn snapshot(&self) -> SyncSnapshot {
        let shared = self.shared.lock();
        SyncSnapshot {
            state: shared.state(),
            window: shared.window(),
            next_position: shared.next_position,
            pending_seek: shared.seek,
            buffered_samples: shared.assembler.buffered_samples(),
            sync: shared.stats.clone(),
            cache: shared.cache.statistics(),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.close();
        log::debug!(target: self.target(), "Producer dropped");
    }
}
