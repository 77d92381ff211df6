//! FFI exports for C hosts
//!
//! All functions in this module are exported with `#[no_mangle]`
//! and use C-compatible types. The four render callbacks have the shape
//! of a memory-output decoder's prerender/postrender hooks, with `data`
//! being the producer handle.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{AudioFormat, FrameRate, ImageFormat, ProducerConfig};
use crate::engine::DecoderEngine;
use crate::error::{Error, Result};
use crate::frame::{FrameHandle, Position, INVALID_POSITION};
use crate::sync::{AudioBufferInfo, SyncCoordinator, SyncState, VideoBufferInfo};

// Thread-local error storage
thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = std::cell::RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

// =============================================================================
// Result Type
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvsResult {
    Success = 0,
    ErrorInvalidCapacity = 1,
    ErrorAllocation = 2,
    ErrorClosed = 3,
    ErrorInvalidPosition = 4,
    ErrorInvalidConfig = 5,
    ErrorSeekTimeout = 6,
    ErrorTimeout = 7,
    ErrorEngine = 8,
    ErrorInvalidHandle = 9,
    ErrorUnknown = 99,
}

impl From<Error> for AvsResult {
    fn from(e: Error) -> Self {
        set_last_error(&e.to_string());
        match e {
            Error::InvalidCapacity(_) => AvsResult::ErrorInvalidCapacity,
            Error::AllocationFailure { .. } => AvsResult::ErrorAllocation,
            Error::Closed => AvsResult::ErrorClosed,
            Error::InvalidPosition(_) => AvsResult::ErrorInvalidPosition,
            Error::InvalidConfig(_) => AvsResult::ErrorInvalidConfig,
            Error::SeekTimeout { .. } => AvsResult::ErrorSeekTimeout,
            Error::Timeout(_) => AvsResult::ErrorTimeout,
            Error::Engine(_) => AvsResult::ErrorEngine,
            Error::InvalidHandle => AvsResult::ErrorInvalidHandle,
            Error::Channel(_) => AvsResult::ErrorUnknown,
        }
    }
}

impl<T> From<Result<T>> for AvsResult {
    fn from(r: Result<T>) -> Self {
        match r {
            Ok(_) => AvsResult::Success,
            Err(e) => e.into(),
        }
    }
}

// =============================================================================
// Error Handling
// =============================================================================

/// Get last error message
#[no_mangle]
pub extern "C" fn avs_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ref().map(|s| s.as_ptr()).unwrap_or(ptr::null()))
}

/// Clear last error
#[no_mangle]
pub extern "C" fn avs_clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Initialize the library (sets up logging).
/// Call once at application startup.
#[no_mangle]
pub extern "C" fn avs_init() {
    crate::init();
}

// =============================================================================
// Configuration Types (FFI)
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AvsProducerConfig {
    pub cache_capacity: u32,
    pub seek_threshold: i64,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub audio_format: u8, // 0=S16, 1=S32, 2=F32
    pub image_format: u8, // 0=RGB24, 1=RGBA, 2=YUV422, 3=YUV420P
    pub width: u32,
    pub height: u32,
    /// 0 = wait indefinitely
    pub wait_timeout_ms: u64,
    /// 0 = wait indefinitely
    pub seek_timeout_ms: u64,
    pub seek_tolerance_ms: i64,
    /// NUL-terminated UTF-8 log target, or null for the default
    pub log_target: *const c_char,
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl From<&AvsProducerConfig> for ProducerConfig {
    fn from(c: &AvsProducerConfig) -> Self {
        ProducerConfig {
            cache_capacity: c.cache_capacity as usize,
            seek_threshold: c.seek_threshold,
            frame_rate: FrameRate::new(c.frame_rate_num, c.frame_rate_den),
            sample_rate: c.sample_rate,
            channels: c.channels,
            audio_format: AudioFormat::from_ffi(c.audio_format),
            image_format: ImageFormat::from_ffi(c.image_format),
            width: c.width,
            height: c.height,
            wait_timeout: optional_millis(c.wait_timeout_ms),
            seek_timeout: optional_millis(c.seek_timeout_ms),
            seek_tolerance_ms: c.seek_tolerance_ms,
            ..ProducerConfig::default()
        }
    }
}

/// Decoder control callbacks supplied by the host
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AvsEngineVTable {
    /// Passed back to every callback
    pub user_data: *mut c_void,
    /// Returns 0 on success
    pub seek_to: Option<extern "C" fn(user_data: *mut c_void, timestamp_ms: i64) -> i32>,
    pub stop: Option<extern "C" fn(user_data: *mut c_void)>,
}

struct FfiEngine {
    vtable: AvsEngineVTable,
}

// The host guarantees the callbacks may be invoked from any thread
unsafe impl Send for FfiEngine {}
unsafe impl Sync for FfiEngine {}

impl DecoderEngine for FfiEngine {
    fn seek_to(&self, timestamp_ms: i64) -> Result<()> {
        let Some(seek_to) = self.vtable.seek_to else {
            return Err(Error::Engine("no seek callback".to_string()));
        };
        match seek_to(self.vtable.user_data, timestamp_ms) {
            0 => Ok(()),
            code => Err(Error::Engine(format!("seek callback returned {}", code))),
        }
    }

    fn stop(&self) {
        if let Some(stop) = self.vtable.stop {
            stop(self.vtable.user_data);
        }
    }
}

// =============================================================================
// Opaque Handles
// =============================================================================

/// Opaque producer handle
pub struct AvsProducerHandle {
    sync: SyncCoordinator,

    /// Buffers handed out by a prerender callback, keyed by address,
    /// awaiting the matching postrender
    loans: Mutex<HashMap<usize, Vec<u8>>>,
}

impl AvsProducerHandle {
    fn lend(&self, mut buffer: Vec<u8>) -> *mut u8 {
        let data = buffer.as_mut_ptr();
        self.loans.lock().insert(data as usize, buffer);
        data
    }

    fn take_loan(&self, data: *mut u8) -> Option<Vec<u8>> {
        self.loans.lock().remove(&(data as usize))
    }
}

/// Opaque frame handle (shares ownership of the cached frame)
pub struct AvsFrameHandle {
    frame: FrameHandle,
}

// =============================================================================
// Producer Lifecycle
// =============================================================================

/// Create producer. A null `config` selects the defaults.
#[no_mangle]
pub extern "C" fn avs_producer_create(
    config: *const AvsProducerConfig,
    engine: *const AvsEngineVTable,
) -> *mut AvsProducerHandle {
    if engine.is_null() {
        set_last_error("Engine vtable is null");
        return ptr::null_mut();
    }

    let producer_config = if config.is_null() {
        ProducerConfig::default()
    } else {
        let config = unsafe { &*config };
        let mut producer_config = ProducerConfig::from(config);
        if !config.log_target.is_null() {
            match unsafe { CStr::from_ptr(config.log_target) }.to_str() {
                Ok(target) => producer_config.log_target = target.to_string(),
                Err(_) => {
                    set_last_error("Log target is not valid UTF-8");
                    return ptr::null_mut();
                }
            }
        }
        producer_config
    };
    let engine = FfiEngine {
        vtable: unsafe { *engine },
    };

    match SyncCoordinator::new(producer_config, engine) {
        Ok(sync) => Box::into_raw(Box::new(AvsProducerHandle {
            sync,
            loans: Mutex::new(HashMap::new()),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Close producer: stops the decoder and wakes every blocked call.
/// The handle stays valid until destroyed.
#[no_mangle]
pub extern "C" fn avs_producer_close(handle: *mut AvsProducerHandle) {
    if handle.is_null() {
        return;
    }
    let handle = unsafe { &*handle };
    handle.sync.close();
}

/// Destroy producer. The decoder must no longer invoke the render
/// callbacks with this handle.
#[no_mangle]
pub extern "C" fn avs_producer_destroy(handle: *mut AvsProducerHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

/// Check if closed
#[no_mangle]
pub extern "C" fn avs_producer_is_closed(handle: *const AvsProducerHandle) -> bool {
    if handle.is_null() {
        return true;
    }
    let handle = unsafe { &*handle };
    handle.sync.is_closed()
}

// =============================================================================
// Decoder Callbacks
// =============================================================================

fn producer<'a>(data: *mut c_void) -> Option<&'a AvsProducerHandle> {
    if data.is_null() {
        set_last_error("Producer handle is null");
        return None;
    }
    Some(unsafe { &*(data as *const AvsProducerHandle) })
}

fn prerender(data: *mut c_void, out_buffer: *mut *mut u8, size: usize, video: bool) {
    if out_buffer.is_null() {
        return;
    }
    unsafe {
        *out_buffer = ptr::null_mut();
    }
    let Some(handle) = producer(data) else {
        return;
    };
    if size == 0 {
        return;
    }

    let buffer = if video {
        handle.sync.allocate_video_buffer(size)
    } else {
        handle.sync.allocate_audio_buffer(size)
    };

    match buffer {
        Ok(buffer) => unsafe {
            *out_buffer = handle.lend(buffer);
        },
        Err(e) => set_last_error(&e.to_string()),
    }
}

/// Hand the decoder a buffer for `size` bytes of audio
#[no_mangle]
pub extern "C" fn avs_audio_prerender(data: *mut c_void, out_buffer: *mut *mut u8, size: usize) {
    prerender(data, out_buffer, size, false);
}

/// Take back an audio buffer filled by the decoder. May block while the
/// consumer catches up.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn avs_audio_postrender(
    data: *mut c_void,
    buffer: *mut u8,
    channels: u32,
    rate: u32,
    nb_samples: u32,
    bits_per_sample: u32,
    size: usize,
    pts_ms: i64,
) {
    let Some(handle) = producer(data) else {
        return;
    };
    let Some(buffer) = handle.take_loan(buffer) else {
        log::warn!(
            target: handle.sync.config().log_target.as_str(),
            "Audio postrender for unknown buffer {:p}",
            buffer
        );
        set_last_error("Unknown audio buffer");
        return;
    };

    let info = AudioBufferInfo {
        channels,
        sample_rate: rate,
        sample_count: nb_samples,
        bits_per_sample,
        size,
        timestamp_ms: pts_ms,
    };
    if let Err(e) = handle.sync.commit_audio_buffer(buffer, info) {
        set_last_error(&e.to_string());
    }
}

/// Hand the decoder a buffer for one image of `size` bytes
#[no_mangle]
pub extern "C" fn avs_video_prerender(data: *mut c_void, out_buffer: *mut *mut u8, size: usize) {
    prerender(data, out_buffer, size, true);
}

/// Take back an image buffer filled by the decoder. May block while the
/// consumer catches up.
#[no_mangle]
pub extern "C" fn avs_video_postrender(
    data: *mut c_void,
    buffer: *mut u8,
    width: u32,
    height: u32,
    bpp: u32,
    size: usize,
    pts_ms: i64,
) {
    let Some(handle) = producer(data) else {
        return;
    };
    let Some(buffer) = handle.take_loan(buffer) else {
        log::warn!(
            target: handle.sync.config().log_target.as_str(),
            "Video postrender for unknown buffer {:p}",
            buffer
        );
        set_last_error("Unknown video buffer");
        return;
    };

    let info = VideoBufferInfo {
        width,
        height,
        bits_per_pixel: bpp,
        size,
        timestamp_ms: pts_ms,
    };
    if let Err(e) = handle.sync.commit_video_buffer(buffer, info) {
        set_last_error(&e.to_string());
    }
}

// =============================================================================
// Frame Access
// =============================================================================

/// Frame data for FFI. Pointers stay valid until the frame handle is
/// released.
#[repr(C)]
pub struct AvsFrame {
    pub position: i64,
    pub audio_data: *const u8,
    pub audio_size: usize,
    /// Samples per channel
    pub audio_samples: u32,
    pub channels: u32,
    pub sample_rate: u32,
    pub audio_format: u8,
    pub video_data: *const u8,
    pub video_size: usize,
    pub width: u32,
    pub height: u32,
    pub image_format: u8,
}

/// Get the frame at `position`, blocking until it is produced
#[no_mangle]
pub extern "C" fn avs_producer_get_frame(
    handle: *const AvsProducerHandle,
    position: Position,
    out_frame: *mut *mut AvsFrameHandle,
) -> AvsResult {
    if handle.is_null() || out_frame.is_null() {
        return AvsResult::ErrorInvalidHandle;
    }

    let handle = unsafe { &*handle };
    match handle.sync.get_frame(position) {
        Ok(frame) => {
            let frame_handle = Box::new(AvsFrameHandle { frame });
            unsafe {
                *out_frame = Box::into_raw(frame_handle);
            }
            AvsResult::Success
        }
        Err(e) => {
            unsafe {
                *out_frame = ptr::null_mut();
            }
            e.into()
        }
    }
}

/// Get frame data from handle
#[no_mangle]
pub extern "C" fn avs_frame_get_data(frame_handle: *const AvsFrameHandle, out_frame: *mut AvsFrame) {
    if frame_handle.is_null() || out_frame.is_null() {
        return;
    }

    let frame_handle = unsafe { &*frame_handle };
    let frame = &frame_handle.frame;

    unsafe {
        (*out_frame).position = frame.position;
        (*out_frame).audio_data = frame.audio.data.as_ptr();
        (*out_frame).audio_size = frame.audio.data.len();
        (*out_frame).audio_samples = frame.audio.samples;
        (*out_frame).channels = frame.audio.channels;
        (*out_frame).sample_rate = frame.audio.sample_rate;
        (*out_frame).audio_format = frame.audio.format as u8;
        (*out_frame).video_data = frame.video.data.as_ptr();
        (*out_frame).video_size = frame.video.data.len();
        (*out_frame).width = frame.video.width;
        (*out_frame).height = frame.video.height;
        (*out_frame).image_format = frame.video.format as u8;
    }
}

/// Release frame handle
#[no_mangle]
pub extern "C" fn avs_frame_release(frame_handle: *mut AvsFrameHandle) {
    if !frame_handle.is_null() {
        unsafe {
            drop(Box::from_raw(frame_handle));
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone)]
pub struct AvsStats {
    pub cache_entries: u32,
    pub cache_capacity: u32,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub purge_count: u64,
    pub memory_usage_bytes: u64,
    pub frames_packed: u64,
    pub seeks_issued: u64,
    pub seeks_completed: u64,
    pub backpressure_waits: u64,
    pub dropped_buffers: u64,
    /// INVALID_POSITION when the cache is empty
    pub earliest_position: i64,
    pub latest_position: i64,
    pub next_position: i64,
    pub seek_pending: bool,
}

/// Get producer statistics
#[no_mangle]
pub extern "C" fn avs_producer_get_stats(
    handle: *const AvsProducerHandle,
    out_stats: *mut AvsStats,
) -> AvsResult {
    if handle.is_null() || out_stats.is_null() {
        return AvsResult::ErrorInvalidHandle;
    }

    let handle = unsafe { &*handle };
    let snapshot = handle.sync.snapshot();
    let cache = &snapshot.cache;
    let sync = &snapshot.sync;
    let window = snapshot.window;

    let stats = AvsStats {
        cache_entries: cache.entries as u32,
        cache_capacity: cache.capacity as u32,
        hit_count: cache.hit_count,
        miss_count: cache.miss_count,
        eviction_count: cache.eviction_count,
        purge_count: cache.purge_count,
        memory_usage_bytes: cache.memory_usage_bytes,
        frames_packed: sync.frames_packed,
        seeks_issued: sync.seeks_issued,
        seeks_completed: sync.seeks_completed,
        backpressure_waits: sync.backpressure_waits,
        dropped_buffers: sync.dropped_buffers,
        earliest_position: window.map(|w| w.earliest).unwrap_or(INVALID_POSITION),
        latest_position: window.map(|w| w.latest).unwrap_or(INVALID_POSITION),
        next_position: snapshot.next_position,
        seek_pending: snapshot.state == SyncState::SeekPending,
    };

    unsafe {
        *out_stats = stats;
    }
    AvsResult::Success
}

// =============================================================================
// Version Info
// =============================================================================

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Get library version
#[no_mangle]
pub extern "C" fn avs_get_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}
