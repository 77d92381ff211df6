//! avsync-core - frame assembly and seek synchronization for decoders
//!
//! This crate sits between a push-based decoder and a pull-based frame
//! consumer:
//! - Assembles raw audio and video buffers into frames with exact
//!   per-frame sample counts
//! - Caches a contiguous window of recent frames
//! - Seeks the decoder when the consumer jumps away from the window
//! - Holds the decoder back while the consumer catches up
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           FFI Layer                  │
//! │  (C exports via #[no_mangle])        │
//! └─────────────────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────┐
//! │          Sync Module                 │
//! │  (decoder/consumer coordination)     │
//! └─────────────────────────────────────┘
//!          │                  │
//!          ▼                  ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │   Assembler     │ │     Cache       │
//! │ (sample split)  │ │ (frame window)  │
//! └─────────────────┘ └─────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────┐
//! │         Engine Port                  │
//! │  (seek/stop commands to decoder)     │
//! └─────────────────────────────────────┘
//! ```

pub mod assembler;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod frame;
pub mod sync;

// Re-export main types
pub use assembler::SampleAssembler;
pub use cache::{CacheStatistics, FrameCache};
pub use config::{AudioFormat, FrameRate, ImageFormat, ProducerConfig};
pub use engine::{ChannelEngine, DecoderEngine, EngineCommand};
pub use error::{Error, Result};
pub use frame::{AssembledFrame, AudioPayload, FrameHandle, Position, VideoPayload};
pub use sync::{
    AudioBufferInfo, CachedWindow, SyncCoordinator, SyncSnapshot, SyncState, SyncStatistics,
    VideoBufferInfo,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library (call once at startup)
pub fn init() {
    // Initialize logging with info level by default if RUST_LOG is not set
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();

    log::info!("avsync-core {} initialized", VERSION);
}
