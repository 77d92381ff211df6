//! Build script for avsync-core
//!
//! Generates the C header for the FFI layer using cbindgen.

use std::env;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let Ok(out_dir) = env::var("OUT_DIR") else {
        println!("cargo:warning=OUT_DIR not set, skipping header generation");
        return;
    };
    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR not set, skipping header generation");
        return;
    };

    generate_header(&manifest_dir, &out_dir);
}

/// Generate C header using cbindgen
fn generate_header(manifest_dir: &str, out_dir: &str) {
    let crate_dir = PathBuf::from(manifest_dir);
    let config_path = crate_dir.join("cbindgen.toml");
    let header_out = PathBuf::from(out_dir).join("avsync.h");
    let include_dir = crate_dir.join("include");

    // Load cbindgen config
    let config = if config_path.exists() {
        cbindgen::Config::from_file(&config_path).unwrap_or_default()
    } else {
        cbindgen::Config::default()
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&header_out);
            println!("cargo:info=Generated header: {}", header_out.display());

            // Also copy next to the crate when a host keeps it there
            if include_dir.exists() {
                let copy = include_dir.join("avsync.h");
                bindings.write_to_file(&copy);
                println!("cargo:info=Copied header to {}", copy.display());
            }
        }
        Err(e) => {
            println!("cargo:warning=cbindgen failed: {}", e);
            create_fallback_header(&header_out);
        }
    }
}

/// Create a minimal fallback header if cbindgen fails
fn create_fallback_header(header_path: &Path) {
    let header_content = r#"
#ifndef AVSYNC_H
#define AVSYNC_H

#include <stdint.h>
#include <stdbool.h>
#include <stddef.h>

// Note: This is a fallback header. Build with cbindgen for full API.

typedef enum {
    AvsResultSuccess = 0,
    AvsResultErrorInvalidCapacity = 1,
    AvsResultErrorAllocation = 2,
    AvsResultErrorClosed = 3,
    AvsResultErrorInvalidPosition = 4,
    AvsResultErrorInvalidConfig = 5,
    AvsResultErrorSeekTimeout = 6,
    AvsResultErrorTimeout = 7,
    AvsResultErrorEngine = 8,
    AvsResultErrorInvalidHandle = 9,
    AvsResultErrorUnknown = 99,
} AvsResult;

typedef struct AvsProducerHandle AvsProducerHandle;
typedef struct AvsFrameHandle AvsFrameHandle;
typedef struct AvsProducerConfig AvsProducerConfig;
typedef struct AvsFrame AvsFrame;
typedef struct AvsStats AvsStats;

typedef struct {
    void* user_data;
    int32_t (*seek_to)(void* user_data, int64_t timestamp_ms);
    void (*stop)(void* user_data);
} AvsEngineVTable;

// Error handling
const char* avs_get_last_error(void);
void avs_clear_last_error(void);

// Library
void avs_init(void);
const char* avs_get_version(void);

// Producer lifecycle
AvsProducerHandle* avs_producer_create(const AvsProducerConfig* config,
                                       const AvsEngineVTable* engine);
void avs_producer_close(AvsProducerHandle* handle);
void avs_producer_destroy(AvsProducerHandle* handle);
bool avs_producer_is_closed(const AvsProducerHandle* handle);

// Decoder callbacks (data = producer handle)
void avs_audio_prerender(void* data, uint8_t** out_buffer, size_t size);
void avs_audio_postrender(void* data, uint8_t* buffer, uint32_t channels, uint32_t rate,
                          uint32_t nb_samples, uint32_t bits_per_sample, size_t size,
                          int64_t pts_ms);
void avs_video_prerender(void* data, uint8_t** out_buffer, size_t size);
void avs_video_postrender(void* data, uint8_t* buffer, uint32_t width, uint32_t height,
                          uint32_t bpp, size_t size, int64_t pts_ms);

// Frame access
AvsResult avs_producer_get_frame(const AvsProducerHandle* handle, int64_t position,
                                 AvsFrameHandle** out_frame);
void avs_frame_get_data(const AvsFrameHandle* frame, AvsFrame* out_frame);
void avs_frame_release(AvsFrameHandle* frame);

// Statistics
AvsResult avs_producer_get_stats(const AvsProducerHandle* handle, AvsStats* out_stats);

#endif // AVSYNC_H
"#;

    match std::fs::write(header_path, header_content) {
        Ok(()) => println!("cargo:info=Created fallback header: {}", header_path.display()),
        Err(e) => println!("cargo:warning=Failed to write fallback header: {}", e),
    }
}
