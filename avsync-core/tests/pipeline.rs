//! End-to-end tests driving a fake decoder thread through the public API

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use avsync_core::{
    AudioBufferInfo, ChannelEngine, EngineCommand, Error, FrameRate, Position, ProducerConfig,
    Result, SyncCoordinator, VideoBufferInfo,
};
use crossbeam_channel::{bounded, Receiver};

const IMAGE_SIZE: usize = 2 * 2 * 3;

fn config(cache_capacity: usize) -> ProducerConfig {
    ProducerConfig {
        cache_capacity,
        frame_rate: FrameRate::new(25, 1),
        sample_rate: 48000,
        channels: 2,
        width: 2,
        height: 2,
        wait_timeout: Some(Duration::from_secs(5)),
        log_target: "avsync::pipeline".to_string(),
        ..ProducerConfig::default()
    }
}

/// Commit one image and the audio of one frame interval, both stamped with
/// the frame's start time
fn emit(sync: &SyncCoordinator, position: Position) -> Result<()> {
    let rate = sync.config().frame_rate;
    let timestamp_ms = rate.timestamp_ms(position);

    let mut image = sync.allocate_video_buffer(IMAGE_SIZE)?;
    image.fill(position as u8);
    sync.commit_video_buffer(
        image,
        VideoBufferInfo {
            width: 2,
            height: 2,
            bits_per_pixel: 24,
            size: IMAGE_SIZE,
            timestamp_ms,
        },
    )?;

    let samples = rate.samples_for(position, 48000);
    let size = samples as usize * 4;
    let pcm = sync.allocate_audio_buffer(size)?;
    sync.commit_audio_buffer(
        pcm,
        AudioBufferInfo {
            channels: 2,
            sample_rate: 48000,
            sample_count: samples,
            bits_per_sample: 16,
            size,
            timestamp_ms,
        },
    )
}

/// Decode loop: emits consecutive frames, follows seek commands, and waits
/// on `gate` before emitting `gated`
fn spawn_decoder(
    sync: Arc<SyncCoordinator>,
    commands: Receiver<EngineCommand>,
    gated: Position,
    gate: Receiver<()>,
    last: Option<Position>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut position = 0;
        loop {
            while let Ok(command) = commands.try_recv() {
                match command {
                    EngineCommand::Seek { timestamp_ms } => position = timestamp_ms / 40,
                    EngineCommand::Stop => return,
                }
            }
            if last.is_some_and(|last| position > last) {
                return;
            }
            if position == gated && gate.recv().is_err() {
                return;
            }
            if emit(&sync, position).is_err() {
                return;
            }
            position += 1;
        }
    })
}

#[test]
fn test_sequential_playback_then_seek() {
    let (engine, commands) = ChannelEngine::new(8);
    let sync = Arc::new(SyncCoordinator::new(config(3), engine).unwrap());
    let (gate_tx, gate_rx) = bounded(1);
    let decoder = spawn_decoder(sync.clone(), commands, 3, gate_rx, None);

    for position in 0..3 {
        let frame = sync.get_frame(position).unwrap();
        assert_eq!(frame.position, position);
        assert_eq!(frame.video.data, vec![position as u8; IMAGE_SIZE]);
        assert_eq!(frame.audio.samples, 1920);
        assert_eq!(frame.audio.data.len(), 1920 * 4);
    }
    assert_eq!(sync.statistics().seeks_issued, 0);

    // frame 3 cannot exist before the gate opens
    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
    });
    let start = Instant::now();
    let frame = sync.get_frame(3).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(frame.position, 3);
    opener.join().unwrap();

    // far ahead of the window: the decoder is repositioned
    let frame = sync.get_frame(40).unwrap();
    assert_eq!(frame.position, 40);
    assert_eq!(frame.video.data, vec![40u8; IMAGE_SIZE]);
    assert_eq!(frame.audio.samples, 1920);

    let stats = sync.statistics();
    assert_eq!(stats.seeks_issued, 1);
    assert_eq!(stats.seeks_completed, 1);
    assert_eq!(sync.cached_window().unwrap().earliest, 40);

    let frame = sync.get_frame(41).unwrap();
    assert_eq!(frame.video.data, vec![41u8; IMAGE_SIZE]);

    sync.close();
    decoder.join().unwrap();
    assert!(matches!(sync.get_frame(41), Err(Error::Closed)));
}

#[test]
fn test_backward_seek() {
    let (engine, commands) = ChannelEngine::with_log_target(8, "avsync::pipeline");
    let sync = Arc::new(SyncCoordinator::new(config(4), engine).unwrap());
    let (_gate_tx, gate_rx) = bounded(1);
    let decoder = spawn_decoder(sync.clone(), commands, Position::MAX, gate_rx, None);

    let frame = sync.get_frame(60).unwrap();
    assert_eq!(frame.position, 60);

    let frame = sync.get_frame(10).unwrap();
    assert_eq!(frame.position, 10);
    assert_eq!(frame.video.data, vec![10u8; IMAGE_SIZE]);
    assert_eq!(sync.statistics().seeks_completed, 2);

    sync.close();
    decoder.join().unwrap();
}

#[test]
fn test_end_of_stream_times_out() {
    let (engine, commands) = ChannelEngine::new(8);
    let sync = Arc::new(SyncCoordinator::new(config(8), engine).unwrap());
    let (_gate_tx, gate_rx) = bounded(1);
    let decoder = spawn_decoder(sync.clone(), commands, Position::MAX, gate_rx, Some(4));
    decoder.join().unwrap();

    assert_eq!(sync.get_frame(4).unwrap().position, 4);

    let result = sync.get_frame_timeout(6, Duration::from_millis(100));
    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(sync.statistics().seeks_issued, 0);
    assert_eq!(sync.buffered_samples(), 0);
}

#[test]
fn test_close_wakes_waiting_consumer() {
    let (engine, _commands) = ChannelEngine::new(8);
    let mut config = config(3);
    config.wait_timeout = None;
    let sync = Arc::new(SyncCoordinator::new(config, engine).unwrap());

    let consumer = {
        let sync = sync.clone();
        thread::spawn(move || sync.get_frame(0))
    };
    thread::sleep(Duration::from_millis(20));
    sync.close();

    assert!(matches!(consumer.join().unwrap(), Err(Error::Closed)));
}
