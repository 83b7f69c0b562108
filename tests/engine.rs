//! Engine integration tests driven through a fake hardware backend.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use duplex_voice::{
    AudioBackend, AudioEngine, CaptureSource, EngineConfig, EngineError, EngineEvent,
    InterruptionKind, PlaybackSink, RecoveryState, SPECTRUM_BINS, SessionEvent,
};

// ======================== Fake backend ========================

#[derive(Default)]
struct FakeState {
    /// Scripted mic frames the fake capture device hands to the engine.
    mic_frames: Mutex<VecDeque<Vec<f32>>>,
    /// Every sample written to the fake output device, in write order.
    played: Mutex<Vec<i16>>,
    captures_opened: AtomicUsize,
    sinks_released: AtomicUsize,
    discards: AtomicUsize,
}

struct FakeBackend {
    state: Arc<FakeState>,
}

struct FakeCapture {
    state: Arc<FakeState>,
}

impl CaptureSource for FakeCapture {
    fn frame_size(&self) -> usize {
        240
    }

    fn read(&mut self, buf: &mut [f32]) -> anyhow::Result<usize> {
        if let Some(frame) = self.state.mic_frames.lock().pop_front() {
            let n = frame.len().min(buf.len());
            buf[..n].copy_from_slice(&frame[..n]);
            return Ok(n);
        }
        thread::sleep(Duration::from_millis(1));
        Ok(0)
    }
}

struct FakeSink {
    state: Arc<FakeState>,
}

impl PlaybackSink for FakeSink {
    fn write(&mut self, samples: &[i16]) -> anyhow::Result<usize> {
        self.state.played.lock().extend_from_slice(samples);
        Ok(samples.len())
    }

    fn recover(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn discard(&mut self) -> anyhow::Result<()> {
        self.state.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.state.sinks_released.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioBackend for FakeBackend {
    fn open_capture(&self, _config: &EngineConfig) -> Result<Box<dyn CaptureSource>, EngineError> {
        self.state.captures_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            state: self.state.clone(),
        }))
    }

    fn open_playback(&self, _config: &EngineConfig) -> Result<Box<dyn PlaybackSink>, EngineError> {
        Ok(Box::new(FakeSink {
            state: self.state.clone(),
        }))
    }

    fn activate_session(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn deactivate_session(&self) {}
}

// ======================== Helpers ========================

fn engine_with(
    config: EngineConfig,
) -> (AudioEngine, Arc<FakeState>, mpsc::Receiver<EngineEvent>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let state = Arc::new(FakeState::default());
    let (tx, rx) = mpsc::channel(1024);
    let engine = AudioEngine::new(
        config,
        Box::new(FakeBackend {
            state: state.clone(),
        }),
        tx,
    )
    .expect("engine construction failed");
    (engine, state, rx)
}

/// Default config with the warm-up window disabled so capture tests see
/// their frames immediately.
fn quiet_config() -> EngineConfig {
    EngineConfig {
        aec_warmup_ms: 0,
        ..EngineConfig::default()
    }
}

fn pcm_bytes(samples: &[i16]) -> Bytes {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        data.extend_from_slice(&s.to_le_bytes());
    }
    Bytes::from(data)
}

fn wait_until(pred: impl Fn() -> bool, ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(ms);
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    pred()
}

fn next_matching(
    rx: &mut mpsc::Receiver<EngineEvent>,
    ms: u64,
    pred: impl Fn(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
    let deadline = Instant::now() + Duration::from_millis(ms);
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(ev) => {
                if pred(&ev) {
                    return Some(ev);
                }
            }
            Err(_) => thread::sleep(Duration::from_millis(2)),
        }
    }
    None
}

fn is_interruption(ev: &EngineEvent, kind: InterruptionKind) -> bool {
    matches!(ev, EngineEvent::Interruption(k) if *k == kind)
}

// ======================== Playback ========================

#[test]
fn playback_drains_chunks_in_enqueue_order() {
    let (engine, state, _rx) = engine_with(quiet_config());

    let first: Vec<i16> = (0..256).collect();
    let second: Vec<i16> = (256..512).collect();
    let third: Vec<i16> = (512..768).collect();
    engine.play_pcm(pcm_bytes(&first)).unwrap();
    engine.play_pcm(pcm_bytes(&second)).unwrap();
    engine.play_pcm(pcm_bytes(&third)).unwrap();

    assert!(
        wait_until(|| state.played.lock().len() >= 768, 2000),
        "worker did not drain the queue"
    );
    let expected: Vec<i16> = (0..768).collect();
    assert_eq!(*state.played.lock(), expected);
}

#[test]
fn sine_playback_produces_spectrum_peak_near_1khz() {
    let (engine, _state, _rx) = engine_with(quiet_config());

    // 1024-sample 1 kHz sine at 24 kHz fills the ring in one chunk;
    // expected peak bin: 1024 * 1000 / 24000 ≈ 43
    let sine: Vec<i16> = (0..1024)
        .map(|i| {
            let t = i as f32 / 24000.0;
            (0.5 * (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * 32767.0) as i16
        })
        .collect();
    engine.play_pcm(pcm_bytes(&sine)).unwrap();

    assert!(
        wait_until(
            || engine.byte_frequency_data().iter().any(|&b| b == 255),
            2000,
        ),
        "spectrum never reached full scale"
    );

    let bins = engine.byte_frequency_data();
    assert_eq!(bins.len(), SPECTRUM_BINS);
    let (peak_idx, &peak) = bins.iter().enumerate().max_by_key(|&(_, &b)| b).unwrap();
    assert_eq!(peak, 255);
    assert!(
        (41..=45).contains(&peak_idx),
        "peak at bin {peak_idx}, expected near 43"
    );
}

#[test]
fn spectrum_is_zero_before_anything_played() {
    let (engine, _state, _rx) = engine_with(quiet_config());
    assert_eq!(engine.byte_frequency_data(), [0u8; SPECTRUM_BINS]);
}

#[test]
fn clear_queue_discards_device_buffer_and_reports_zero_level() {
    let (engine, state, mut rx) = engine_with(quiet_config());

    engine.play_pcm(pcm_bytes(&[100i16; 64])).unwrap();
    engine.clear_queue();

    assert!(state.discards.load(Ordering::SeqCst) >= 1);
    assert!(
        next_matching(&mut rx, 1000, |ev| matches!(
            ev,
            EngineEvent::OutputLevel(v) if *v == 0.0
        ))
        .is_some(),
        "no zero output-level reading after clear_queue"
    );
}

#[test]
fn play_encoded_pcm_passthrough_reaches_the_device() {
    let (engine, state, _rx) = engine_with(quiet_config());

    let samples = [7i16, -7, 1000, -1000];
    engine.play_encoded(pcm_bytes(&samples).as_ref()).unwrap();

    assert!(wait_until(|| state.played.lock().len() >= 4, 2000));
    assert_eq!(*state.played.lock(), samples.to_vec());
}

// ======================== Recording ========================

#[test]
fn toggle_recording_is_idempotent() {
    let (mut engine, state, mut rx) = engine_with(quiet_config());

    assert!(engine.toggle_recording(true).unwrap());
    assert!(engine.toggle_recording(true).unwrap());
    assert!(engine.is_recording());
    // The capture device is opened once, not restarted by the second toggle
    assert_eq!(state.captures_opened.load(Ordering::SeqCst), 1);

    assert!(!engine.toggle_recording(false).unwrap());
    assert!(!engine.toggle_recording(false).unwrap());
    assert!(!engine.is_recording());

    // One final zero-volume reading is delivered on stop
    assert!(
        next_matching(&mut rx, 1000, |ev| matches!(
            ev,
            EngineEvent::InputLevel(v) if *v == 0.0
        ))
        .is_some()
    );
}

#[test]
fn mic_frames_are_converted_and_delivered() {
    let (mut engine, state, mut rx) = engine_with(quiet_config());
    // Bypass the DSP chain so the delivered samples are the plain conversion
    engine.bypass_voice_processing(true);
    engine.toggle_recording(true).unwrap();

    state.mic_frames.lock().push_back(vec![0.5; 240]);

    let ev = next_matching(&mut rx, 2000, |ev| matches!(ev, EngineEvent::MicData(_)))
        .expect("no mic data delivered");
    let EngineEvent::MicData(data) = ev else {
        unreachable!()
    };
    assert_eq!(data.len(), 480);
    let sample = i16::from_le_bytes([data[0], data[1]]);
    assert_eq!(sample, 16384); // round(0.5 * 32767)

    // A nonzero input level follows the data
    assert!(
        next_matching(&mut rx, 1000, |ev| matches!(
            ev,
            EngineEvent::InputLevel(v) if *v > 0.0
        ))
        .is_some()
    );
}

#[test]
fn warmup_window_suppresses_capture_delivery() {
    let config = EngineConfig {
        aec_warmup_ms: 120,
        ..EngineConfig::default()
    };
    let (mut engine, state, mut rx) = engine_with(config);
    engine.bypass_voice_processing(true);
    engine.toggle_recording(true).unwrap();

    // First playback start arms the suppression window
    engine.play_pcm(pcm_bytes(&[0i16; 240])).unwrap();
    for _ in 0..5 {
        state.mic_frames.lock().push_back(vec![0.25; 240]);
    }

    assert!(
        next_matching(&mut rx, 60, |ev| matches!(ev, EngineEvent::MicData(_))).is_none(),
        "mic data delivered during warm-up window"
    );

    thread::sleep(Duration::from_millis(150));
    state.mic_frames.lock().push_back(vec![0.25; 240]);
    assert!(
        next_matching(&mut rx, 2000, |ev| matches!(ev, EngineEvent::MicData(_))).is_some(),
        "mic data still suppressed after warm-up elapsed"
    );
}

// ======================== Lifecycle ========================

#[test]
fn teardown_blocks_operations_and_releases_the_sink_once() {
    let (mut engine, state, _rx) = engine_with(quiet_config());
    engine.toggle_recording(true).unwrap();

    engine.tear_down();
    assert_eq!(engine.recovery_state(), RecoveryState::TornDown);
    assert!(!engine.is_recording());

    assert!(matches!(
        engine.play_pcm(pcm_bytes(&[1i16; 8])),
        Err(EngineError::TornDown)
    ));
    assert!(matches!(
        engine.toggle_recording(true),
        Err(EngineError::TornDown)
    ));
    // Spectrum queries degrade to a zeroed no-op instead of crashing
    assert_eq!(engine.byte_frequency_data(), [0u8; SPECTRUM_BINS]);

    // A second teardown must not release the handle again
    engine.tear_down();
    assert_eq!(state.sinks_released.load(Ordering::SeqCst), 1);
}

#[test]
fn restart_reconstructs_a_working_engine() {
    let (mut engine, state, _rx) = engine_with(quiet_config());
    engine.play_pcm(pcm_bytes(&[5i16; 128])).unwrap();
    assert!(wait_until(|| state.played.lock().len() >= 128, 2000));

    engine.tear_down();
    engine.restart().unwrap();
    assert_eq!(engine.recovery_state(), RecoveryState::Active);

    state.played.lock().clear();
    engine.play_pcm(pcm_bytes(&[9i16; 64])).unwrap();
    assert!(wait_until(|| state.played.lock().len() >= 64, 2000));
    assert!(engine.toggle_recording(true).unwrap());
}

// ======================== Interruption recovery ========================

#[test]
fn interruption_stops_activity_and_resume_hint_restores_it() {
    let (mut engine, state, mut rx) = engine_with(quiet_config());
    engine.toggle_recording(true).unwrap();

    engine.handle_session_event(SessionEvent::InterruptionBegan);
    assert_eq!(engine.recovery_state(), RecoveryState::Interrupted);
    assert!(!engine.is_recording());
    assert!(
        next_matching(&mut rx, 1000, |ev| is_interruption(ev, InterruptionKind::Began)).is_some()
    );

    // No resume hint: stay interrupted, observers see "blocked"
    engine.handle_session_event(SessionEvent::InterruptionEnded {
        should_resume: false,
    });
    assert_eq!(engine.recovery_state(), RecoveryState::Interrupted);
    assert!(
        next_matching(&mut rx, 1000, |ev| is_interruption(ev, InterruptionKind::Blocked))
            .is_some()
    );

    // Resume hint: back to Active, recording restarts on a fresh device
    engine.handle_session_event(SessionEvent::InterruptionEnded {
        should_resume: true,
    });
    assert_eq!(engine.recovery_state(), RecoveryState::Active);
    assert!(engine.is_recording());
    assert_eq!(state.captures_opened.load(Ordering::SeqCst), 2);
    assert!(
        next_matching(&mut rx, 1000, |ev| is_interruption(ev, InterruptionKind::Ended)).is_some()
    );
}

#[test]
fn focus_loss_notifies_blocked_without_changing_state() {
    let (mut engine, _state, mut rx) = engine_with(quiet_config());

    engine.handle_session_event(SessionEvent::FocusLost);
    assert_eq!(engine.recovery_state(), RecoveryState::Active);
    assert!(
        next_matching(&mut rx, 1000, |ev| is_interruption(ev, InterruptionKind::Blocked))
            .is_some()
    );
}

#[test]
fn media_services_reset_rebuilds_the_graph_and_resumes() {
    let (mut engine, state, _rx) = engine_with(quiet_config());
    engine.toggle_recording(true).unwrap();

    engine.handle_session_event(SessionEvent::MediaServicesReset);
    assert_eq!(engine.recovery_state(), RecoveryState::Active);
    assert!(engine.is_recording());
    // Old sink released, new capture device opened
    assert_eq!(state.sinks_released.load(Ordering::SeqCst), 1);
    assert_eq!(state.captures_opened.load(Ordering::SeqCst), 2);

    engine.play_pcm(pcm_bytes(&[3i16; 32])).unwrap();
    assert!(wait_until(|| state.played.lock().len() >= 32, 2000));
}

#[test]
fn route_change_swaps_the_sink_without_interrupting() {
    let (mut engine, state, _rx) = engine_with(quiet_config());
    engine.toggle_recording(true).unwrap();

    engine.handle_session_event(SessionEvent::RouteChanged);
    assert_eq!(engine.recovery_state(), RecoveryState::Active);
    assert!(engine.is_recording());
    assert_eq!(state.sinks_released.load(Ordering::SeqCst), 1);

    engine.play_pcm(pcm_bytes(&[2i16; 32])).unwrap();
    assert!(wait_until(|| state.played.lock().len() >= 32, 2000));
}
