//! The audio engine: capture tap, playback queue/worker, echo-cancellation
//! warm-up policy, volume meters, output ring buffer, and spectrum analyzer.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async host tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{AudioBackend, PlaybackSink};
use crate::capture;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::playback::{self, PlaybackQueue};
use crate::ring_buffer::OutputRingBuffer;
use crate::session::{InterruptionKind, RecoveryState, SessionEvent};
use crate::spectrum::{FFT_SIZE, SPECTRUM_BINS, SpectrumAnalyzer};
use crate::speex::EchoCanceller;
use crate::stream_decoder::{self, StreamDecoder};

/// State shared between the engine, the capture thread, and the playback
/// worker. The ring buffer, queue, echo state, and sink are the only data
/// crossing execution contexts; each sits behind its own mutex.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) events: mpsc::Sender<EngineEvent>,
    pub(crate) queue: PlaybackQueue,
    pub(crate) ring: Mutex<OutputRingBuffer>,
    pub(crate) spectrum: Mutex<SpectrumAnalyzer>,
    pub(crate) echo: Mutex<EchoCanceller>,
    pub(crate) sink: Mutex<Option<Box<dyn PlaybackSink>>>,
    pub(crate) decoder: Mutex<Box<dyn StreamDecoder>>,
    pub(crate) recording: AtomicBool,
    pub(crate) worker_running: AtomicBool,
    pub(crate) suspended: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    pub(crate) bypass: AtomicBool,
    pub(crate) playback_started: AtomicBool,
    pub(crate) warmup_until: Mutex<Option<Instant>>,
}

impl EngineShared {
    /// True while the post-first-playback suppression window is open.
    /// The deadline is self-clearing: once passed it is dropped here.
    pub(crate) fn warmup_active(&self) -> bool {
        let mut guard = self.warmup_until.lock();
        match *guard {
            Some(deadline) if Instant::now() < deadline => true,
            Some(_) => {
                *guard = None;
                log::info!("AEC warm-up window elapsed, resuming capture delivery");
                false
            }
            None => false,
        }
    }

    /// Fatal runtime path: stop everything, release the output device, and
    /// report the failure. Called from the capture thread on read errors.
    pub(crate) fn fatal_teardown(&self, err: &anyhow::Error) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.recording.store(false, Ordering::SeqCst);
        self.queue.clear();
        *self.sink.lock() = None;
        let _ = self
            .events
            .try_send(EngineEvent::Fatal(format!("{err:#}")));
    }
}

/// Full-duplex voice audio engine.
///
/// Owns the capture thread, the playback queue and its worker, both volume
/// meters, the output ring buffer, and the spectrum analyzer. Events are
/// pushed through the channel supplied at construction.
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    backend: Box<dyn AudioBackend>,
    state: RecoveryState,
    /// Whether recording was active when an interruption began.
    resume_recording: bool,
    capture_thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Initialize the engine: open the output device, build the DSP chain,
    /// and activate the platform session (best-effort).
    pub fn new(
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let decoder = stream_decoder::create_decoder(&config.stream_format, config.sample_rate)?;

        let tail_samples = (config.sample_rate as usize * config.echo_tail_ms as usize) / 1000;
        let echo = EchoCanceller::new(config.capture_period, tail_samples, config.sample_rate)
            .map_err(|e| EngineError::Dsp(format!("{e:#}")))?;

        let sink = backend.open_playback(&config)?;
        if let Err(e) = backend.activate_session() {
            log::warn!("audio session activation failed: {e:#}");
        }

        log::info!(
            "AudioEngine initialized — capture: \"{}\", playback: \"{}\", rate: {}Hz, format: {}",
            config.capture_device,
            config.playback_device,
            config.sample_rate,
            config.stream_format,
        );

        let shared = Arc::new(EngineShared {
            queue: PlaybackQueue::new(config.queue_capacity),
            ring: Mutex::new(OutputRingBuffer::new(FFT_SIZE)),
            spectrum: Mutex::new(SpectrumAnalyzer::new()),
            echo: Mutex::new(echo),
            sink: Mutex::new(Some(sink)),
            decoder: Mutex::new(decoder),
            recording: AtomicBool::new(false),
            worker_running: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            bypass: AtomicBool::new(false),
            playback_started: AtomicBool::new(false),
            warmup_until: Mutex::new(None),
            events,
            config,
        });

        Ok(Self {
            shared,
            backend,
            state: RecoveryState::Active,
            resume_recording: false,
            capture_thread: None,
        })
    }

    // ======================== Playback ========================

    /// Enqueue a chunk of 16-bit little-endian mono PCM for playback.
    /// Never blocks; over capacity the oldest pending chunks are dropped.
    pub fn play_pcm(&self, chunk: Bytes) -> Result<(), EngineError> {
        self.ensure_live()?;
        if chunk.is_empty() {
            return Ok(());
        }

        self.arm_warmup();

        let dropped = self.shared.queue.push(chunk);
        if dropped > 0 {
            log::debug!("playback queue full, dropped {dropped} oldest chunk(s)");
        }
        self.spawn_worker_if_idle();
        Ok(())
    }

    /// Decode an encoded chunk with the configured stream decoder and
    /// enqueue the resulting PCM.
    pub fn play_encoded(&self, data: &[u8]) -> Result<(), EngineError> {
        self.ensure_live()?;
        let samples = self
            .shared
            .decoder
            .lock()
            .decode(data)
            .map_err(|e| EngineError::Decode(format!("{e:#}")))?;
        if samples.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in &samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.play_pcm(Bytes::from(bytes))
    }

    /// Empty the pending queue, discard device-buffered audio, and report a
    /// zero output level. An already-draining worker simply finds an empty
    /// queue and exits normally.
    pub fn clear_queue(&self) {
        self.shared.queue.clear();
        if let Some(sink) = self.shared.sink.lock().as_mut() {
            if let Err(e) = sink.discard() {
                log::warn!("failed to discard buffered playback: {e:#}");
            }
        }
        let _ = self
            .shared
            .events
            .try_send(EngineEvent::OutputLevel(0.0));
    }

    /// On the very first playback start of this engine's lifetime, open the
    /// capture-delivery suppression window for the echo canceller to adapt.
    fn arm_warmup(&self) {
        if self.shared.playback_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let warmup_ms = self.shared.config.aec_warmup_ms;
        if warmup_ms == 0 {
            return;
        }
        *self.shared.warmup_until.lock() =
            Some(Instant::now() + Duration::from_millis(warmup_ms));
        log::info!("first playback start, suppressing capture delivery for {warmup_ms}ms AEC warm-up");
    }

    fn spawn_worker_if_idle(&self) {
        if self.shared.suspended.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.worker_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || playback::run_worker(shared));
        if let Err(e) = spawned {
            self.shared.worker_running.store(false, Ordering::SeqCst);
            log::error!("failed to spawn playback worker: {e}");
        }
    }

    // ======================== Recording ========================

    /// Enable or disable the microphone path. Toggling to the current state
    /// is a no-op returning that state; the capture device is not reopened.
    pub fn toggle_recording(&mut self, enable: bool) -> Result<bool, EngineError> {
        self.ensure_live()?;
        if enable == self.shared.recording.load(Ordering::SeqCst) {
            return Ok(enable);
        }
        if enable {
            self.start_capture()?;
        } else {
            self.stop_capture();
        }
        Ok(enable)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    /// True while the playback worker is draining the queue.
    pub fn is_playing(&self) -> bool {
        self.shared.worker_running.load(Ordering::SeqCst)
    }

    fn start_capture(&mut self) -> Result<(), EngineError> {
        let source = self.backend.open_capture(&self.shared.config)?;
        self.shared.recording.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || capture::run_capture(shared, source))
        {
            Ok(handle) => {
                self.capture_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.recording.store(false, Ordering::SeqCst);
                Err(EngineError::Capture(e.to_string()))
            }
        }
    }

    fn stop_capture(&mut self) {
        self.shared.recording.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }

    // ======================== Voice processing ========================

    /// Toggle the echo canceller and noise suppressor without touching the
    /// queue or worker state.
    pub fn bypass_voice_processing(&self, bypass: bool) {
        self.shared.bypass.store(bypass, Ordering::SeqCst);
        log::info!(
            "voice processing {}",
            if bypass { "bypassed" } else { "active" },
        );
    }

    // ======================== Spectrum ========================

    /// Snapshot of the output spectrum: 512 bytes in [0, 255], normalized to
    /// the current frame's own maximum. Non-blocking; callers may poll at
    /// any rate.
    pub fn byte_frequency_data(&self) -> [u8; SPECTRUM_BINS] {
        let ring = self.shared.ring.lock();
        self.shared.spectrum.lock().analyze(&ring)
    }

    // ======================== Interruption recovery ========================

    pub fn recovery_state(&self) -> RecoveryState {
        self.state
    }

    /// Drive the recovery state machine from an external session event.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        if self.state == RecoveryState::TornDown || self.shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        match event {
            SessionEvent::InterruptionBegan => {
                if self.state != RecoveryState::Active {
                    return;
                }
                log::info!("audio session interrupted");
                self.resume_recording = self.is_recording();
                self.shared.suspended.store(true, Ordering::SeqCst);
                self.stop_capture();
                self.state = RecoveryState::Interrupted;
                self.notify(InterruptionKind::Began);
            }
            SessionEvent::InterruptionEnded { should_resume } => {
                if self.state != RecoveryState::Interrupted {
                    return;
                }
                if !should_resume {
                    log::info!("interruption ended without resume hint, staying suspended");
                    self.notify(InterruptionKind::Blocked);
                    return;
                }
                log::info!("interruption ended, resuming");
                if let Err(e) = self.backend.activate_session() {
                    log::warn!("session reactivation failed: {e:#}");
                }
                self.shared.suspended.store(false, Ordering::SeqCst);
                if self.resume_recording {
                    if let Err(e) = self.start_capture() {
                        log::error!("failed to resume capture after interruption: {e}");
                    }
                }
                if !self.shared.queue.is_empty() {
                    self.spawn_worker_if_idle();
                }
                self.state = RecoveryState::Active;
                self.notify(InterruptionKind::Ended);
            }
            SessionEvent::FocusLost => {
                log::info!("audio focus lost");
                self.notify(InterruptionKind::Blocked);
            }
            SessionEvent::MediaServicesReset => {
                log::warn!("media services reset, rebuilding audio graph");
                self.rebuild_graph();
            }
            SessionEvent::RouteChanged => {
                log::info!("audio route changed, reselecting output route");
                match self.backend.select_output_route(&self.shared.config) {
                    Ok(sink) => {
                        *self.shared.sink.lock() = Some(sink);
                    }
                    Err(e) => {
                        log::warn!("route reselection failed, keeping current route: {e}");
                    }
                }
            }
        }
    }

    /// Tear down and rebuild every hardware connection, then resume whatever
    /// activity was in progress.
    fn rebuild_graph(&mut self) {
        let was_recording = self.is_recording()
            || (self.state == RecoveryState::Interrupted && self.resume_recording);
        self.stop_capture();
        *self.shared.sink.lock() = None;
        self.shared.echo.lock().reset();

        match self.backend.open_playback(&self.shared.config) {
            Ok(sink) => {
                *self.shared.sink.lock() = Some(sink);
            }
            Err(e) => {
                log::error!("failed to rebuild playback device: {e}");
            }
        }

        self.shared.suspended.store(false, Ordering::SeqCst);
        if was_recording {
            if let Err(e) = self.start_capture() {
                log::error!("failed to rebuild capture device: {e}");
            }
        }
        if !self.shared.queue.is_empty() {
            self.spawn_worker_if_idle();
        }
        self.state = RecoveryState::Active;
    }

    // ======================== Lifecycle ========================

    /// Stop recording and playback, release all hardware handles, and move to
    /// the terminal state. Further operations fail with `TornDown`.
    pub fn tear_down(&mut self) {
        if self.state == RecoveryState::TornDown {
            return;
        }
        log::info!("tearing down audio engine");
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.stop_capture();
        self.shared.queue.clear();
        *self.shared.sink.lock() = None;
        self.backend.deactivate_session();
        self.state = RecoveryState::TornDown;
    }

    /// Reconstruct the engine from scratch: teardown, reset every buffer and
    /// lifecycle flag (including the warm-up policy), and reopen the output
    /// device.
    pub fn restart(&mut self) -> Result<(), EngineError> {
        log::info!("restarting audio engine");
        self.tear_down();

        // Wait for a detached worker to observe the shutdown flag
        for _ in 0..100 {
            if !self.shared.worker_running.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        self.shared.queue.clear();
        self.shared.ring.lock().reset();
        self.shared.spectrum.lock().reset();
        self.shared.echo.lock().reset();
        *self.shared.decoder.lock() = stream_decoder::create_decoder(
            &self.shared.config.stream_format,
            self.shared.config.sample_rate,
        )?;
        *self.shared.warmup_until.lock() = None;
        self.shared.playback_started.store(false, Ordering::SeqCst);
        self.shared.suspended.store(false, Ordering::SeqCst);
        self.shared.worker_running.store(false, Ordering::SeqCst);
        self.shared.recording.store(false, Ordering::SeqCst);

        let sink = self.backend.open_playback(&self.shared.config)?;
        *self.shared.sink.lock() = Some(sink);
        if let Err(e) = self.backend.activate_session() {
            log::warn!("audio session activation failed: {e:#}");
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);
        self.resume_recording = false;
        self.state = RecoveryState::Active;
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.state == RecoveryState::TornDown || self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(EngineError::TornDown);
        }
        Ok(())
    }

    fn notify(&self, kind: InterruptionKind) {
        let _ = self
            .shared
            .events
            .try_send(EngineEvent::Interruption(kind));
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.tear_down();
    }
}
