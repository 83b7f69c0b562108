//! duplex_voice - Full-duplex voice audio engine
//!
//! Captures microphone input while simultaneously playing back streamed PCM
//! audio, applies acoustic echo cancellation and noise suppression (SpeexDSP),
//! reports real-time volume levels for both directions, and exposes a
//! windowed-FFT spectrum snapshot of the output signal for visualization.
//! Uses ALSA for audio I/O and Opus for encoded-stream playback.
//!
//! The host hands [`AudioEngine::new`] an event channel and a hardware
//! backend; everything else — worker threads, buffering, recovery — lives
//! inside the engine.

mod alsa_device;
mod backend;
mod capture;
mod config;
mod engine;
mod error;
mod events;
mod opus_codec;
mod playback;
mod ring_buffer;
mod session;
mod spectrum;
mod speex;
mod stream_decoder;
mod volume;

pub use alsa_device::AlsaBackend;
pub use backend::{AudioBackend, CaptureSource, PlaybackSink};
pub use config::EngineConfig;
pub use engine::AudioEngine;
pub use error::EngineError;
pub use events::EngineEvent;
pub use session::{InterruptionKind, RecoveryState, SessionEvent};
pub use spectrum::{FFT_SIZE, SPECTRUM_BINS};
pub use stream_decoder::StreamDecoder;
