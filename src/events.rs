//! Push-style events emitted by the engine to the host.

use bytes::Bytes;

use crate::session::InterruptionKind;

/// Events delivered through the channel the host hands to
/// [`AudioEngine::new`](crate::AudioEngine::new).
///
/// `MicData` is sent with backpressure from the capture thread; level and
/// interruption events are best-effort and dropped when the channel is full.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A captured PCM chunk (16-bit little-endian mono samples).
    MicData(Bytes),
    /// Input volume in [0, 1].
    InputLevel(f32),
    /// Output volume in [0, 1].
    OutputLevel(f32),
    /// Audio-session interruption notification.
    Interruption(InterruptionKind),
    /// The engine hit a fatal runtime error and tore itself down.
    Fatal(String),
}
