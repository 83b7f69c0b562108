//! Engine error taxonomy.

use thiserror::Error;

/// Errors surfaced by the engine's public operations.
///
/// Session activation, focus, and route-selection failures are soft: they are
/// logged and the engine keeps running in a degraded mode. Queue overflow is
/// a defined backpressure policy, never an error.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required audio device could not be opened (fatal at construction).
    #[error("failed to open audio device: {0}")]
    DeviceOpen(String),

    /// A required audio format could not be negotiated or is unsupported.
    #[error("unsupported audio format: {0}")]
    Format(String),

    /// A DSP stage (echo canceller, preprocessor, decoder) failed to build.
    #[error("dsp initialization failed: {0}")]
    Dsp(String),

    /// The capture path failed at runtime; the engine has torn itself down.
    #[error("capture failure: {0}")]
    Capture(String),

    /// An encoded playback chunk could not be decoded.
    #[error("decode failure: {0}")]
    Decode(String),

    /// The engine has been torn down; no further operations are valid.
    #[error("audio engine is torn down")]
    TornDown,
}
