//! Hardware seams: capture source, playback sink, and the backend factory.
//!
//! The engine never touches platform audio APIs directly; it drives these
//! traits so it can be built against real hardware or test doubles.

use anyhow::Result;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// A microphone input path delivering batches of mono float samples.
pub trait CaptureSource: Send {
    /// Samples delivered per `read` batch (also the echo-canceller frame size).
    fn frame_size(&self) -> usize;

    /// Fill `buf` with captured samples in [-1, 1]; returns the count read.
    /// A return of 0 means no data was available yet.
    ///
    /// Errors are fatal: the engine stops recording and tears itself down.
    fn read(&mut self, buf: &mut [f32]) -> Result<usize>;
}

/// An output device accepting mono i16 samples.
pub trait PlaybackSink: Send {
    /// Write samples to the device; may write fewer than given (short write).
    fn write(&mut self, samples: &[i16]) -> Result<usize>;

    /// Put the device back into a writable state after an error (XRUN).
    fn recover(&mut self) -> Result<()>;

    /// Drop any buffered-but-not-yet-rendered audio.
    fn discard(&mut self) -> Result<()>;
}

/// Factory for the platform's audio devices and session handling.
pub trait AudioBackend: Send {
    fn open_capture(&self, config: &EngineConfig) -> Result<Box<dyn CaptureSource>, EngineError>;

    fn open_playback(&self, config: &EngineConfig) -> Result<Box<dyn PlaybackSink>, EngineError>;

    /// Bring the platform audio session up. Failures are soft: the engine
    /// logs them and continues best-effort.
    fn activate_session(&self) -> Result<()>;

    fn deactivate_session(&self);

    /// Re-evaluate the output route after a device change; returns a sink on
    /// the newly preferred route.
    fn select_output_route(
        &self,
        config: &EngineConfig,
    ) -> Result<Box<dyn PlaybackSink>, EngineError> {
        self.open_playback(config)
    }
}
