//! Microphone capture thread.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::backend::CaptureSource;
use crate::engine::EngineShared;
use crate::events::EngineEvent;
use crate::speex::Preprocessor;
use crate::volume::RollingVolume;

/// Capture thread entry point. A capture-path failure is fatal: the engine
/// stops recording, tears itself down, and reports the error to the host.
pub(crate) fn run_capture(shared: Arc<EngineShared>, mut source: Box<dyn CaptureSource>) {
    if let Err(e) = capture_loop(&shared, source.as_mut()) {
        log::error!("Capture thread error: {e:#}");
        shared.fatal_teardown(&e);
    }
}

fn capture_loop(shared: &EngineShared, source: &mut dyn CaptureSource) -> Result<()> {
    let frame_size = source.frame_size();

    // Denoise/AGC runs per capture frame, after echo cancellation
    let mut preprocessor = Preprocessor::new(frame_size, shared.config.sample_rate)?;
    preprocessor.set_denoise(true);
    preprocessor.set_noise_suppress(shared.config.noise_suppress_db);
    preprocessor.set_agc(shared.config.agc);
    preprocessor.set_agc_level(shared.config.agc_level);

    let mut frame = vec![0f32; frame_size];
    let mut pcm = vec![0i16; frame_size];
    let mut level = RollingVolume::new();

    log::info!(
        "Recording started: rate={}, frame={}",
        shared.config.sample_rate,
        frame_size,
    );

    while shared.recording.load(Ordering::Relaxed) && !shared.shutdown.load(Ordering::Relaxed) {
        let n = source.read(&mut frame).context("capture read failed")?;
        if n == 0 {
            continue;
        }

        for (dst, s) in pcm.iter_mut().zip(&frame[..n]) {
            *dst = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        }
        let pcm = &mut pcm[..n];

        if !shared.bypass.load(Ordering::Relaxed) {
            shared.echo.lock().capture(pcm);
            // Partial reads skip the preprocessor; its frame size is fixed
            if n == frame_size {
                preprocessor.process(pcm);
            }
        }

        // AEC warm-up: the canceller keeps adapting on every frame, but
        // nothing is delivered until the deadline passes.
        if shared.warmup_active() {
            continue;
        }

        level.extend(&frame[..n]);

        let mut data = Vec::with_capacity(pcm.len() * 2);
        for s in pcm.iter() {
            data.extend_from_slice(&s.to_le_bytes());
        }
        if shared
            .events
            .blocking_send(EngineEvent::MicData(Bytes::from(data)))
            .is_err()
        {
            log::warn!("Mic data receiver dropped, stopping capture");
            return Ok(());
        }
        let _ = shared
            .events
            .try_send(EngineEvent::InputLevel(level.level()));
    }

    // One final zero-volume reading on stop
    let _ = shared.events.try_send(EngineEvent::InputLevel(0.0));
    log::info!("Recording stopped");
    Ok(())
}
