//! ALSA implementations of the hardware seams.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use crate::backend::{AudioBackend, CaptureSource, PlaybackSink};
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Linux/ALSA backend. Capture is opened in float format so the tap delivers
/// samples in [-1, 1]; playback takes 16-bit PCM directly.
pub struct AlsaBackend;

impl AudioBackend for AlsaBackend {
    fn open_capture(&self, config: &EngineConfig) -> Result<Box<dyn CaptureSource>, EngineError> {
        let (pcm, period_size) = open_pcm(
            &config.capture_device,
            Direction::Capture,
            Format::FloatLE,
            config.sample_rate,
            Some(config.capture_period),
            "Capture",
        )
        .map_err(|e| EngineError::DeviceOpen(format!("{e:#}")))?;

        Ok(Box::new(AlsaCapture {
            pcm,
            period_size,
        }))
    }

    fn open_playback(&self, config: &EngineConfig) -> Result<Box<dyn PlaybackSink>, EngineError> {
        let period = if config.playback_period > 0 {
            Some(config.playback_period)
        } else {
            None
        };
        let (pcm, _period_size) = open_pcm(
            &config.playback_device,
            Direction::Playback,
            Format::S16LE,
            config.sample_rate,
            period,
            "Playback",
        )
        .map_err(|e| EngineError::DeviceOpen(format!("{e:#}")))?;

        Ok(Box::new(AlsaPlayback { pcm }))
    }

    // ALSA has no session concept; activation is satisfied by holding the
    // PCM handles themselves.
    fn activate_session(&self) -> Result<()> {
        Ok(())
    }

    fn deactivate_session(&self) {}
}

struct AlsaCapture {
    pcm: PCM,
    period_size: usize,
}

impl CaptureSource for AlsaCapture {
    fn frame_size(&self) -> usize {
        self.period_size
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let io = self.pcm.io_f32().context("capture io unavailable")?;
        match io.readi(buf) {
            Ok(frames) => Ok(frames),
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                self.pcm
                    .prepare()
                    .context("failed to recover PCM capture")?;
                Ok(0)
            }
        }
    }
}

struct AlsaPlayback {
    pcm: PCM,
}

impl PlaybackSink for AlsaPlayback {
    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        let io = self.pcm.io_i16().context("playback io unavailable")?;
        io.writei(samples).context("ALSA playback write failed")
    }

    fn recover(&mut self) -> Result<()> {
        self.pcm
            .prepare()
            .context("failed to recover PCM playback")
    }

    fn discard(&mut self) -> Result<()> {
        self.pcm.drop().context("failed to drop pending playback")?;
        self.pcm
            .prepare()
            .context("failed to re-prepare playback after discard")
    }
}

fn open_pcm(
    device: &str,
    direction: Direction,
    format: Format,
    sample_rate: u32,
    period_size: Option<usize>,
    dir_name: &str,
) -> Result<(PCM, usize)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters: mono, fixed rate
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(format)?;
        hwp.set_channels(1)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    // Read back negotiated parameters; the engine runs at exactly one rate
    // in each direction, so a mismatch is a construction failure.
    let (actual_rate, period_size) = {
        let hwp = pcm.hw_params_current()?;
        (hwp.get_rate()?, hwp.get_period_size()? as usize)
    };
    if actual_rate != sample_rate {
        anyhow::bail!(
            "device '{}' negotiated {}Hz, engine requires {}Hz",
            device,
            actual_rate,
            sample_rate,
        );
    }

    log::info!(
        "ALSA {}: device={}, rate={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        period_size,
    );

    Ok((pcm, period_size))
}
