//! RMS volume metering for both audio directions.

/// Decibel level treated as the silence floor.
const DB_FLOOR: f32 = -80.0;

/// Lower clamp on the RMS so the logarithm stays finite for silence.
const RMS_EPSILON: f32 = 1e-5;

/// Number of recent samples each rolling volume window holds.
pub const VOLUME_WINDOW: usize = 2048;

/// Convert a buffer of float samples in [-1, 1] to a perceptual volume in [0, 1].
///
/// RMS → decibels → normalized against the -80 dB floor → squared for a
/// perceptual curve. An all-zero buffer yields exactly 0.
pub fn meter(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_sq.sqrt().max(RMS_EPSILON);
    let db = 20.0 * rms.log10();
    let norm = ((db - DB_FLOOR) / -DB_FLOOR).clamp(0.0, 1.0);
    norm * norm
}

/// Fixed-size circular buffer of the most recent float samples, used to
/// compute a running RMS level for one direction.
///
/// Owned by a single execution context (capture thread or playback worker),
/// so it carries no lock.
pub struct RollingVolume {
    samples: Vec<f32>,
    write_pos: usize,
}

impl RollingVolume {
    pub fn new() -> Self {
        Self {
            samples: vec![0.0; VOLUME_WINDOW],
            write_pos: 0,
        }
    }

    /// Append samples, overwriting the oldest once the window is full.
    pub fn extend(&mut self, data: &[f32]) {
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.samples.len();
        }
    }

    /// Current perceptual level over the whole window.
    pub fn level(&self) -> f32 {
        meter(&self.samples)
    }

    pub fn reset(&mut self) {
        self.samples.fill(0.0);
        self.write_pos = 0;
    }
}

impl Default for RollingVolume {
    fn default() -> Self {
        Self::new()
    }
}
