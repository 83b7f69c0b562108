//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Audio engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Sample rate for both directions in Hz (typically 24000)
    pub sample_rate: u32,
    /// Samples per capture batch; also the echo-canceller frame size
    pub capture_period: usize,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period: usize,
    /// Pending playback chunks kept before drop-oldest backpressure kicks in
    pub queue_capacity: usize,
    /// Encoded-stream playback format: "pcm" or "opus"
    pub stream_format: String,
    /// Capture-delivery suppression window after the first playback start,
    /// giving the echo canceller time to adapt. 0 disables the window.
    pub aec_warmup_ms: u64,
    /// Echo tail length of the adaptive filter in ms
    pub echo_tail_ms: u32,
    /// Noise suppress level in dB (negative, e.g. -25)
    pub noise_suppress_db: i32,
    /// Enable automatic gain control on the capture path
    pub agc: bool,
    /// AGC target signal level
    pub agc_level: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
            sample_rate: 24000,
            capture_period: 240,
            playback_period: 1024,
            queue_capacity: 64,
            stream_format: "pcm".to_string(),
            aec_warmup_ms: 2000,
            echo_tail_ms: 200,
            noise_suppress_db: -25,
            agc: true,
            agc_level: 24000.0,
        }
    }
}
