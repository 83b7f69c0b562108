//! Generic stream decoder trait for multi-format playback support.

use anyhow::Result;

use crate::error::EngineError;
use crate::opus_codec::OpusStreamDecoder;

/// A trait for audio stream decoders that convert encoded audio data into
/// i16 PCM samples at the engine's fixed mono sample rate.
pub trait StreamDecoder: Send {
    /// Decode encoded audio bytes into mono i16 PCM samples.
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>>;
}

/// Passthrough decoder for hosts that already deliver raw 16-bit
/// little-endian PCM.
pub struct PcmPassthrough;

impl StreamDecoder for PcmPassthrough {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        if data.len() % 2 != 0 {
            log::warn!("odd-length PCM chunk ({} bytes), dropping trailing byte", data.len());
        }
        Ok(data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}

/// Factory function: create a decoder for the configured stream format.
pub fn create_decoder(
    format: &str,
    sample_rate: u32,
) -> Result<Box<dyn StreamDecoder>, EngineError> {
    match format {
        "pcm" => Ok(Box::new(PcmPassthrough)),
        "opus" => {
            let decoder = OpusStreamDecoder::new(sample_rate)
                .map_err(|e| EngineError::Dsp(format!("{e:#}")))?;
            Ok(Box::new(decoder))
        }
        other => Err(EngineError::Format(format!(
            "unsupported stream format: {other}"
        ))),
    }
}
