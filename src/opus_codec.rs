//! Opus decoder for encoded-stream playback.

use anyhow::Result;

use crate::stream_decoder::StreamDecoder;

/// Decodes mono Opus packets at the engine's fixed sample rate.
pub struct OpusStreamDecoder {
    decoder: opus::Decoder,
    sample_rate: u32,
}

impl OpusStreamDecoder {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let decoder = opus::Decoder::new(sample_rate, opus::Channels::Mono)?;
        Ok(Self {
            decoder,
            sample_rate,
        })
    }
}

impl StreamDecoder for OpusStreamDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        // An Opus packet holds at most 120 ms of audio
        let max_samples = (self.sample_rate as usize * 120) / 1000;
        let mut pcm = vec![0i16; max_samples];
        let decoded = self.decoder.decode(data, &mut pcm, false)?;
        pcm.truncate(decoded);
        Ok(pcm)
    }
}
