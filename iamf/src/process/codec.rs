//! Codec decoder binding.
//!
//! The pipeline decodes substream payloads through the [`CodecDecoder`]
//! capability. LPCM is unpacked in-crate; Opus, AAC and FLAC arrive through a
//! caller-installed [`CodecDecoderFactory`] bound to real decoder libraries.

use anyhow::{Result, bail};

use crate::structs::codec_config::{CodecConfig, DecoderConfig, LpcmConfig};
use crate::utils::errors::CodecError;

/// Synchronous decoder for the substreams of one codec config.
///
/// Implementations may keep per-substream state; the pipeline creates one
/// decoder instance per substream.
pub trait CodecDecoder {
    /// Decodes one compressed frame into per-channel samples in [-1, 1].
    ///
    /// `num_channels` is 1 for a mono substream and 2 for a coupled one.
    fn decode_frame(&mut self, num_channels: usize, payload: &[u8]) -> Result<Vec<Vec<f64>>>;

    fn output_sample_rate(&self) -> u32;

    fn output_frame_size(&self) -> u32;
}

/// Creates decoders for codec configs.
pub trait CodecDecoderFactory {
    fn decoder_for(&self, config: &CodecConfig) -> Result<Box<dyn CodecDecoder>>;
}

/// Direct byte unpacker for LPCM substreams.
pub struct LpcmDecoder {
    config: LpcmConfig,
    num_samples_per_frame: u32,
}

impl LpcmDecoder {
    pub fn new(config: LpcmConfig, num_samples_per_frame: u32) -> Self {
        Self {
            config,
            num_samples_per_frame,
        }
    }
}

impl CodecDecoder for LpcmDecoder {
    fn decode_frame(&mut self, num_channels: usize, payload: &[u8]) -> Result<Vec<Vec<f64>>> {
        let bytes_per_sample = (self.config.sample_size / 8) as usize;
        let stride = bytes_per_sample * num_channels;

        if payload.len() % stride != 0 {
            bail!(CodecError::PayloadSizeMismatch {
                bytes: payload.len(),
                channels: num_channels,
                expected: bytes_per_sample,
            });
        }

        let num_samples = payload.len() / stride;
        let scale = 1.0 / (1u64 << (self.config.sample_size - 1)) as f64;
        let little_endian = self.config.little_endian();

        let mut channels = vec![Vec::with_capacity(num_samples); num_channels];
        for tick in 0..num_samples {
            for (channel, samples) in channels.iter_mut().enumerate() {
                let offset = tick * stride + channel * bytes_per_sample;
                let raw = &payload[offset..offset + bytes_per_sample];

                let value = match (self.config.sample_size, little_endian) {
                    (16, true) => i16::from_le_bytes([raw[0], raw[1]]) as i64,
                    (16, false) => i16::from_be_bytes([raw[0], raw[1]]) as i64,
                    (24, true) => i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) as i64 >> 8,
                    (24, false) => i32::from_be_bytes([raw[0], raw[1], raw[2], 0]) as i64 >> 8,
                    (32, true) => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
                    (32, false) => i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
                    (size, _) => bail!(CodecError::InvalidSampleSize(size)),
                };

                samples.push(value as f64 * scale);
            }
        }

        Ok(channels)
    }

    fn output_sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn output_frame_size(&self) -> u32 {
        self.num_samples_per_frame
    }
}

/// Factory providing the in-crate decoders; everything lossy must be bound by
/// the caller.
#[derive(Debug, Default)]
pub struct BuiltinCodecFactory;

impl CodecDecoderFactory for BuiltinCodecFactory {
    fn decoder_for(&self, config: &CodecConfig) -> Result<Box<dyn CodecDecoder>> {
        match &config.decoder_config {
            DecoderConfig::Lpcm(lpcm) => Ok(Box::new(LpcmDecoder::new(
                *lpcm,
                config.num_samples_per_frame,
            ))),
            _ => bail!(CodecError::MissingDecoder(config.codec_id.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lpcm_16le() -> LpcmDecoder {
        LpcmDecoder::new(
            LpcmConfig {
                sample_format_flags: 1,
                sample_size: 16,
                sample_rate: 48_000,
            },
            8,
        )
    }

    #[test]
    fn unpacks_interleaved_stereo() -> Result<()> {
        let mut decoder = lpcm_16le();
        // Two ticks of (1, -1) and (256, 0).
        let payload = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x01, 0x00, 0x00];
        let channels = decoder.decode_frame(2, &payload)?;

        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].len(), 2);
        assert!((channels[0][0] - 1.0 / 32768.0).abs() < 1e-12);
        assert!((channels[1][0] + 1.0 / 32768.0).abs() < 1e-12);
        assert!((channels[0][1] - 256.0 / 32768.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn rejects_ragged_payload() {
        let mut decoder = lpcm_16le();
        assert!(decoder.decode_frame(2, &[0x00, 0x01, 0x02]).is_err());
    }

    #[test]
    fn unpacks_24_bit_big_endian() -> Result<()> {
        let mut decoder = LpcmDecoder::new(
            LpcmConfig {
                sample_format_flags: 0,
                sample_size: 24,
                sample_rate: 48_000,
            },
            8,
        );
        let payload = [0x40, 0x00, 0x00];
        let channels = decoder.decode_frame(1, &payload)?;

        assert!((channels[0][0] - 0.5).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn factory_refuses_unbound_codecs() {
        use crate::structs::codec_config::{CodecId, OpusConfig};

        let config = CodecConfig {
            codec_config_id: 1,
            codec_id: CodecId::Opus,
            num_samples_per_frame: 960,
            audio_roll_distance: -4,
            decoder_config: DecoderConfig::Opus(OpusConfig {
                version: 1,
                output_channel_count: 2,
                pre_skip: 312,
                input_sample_rate: 48_000,
                output_gain: 0,
                mapping_family: 0,
            }),
            raw_decoder_config: vec![],
        };
        assert!(BuiltinCodecFactory.decoder_for(&config).is_err());
    }
}
