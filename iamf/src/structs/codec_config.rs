//! Codec Config structures.
//!
//! A Codec Config names the inner audio codec for a set of substreams and
//! carries the codec-specific decoder setup bytes. All audio frames
//! referencing the same config share one frame length and sample rate.

use std::fmt::Display;

use anyhow::{Result, bail};

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{CodecError, ElementError};

pub const CODEC_ID_LPCM: u32 = u32::from_be_bytes(*b"ipcm");
pub const CODEC_ID_OPUS: u32 = u32::from_be_bytes(*b"Opus");
pub const CODEC_ID_AAC: u32 = u32::from_be_bytes(*b"mp4a");
pub const CODEC_ID_FLAC: u32 = u32::from_be_bytes(*b"fLaC");

/// Inner audio codec, from the `codec_id` fourcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Lpcm,
    Opus,
    Aac,
    Flac,
}

impl CodecId {
    pub fn from_fourcc(fourcc: u32) -> Result<Self> {
        Ok(match fourcc {
            CODEC_ID_LPCM => Self::Lpcm,
            CODEC_ID_OPUS => Self::Opus,
            CODEC_ID_AAC => Self::Aac,
            CODEC_ID_FLAC => Self::Flac,
            other => bail!(ElementError::UnknownCodecId(other)),
        })
    }

    pub const fn is_lossless(self) -> bool {
        matches!(self, Self::Lpcm | Self::Flac)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Lpcm => "LPCM",
            Self::Opus => "Opus",
            Self::Aac => "AAC-LC",
            Self::Flac => "FLAC",
        }
    }
}

impl Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// LPCM decoder config.
#[derive(Debug, Clone, Copy)]
pub struct LpcmConfig {
    pub sample_format_flags: u8,
    pub sample_size: u8,
    pub sample_rate: u32,
}

impl LpcmConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let config = Self {
            sample_format_flags: reader.get_n(8)?,
            sample_size: reader.get_n(8)?,
            sample_rate: reader.get_n(32)?,
        };

        if !matches!(config.sample_size, 16 | 24 | 32) {
            bail!(CodecError::InvalidSampleSize(config.sample_size));
        }

        Ok(config)
    }

    pub const fn little_endian(&self) -> bool {
        self.sample_format_flags & 1 != 0
    }
}

/// Opus decoder config (the ID-header fields without the magic).
#[derive(Debug, Clone, Copy)]
pub struct OpusConfig {
    pub version: u8,
    pub output_channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            version: reader.get_n(8)?,
            output_channel_count: reader.get_n(8)?,
            pre_skip: reader.get_n(16)?,
            input_sample_rate: reader.get_n(32)?,
            output_gain: reader.get_s(16)?,
            mapping_family: reader.get_n(8)?,
        })
    }
}

/// Fields scanned from the FLAC STREAMINFO metadata block.
#[derive(Debug, Clone, Copy)]
pub struct FlacConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
}

impl FlacConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        // METADATA_BLOCK_HEADER: last-flag, 7-bit type (0 = STREAMINFO), length.
        reader.skip_n(1)?;
        let block_type: u8 = reader.get_n(7)?;
        if block_type != 0 {
            bail!(CodecError::MissingStreamInfo);
        }
        reader.skip_n(24)?;

        // STREAMINFO: block sizes, frame sizes, then the stream parameters.
        reader.skip_n(16 + 16 + 24 + 24)?;
        let sample_rate: u32 = reader.get_n(20)?;
        reader.skip_n(3)?; // channels - 1
        let bits_per_sample = reader.get_n::<u8>(5)? + 1;

        Ok(Self {
            sample_rate,
            bits_per_sample,
        })
    }
}

/// Codec-specific decoder configuration.
#[derive(Debug, Clone)]
pub enum DecoderConfig {
    Lpcm(LpcmConfig),
    Opus(OpusConfig),
    Flac(FlacConfig),
    /// AAC DecoderConfigDescriptor bytes, handed opaquely to the bound codec.
    Aac(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub codec_config_id: u32,
    pub codec_id: CodecId,
    pub num_samples_per_frame: u32,
    pub audio_roll_distance: i16,
    pub decoder_config: DecoderConfig,
    /// The raw decoder config bytes, preserved for bound codec decoders.
    pub raw_decoder_config: Vec<u8>,
}

impl CodecConfig {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let codec_config_id = reader.get_uleb128()?;
        let codec_id = CodecId::from_fourcc(reader.get_n(32)?)?;
        let num_samples_per_frame = reader.get_uleb128()?;
        let audio_roll_distance = reader.get_s(16)?;

        let remaining_bytes = (reader.available()? / 8) as usize;
        let raw_decoder_config = reader.get_bytes(remaining_bytes)?;

        let config_reader = &mut BsIoSliceReader::from_slice(&raw_decoder_config);
        let decoder_config = match codec_id {
            CodecId::Lpcm => DecoderConfig::Lpcm(LpcmConfig::read(config_reader)?),
            CodecId::Opus => DecoderConfig::Opus(OpusConfig::read(config_reader)?),
            CodecId::Flac => DecoderConfig::Flac(FlacConfig::read(config_reader)?),
            CodecId::Aac => DecoderConfig::Aac(raw_decoder_config.clone()),
        };

        Ok(Self {
            codec_config_id,
            codec_id,
            num_samples_per_frame,
            audio_roll_distance,
            decoder_config,
            raw_decoder_config,
        })
    }

    /// Output sample rate, when the config itself names one.
    ///
    /// Opus always decodes at 48 kHz; AAC defers to the bound decoder.
    pub fn sample_rate(&self) -> Option<u32> {
        match &self.decoder_config {
            DecoderConfig::Lpcm(lpcm) => Some(lpcm.sample_rate),
            DecoderConfig::Opus(_) => Some(48_000),
            DecoderConfig::Flac(flac) => Some(flac.sample_rate),
            DecoderConfig::Aac(_) => None,
        }
    }

    /// Source bit depth, when the config names one.
    pub fn bit_depth(&self) -> Option<u8> {
        match &self.decoder_config {
            DecoderConfig::Lpcm(lpcm) => Some(lpcm.sample_size),
            DecoderConfig::Flac(flac) => Some(flac.bits_per_sample),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lpcm_config_bytes() -> Vec<u8> {
        let mut bytes = vec![];
        bytes.push(0x01); // codec_config_id = 1
        bytes.extend(b"ipcm");
        bytes.push(0x08); // num_samples_per_frame = 8
        bytes.extend([0x00, 0x00]); // audio_roll_distance
        bytes.push(0x01); // sample_format_flags: little endian
        bytes.push(16); // sample_size
        bytes.extend(48_000u32.to_be_bytes());
        bytes
    }

    #[test]
    fn parses_lpcm() -> Result<()> {
        let bytes = lpcm_config_bytes();
        let config = CodecConfig::read(&mut BsIoSliceReader::from_slice(&bytes))?;

        assert_eq!(config.codec_config_id, 1);
        assert_eq!(config.codec_id, CodecId::Lpcm);
        assert_eq!(config.num_samples_per_frame, 8);
        assert_eq!(config.sample_rate(), Some(48_000));
        assert_eq!(config.bit_depth(), Some(16));
        assert!(config.codec_id.is_lossless());

        let DecoderConfig::Lpcm(lpcm) = config.decoder_config else {
            panic!("expected LPCM decoder config");
        };
        assert!(lpcm.little_endian());
        Ok(())
    }

    #[test]
    fn parses_flac_streaminfo() -> Result<()> {
        let mut bytes = vec![];
        bytes.push(0x02);
        bytes.extend(b"fLaC");
        bytes.push(0x10);
        bytes.extend([0x00, 0x00]);
        // STREAMINFO header + body (rate 44100, 2ch, 16 bit).
        bytes.extend([0x80, 0x00, 0x00, 0x22]);
        bytes.extend([0x10, 0x00, 0x10, 0x00]); // block sizes
        bytes.extend([0x00, 0x00, 0x00, 0x00, 0x00, 0x00]); // frame sizes
        bytes.extend([0x0A, 0xC4, 0x42]); // 44100 << 12 | 1 << 9 | 15 << 4 ...
        bytes.extend([0xF0, 0x00, 0x00, 0x00, 0x00]);
        bytes.extend([0u8; 16]); // md5

        let config = CodecConfig::read(&mut BsIoSliceReader::from_slice(&bytes))?;
        assert_eq!(config.codec_id, CodecId::Flac);
        assert_eq!(config.sample_rate(), Some(44_100));
        assert_eq!(config.bit_depth(), Some(16));
        Ok(())
    }

    #[test]
    fn rejects_unknown_fourcc() {
        let mut bytes = vec![0x01];
        bytes.extend(b"evrc");
        bytes.extend([0x08, 0x00, 0x00]);

        assert!(CodecConfig::read(&mut BsIoSliceReader::from_slice(&bytes)).is_err());
    }

    #[test]
    fn rejects_bad_sample_size() {
        let mut bytes = vec![0x01];
        bytes.extend(b"ipcm");
        bytes.extend([0x08, 0x00, 0x00]);
        bytes.extend([0x01, 20]);
        bytes.extend(48_000u32.to_be_bytes());

        assert!(CodecConfig::read(&mut BsIoSliceReader::from_slice(&bytes)).is_err());
    }
}
