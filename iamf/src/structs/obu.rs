//! OBU framing structures.
//!
//! ## OBU Organization
//!
//! **Header**: 5-bit type, redundancy/trimming/extension flags and a leb128
//! `obu_size` naming the byte count of the remainder.
//! **Payload**: optional trimming and extension fields, then the typed body.
//!
//! Reserved OBU types are preserved as opaque [`ArbitraryObu`] records.

use anyhow::Result;

use crate::structs::audio_element::AudioElement;
use crate::structs::audio_frame::AudioFrameObu;
use crate::structs::codec_config::CodecConfig;
use crate::structs::mix_presentation::MixPresentation;
use crate::structs::parameter_block::ParameterBlockObu;
use crate::structs::sequence_header::IaSequenceHeader;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ObuError;
use crate::utils::read_bit_buffer::ReadBitBuffer;

/// First OBU type value carrying an implicit substream id.
pub const OBU_AUDIO_FRAME_ID0: u8 = 6;

/// Last OBU type value carrying an implicit substream id (substream 17).
pub const OBU_AUDIO_FRAME_ID17: u8 = 23;

/// Kind of an OBU, decoded from the 5-bit type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObuType {
    CodecConfig,
    AudioElement,
    MixPresentation,
    ParameterBlock,
    TemporalDelimiter,
    /// Audio frame with an explicit leb128 substream id.
    AudioFrame,
    /// Audio frame whose substream id 0..=17 is implied by the type value.
    AudioFrameId(u8),
    Reserved(u8),
    SequenceHeader,
}

impl ObuType {
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::CodecConfig,
            1 => Self::AudioElement,
            2 => Self::MixPresentation,
            3 => Self::ParameterBlock,
            4 => Self::TemporalDelimiter,
            5 => Self::AudioFrame,
            OBU_AUDIO_FRAME_ID0..=OBU_AUDIO_FRAME_ID17 => {
                Self::AudioFrameId(bits - OBU_AUDIO_FRAME_ID0)
            }
            31 => Self::SequenceHeader,
            other => Self::Reserved(other),
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::CodecConfig => 0,
            Self::AudioElement => 1,
            Self::MixPresentation => 2,
            Self::ParameterBlock => 3,
            Self::TemporalDelimiter => 4,
            Self::AudioFrame => 5,
            Self::AudioFrameId(id) => OBU_AUDIO_FRAME_ID0 + id,
            Self::SequenceHeader => 31,
            Self::Reserved(bits) => bits,
        }
    }

    /// Descriptor OBUs make up the sealed configuration of an IA sequence.
    pub const fn is_descriptor(self) -> bool {
        matches!(
            self,
            Self::SequenceHeader | Self::CodecConfig | Self::AudioElement | Self::MixPresentation
        )
    }
}

/// Common OBU header.
///
/// The trimming and extension fields live inside `obu_size` and are read from
/// the payload prefix once the whole payload is buffered.
#[derive(Debug, Clone, Default)]
pub struct ObuHeader {
    pub obu_type: u8,
    pub redundant_copy: bool,
    pub trimming_status_flag: bool,
    pub extension_flag: bool,
    pub obu_size: u32,

    pub num_samples_to_trim_at_end: u32,
    pub num_samples_to_trim_at_start: u32,
    pub extension_header_bytes: Vec<u8>,
}

impl ObuHeader {
    /// Reads the fixed header byte and `obu_size` from the stream buffer.
    ///
    /// Reports [`ObuError::InsufficientData`] with the cursor untouched when
    /// the header is not fully buffered yet.
    pub fn read(rb: &mut ReadBitBuffer) -> Result<Self, ObuError> {
        let start = rb.tell();

        let header = (|| -> Result<Self, ObuError> {
            let obu_type = rb.read_unsigned(5)? as u8;
            let redundant_copy = rb.read_bit()?;
            let trimming_status_flag = rb.read_bit()?;
            let extension_flag = rb.read_bit()?;
            let obu_size = rb.read_uleb128()?;

            Ok(Self {
                obu_type,
                redundant_copy,
                trimming_status_flag,
                extension_flag,
                obu_size,
                ..Default::default()
            })
        })();

        if header.is_err() {
            // The size field may be split across pushes; rewind so the next
            // attempt starts at the header byte again.
            let _ = rb.seek(start);
        }

        header
    }

    /// Reads the trimming and extension fields from the payload prefix.
    pub fn read_payload_prefix(&mut self, reader: &mut BsIoSliceReader) -> Result<()> {
        if self.trimming_status_flag {
            self.num_samples_to_trim_at_end = reader.get_uleb128()?;
            self.num_samples_to_trim_at_start = reader.get_uleb128()?;
        }

        if self.extension_flag {
            let extension_header_size = reader.get_uleb128()?;
            self.extension_header_bytes = reader.get_bytes(extension_header_size as usize)?;
        }

        Ok(())
    }

    pub fn kind(&self) -> ObuType {
        ObuType::from_bits(self.obu_type)
    }
}

/// An OBU of reserved type, preserved byte-for-byte.
#[derive(Debug, Clone)]
pub struct ArbitraryObu {
    pub obu_type: u8,
    pub payload: Vec<u8>,
}

/// A parsed OBU payload.
#[derive(Debug)]
pub enum Obu {
    SequenceHeader(IaSequenceHeader),
    CodecConfig(CodecConfig),
    AudioElement(AudioElement),
    MixPresentation(MixPresentation),
    ParameterBlock(ParameterBlockObu),
    AudioFrame(AudioFrameObu),
    TemporalDelimiter,
    Arbitrary(ArbitraryObu),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_round_trip() {
        for bits in 0..32u8 {
            assert_eq!(ObuType::from_bits(bits).bits(), bits);
        }
    }

    #[test]
    fn implicit_substream_ids() {
        assert_eq!(ObuType::from_bits(6), ObuType::AudioFrameId(0));
        assert_eq!(ObuType::from_bits(23), ObuType::AudioFrameId(17));
        assert_eq!(ObuType::from_bits(24), ObuType::Reserved(24));
    }

    #[test]
    fn header_read_rewinds_when_short() {
        let mut rb = ReadBitBuffer::new();
        rb.push_bytes(&[0b00000_000]); // type 0, no flags, size missing

        assert!(matches!(
            ObuHeader::read(&mut rb),
            Err(ObuError::InsufficientData)
        ));
        assert_eq!(rb.tell(), 0);

        rb.push_bytes(&[0x05]);
        let header = ObuHeader::read(&mut rb).unwrap();
        assert_eq!(header.kind(), ObuType::CodecConfig);
        assert_eq!(header.obu_size, 5);
    }
}
