//! Streaming OBU parsing.
//!
//! The [`ObuParser`] sits on the append-only read buffer and yields one typed
//! OBU at a time. A header or payload that is not fully buffered yet leaves
//! the cursor at the OBU boundary and yields nothing, so the next call after
//! more bytes arrive resumes at exactly the same spot.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use log::trace;

use crate::log_or_err;
use crate::structs::audio_element::AudioElement;
use crate::structs::audio_frame::AudioFrameObu;
use crate::structs::codec_config::CodecConfig;
use crate::structs::mix_presentation::MixPresentation;
use crate::structs::obu::{ArbitraryObu, Obu, ObuHeader, ObuType};
use crate::structs::parameter_block::{ParamSpec, ParameterBlockObu};
use crate::structs::sequence_header::IaSequenceHeader;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ObuError;
use crate::utils::read_bit_buffer::ReadBitBuffer;

/// A fully parsed OBU with its framing header.
#[derive(Debug)]
pub struct ParsedObu {
    pub header: ObuHeader,
    pub obu: Obu,
}

/// Parses OBUs from buffered bitstream data.
pub struct ObuParser {
    pub fail_level: log::Level,
}

impl Default for ObuParser {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

impl ObuParser {
    /// Peeks the kind of the next OBU without consuming it.
    ///
    /// Returns `None` when the header is not fully buffered.
    pub fn peek_header(&self, rb: &mut ReadBitBuffer) -> Result<Option<ObuHeader>> {
        let start = rb.tell();

        let header = match ObuHeader::read(rb) {
            Ok(header) => header,
            Err(ObuError::InsufficientData) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        rb.seek(start)?;
        Ok(Some(header))
    }

    /// Parses the next OBU when its payload is fully buffered.
    ///
    /// `specs` resolves parameter block payloads and must come from the
    /// sealed descriptors; before sealing no parameter blocks are legal.
    pub fn try_next(
        &mut self,
        rb: &mut ReadBitBuffer,
        specs: &HashMap<u32, ParamSpec>,
    ) -> Result<Option<ParsedObu>> {
        let start = rb.tell();

        let mut header = match ObuHeader::read(rb) {
            Ok(header) => header,
            Err(ObuError::InsufficientData) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if rb.available_bits() < (header.obu_size as u64) * 8 {
            rb.seek(start)?;
            return Ok(None);
        }

        let payload = rb.read_bytes(header.obu_size as usize)?;
        trace!(
            "obu type {:#04X}, size {} at bit {}",
            header.obu_type, header.obu_size, start
        );

        let kind = header.kind();
        if let ObuType::Reserved(obu_type) = kind {
            // Reserved OBUs are preserved opaquely, prefix fields included.
            return Ok(Some(ParsedObu {
                header,
                obu: Obu::Arbitrary(ArbitraryObu {
                    obu_type,
                    payload,
                }),
            }));
        }

        let reader = &mut BsIoSliceReader::from_slice(&payload);
        header.read_payload_prefix(reader)?;

        let obu = match kind {
            ObuType::SequenceHeader => Obu::SequenceHeader(IaSequenceHeader::read(reader)?),
            ObuType::CodecConfig => Obu::CodecConfig(CodecConfig::read(reader)?),
            ObuType::AudioElement => Obu::AudioElement(AudioElement::read(reader)?),
            ObuType::MixPresentation => Obu::MixPresentation(MixPresentation::read(reader)?),
            ObuType::ParameterBlock => Obu::ParameterBlock(ParameterBlockObu::read(reader, specs)?),
            ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                Obu::AudioFrame(AudioFrameObu::read(&header, reader)?)
            }
            ObuType::TemporalDelimiter => Obu::TemporalDelimiter,
            ObuType::Reserved(_) => unreachable!(),
        };

        // Descriptor payloads must account for every byte of obu_size.
        let leftover = reader.available()?;
        if leftover >= 8 && !matches!(kind, ObuType::TemporalDelimiter) {
            log_or_err!(
                self,
                log::Level::Warn,
                anyhow!(ObuError::PayloadLengthMismatch {
                    obu_type: header.obu_type,
                    read: (header.obu_size as u64) - leftover / 8,
                    expected: header.obu_size as u64,
                })
            );
        }

        Ok(Some(ParsedObu { header, obu }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frames a payload with an OBU header for tests.
    pub(crate) fn frame_obu(obu_type: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![(obu_type << 3) | flags];
        let mut size = payload.len() as u32;
        loop {
            let mut byte = (size & 0x7F) as u8;
            size >>= 7;
            if size != 0 {
                byte |= 0x80;
            }
            bytes.push(byte);
            if size == 0 {
                break;
            }
        }
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn parses_sequence_header() -> Result<()> {
        let mut rb = ReadBitBuffer::new();
        rb.push_bytes(&frame_obu(31, 0, &[b'i', b'a', b'm', b'f', 0, 1]));

        let mut parser = ObuParser::default();
        let parsed = parser.try_next(&mut rb, &HashMap::new())?.unwrap();

        assert!(matches!(parsed.obu, Obu::SequenceHeader(_)));
        assert_eq!(rb.available_bits(), 0);
        Ok(())
    }

    #[test]
    fn partial_payload_resumes() -> Result<()> {
        let bytes = frame_obu(31, 0, &[b'i', b'a', b'm', b'f', 0, 0]);
        let (first, rest) = bytes.split_at(4);

        let mut rb = ReadBitBuffer::new();
        let mut parser = ObuParser::default();

        rb.push_bytes(first);
        assert!(parser.try_next(&mut rb, &HashMap::new())?.is_none());
        assert_eq!(rb.tell(), 0);

        rb.push_bytes(rest);
        assert!(parser.try_next(&mut rb, &HashMap::new())?.is_some());
        Ok(())
    }

    #[test]
    fn preserves_reserved_types() -> Result<()> {
        let mut rb = ReadBitBuffer::new();
        rb.push_bytes(&frame_obu(25, 0, &[1, 2, 3]));

        let mut parser = ObuParser::default();
        let parsed = parser.try_next(&mut rb, &HashMap::new())?.unwrap();

        let Obu::Arbitrary(arbitrary) = parsed.obu else {
            panic!("expected arbitrary OBU");
        };
        assert_eq!(arbitrary.obu_type, 25);
        assert_eq!(arbitrary.payload, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn audio_frame_with_trim() -> Result<()> {
        // Trimming flag set: payload starts with trim-at-end, trim-at-start.
        let mut payload = vec![0x02, 0x01];
        payload.extend([0xAA, 0xBB]);

        let mut rb = ReadBitBuffer::new();
        rb.push_bytes(&frame_obu(6, 0b010, &payload));

        let mut parser = ObuParser::default();
        let parsed = parser.try_next(&mut rb, &HashMap::new())?.unwrap();

        let Obu::AudioFrame(frame) = parsed.obu else {
            panic!("expected audio frame");
        };
        assert_eq!(frame.substream_id, 0);
        assert_eq!(frame.samples_to_trim_at_end, 2);
        assert_eq!(frame.samples_to_trim_at_start, 1);
        assert_eq!(frame.payload, vec![0xAA, 0xBB]);
        Ok(())
    }

    #[test]
    fn malformed_magic_is_fatal() {
        let mut rb = ReadBitBuffer::new();
        rb.push_bytes(&frame_obu(31, 0, &[b'x', b'x', b'x', b'x', 0, 0]));

        let mut parser = ObuParser::default();
        assert!(parser.try_next(&mut rb, &HashMap::new()).is_err());
    }
}
