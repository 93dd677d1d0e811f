//! Audio Frame structures.
//!
//! One audio frame carries the compressed payload of a single substream for
//! one temporal unit. Substream ids 0..=17 ride in the OBU type itself;
//! higher ids use an explicit leb128 field.

use anyhow::{Result, bail};

use crate::structs::obu::{ObuHeader, ObuType};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::FrameError;

#[derive(Debug, Clone)]
pub struct AudioFrameObu {
    pub substream_id: u32,
    pub samples_to_trim_at_start: u32,
    pub samples_to_trim_at_end: u32,
    pub payload: Vec<u8>,
}

impl AudioFrameObu {
    /// Reads the frame body; the header supplies trims and the implicit
    /// substream id when the OBU type carries one.
    pub fn read(header: &ObuHeader, reader: &mut BsIoSliceReader) -> Result<Self> {
        let substream_id = match header.kind() {
            ObuType::AudioFrameId(id) => id as u32,
            _ => reader.get_uleb128()?,
        };

        let remaining = (reader.available()? / 8) as usize;
        let payload = reader.get_bytes(remaining)?;

        Ok(Self {
            substream_id,
            samples_to_trim_at_start: header.num_samples_to_trim_at_start,
            samples_to_trim_at_end: header.num_samples_to_trim_at_end,
            payload,
        })
    }

    /// Validates the trims against the frame length in samples.
    pub fn check_trim(&self, frame_length: u32) -> Result<()> {
        if self.samples_to_trim_at_start + self.samples_to_trim_at_end > frame_length {
            bail!(FrameError::TrimExceedsFrame {
                trim_start: self.samples_to_trim_at_start,
                trim_end: self.samples_to_trim_at_end,
                frame_length,
            });
        }
        Ok(())
    }
}
