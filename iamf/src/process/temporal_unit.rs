//! Temporal unit assembly.
//!
//! Audio frames and parameter blocks sharing a start timestamp form one
//! temporal unit. The assembler groups records as they come off the parser,
//! closes a unit on a temporal delimiter, on the first frame of the next
//! unit, or at end of stream, and checks that every required substream is
//! covered.

use std::collections::HashMap;

use anyhow::{Result, bail};
use log::warn;

use crate::structs::audio_frame::AudioFrameObu;
use crate::structs::obu::ArbitraryObu;
use crate::structs::parameter_block::ParameterBlockObu;
use crate::utils::errors::FrameError;

/// All records of one start timestamp, ready to demix and render.
#[derive(Debug)]
pub struct TemporalUnit {
    pub start_timestamp: u64,
    pub frames: HashMap<u32, AudioFrameObu>,
    pub parameter_blocks: Vec<ParameterBlockObu>,
    pub arbitrary: Vec<ArbitraryObu>,
    pub samples_to_trim_at_start: u32,
    pub samples_to_trim_at_end: u32,
}

/// Groups incoming records into complete temporal units.
#[derive(Debug, Default)]
pub struct TemporalUnitAssembler {
    required_substreams: Vec<u32>,
    frame_length: u32,

    pending_frames: HashMap<u32, AudioFrameObu>,
    pending_parameter_blocks: Vec<ParameterBlockObu>,
    pending_arbitrary: Vec<ArbitraryObu>,
    next_timestamp: u64,
}

impl TemporalUnitAssembler {
    pub fn new(required_substreams: Vec<u32>, frame_length: u32) -> Self {
        Self {
            required_substreams,
            frame_length,
            ..Default::default()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_frames.is_empty()
            || !self.pending_parameter_blocks.is_empty()
            || !self.pending_arbitrary.is_empty()
    }

    /// Adds a frame; the frame covering the last required substream closes
    /// the unit and returns it.
    ///
    /// Parameter blocks precede the frames they apply to, so closing eagerly
    /// keeps later parameter blocks with the following unit.
    pub fn push_audio_frame(&mut self, frame: AudioFrameObu) -> Result<Option<TemporalUnit>> {
        if !self.required_substreams.contains(&frame.substream_id) {
            warn!(
                "dropping audio frame for unselected substream {}",
                frame.substream_id
            );
            return Ok(None);
        }

        frame.check_trim(self.frame_length)?;

        if self.pending_frames.contains_key(&frame.substream_id) {
            bail!(FrameError::DuplicateFrame {
                substream_id: frame.substream_id,
            });
        }
        self.pending_frames.insert(frame.substream_id, frame);

        let complete = self
            .required_substreams
            .iter()
            .all(|id| self.pending_frames.contains_key(id));
        if complete {
            return Ok(Some(self.take_pending()?));
        }
        Ok(None)
    }

    pub fn push_parameter_block(&mut self, block: ParameterBlockObu) {
        self.pending_parameter_blocks.push(block);
    }

    pub fn push_arbitrary(&mut self, obu: ArbitraryObu) {
        self.pending_arbitrary.push(obu);
    }

    /// Closes the pending unit, as on a temporal delimiter or end of stream.
    ///
    /// Returns `None` when nothing is pending; a partially covered unit is a
    /// bitstream error.
    pub fn finalize(&mut self) -> Result<Option<TemporalUnit>> {
        if !self.has_pending() {
            return Ok(None);
        }
        if self.pending_frames.is_empty() {
            // Parameter blocks with no frames attach to the next unit.
            return Ok(None);
        }
        Ok(Some(self.take_pending()?))
    }

    fn take_pending(&mut self) -> Result<TemporalUnit> {
        let missing = self
            .required_substreams
            .iter()
            .filter(|id| !self.pending_frames.contains_key(id))
            .count();
        if missing > 0 {
            bail!(FrameError::IncompleteTemporalUnit {
                timestamp: self.next_timestamp,
                missing,
                required: self.required_substreams.len(),
            });
        }

        let frames = std::mem::take(&mut self.pending_frames);

        // The unit inherits the widest trim on each end.
        let samples_to_trim_at_start = frames
            .values()
            .map(|frame| frame.samples_to_trim_at_start)
            .max()
            .unwrap_or(0);
        let samples_to_trim_at_end = frames
            .values()
            .map(|frame| frame.samples_to_trim_at_end)
            .max()
            .unwrap_or(0);

        let unit = TemporalUnit {
            start_timestamp: self.next_timestamp,
            frames,
            parameter_blocks: std::mem::take(&mut self.pending_parameter_blocks),
            arbitrary: std::mem::take(&mut self.pending_arbitrary),
            samples_to_trim_at_start,
            samples_to_trim_at_end,
        };

        self.next_timestamp += self.frame_length as u64;
        Ok(unit)
    }
}
