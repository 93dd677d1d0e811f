//! The iterative decode pipeline.
//!
//! [`IamfDecoder`] consumes an append-only byte stream, parses OBUs under the
//! resumable "insufficient data" contract, seals the descriptors, binds a mix
//! presentation, and renders one temporal unit at a time into a FIFO of PCM
//! buffers the caller drains.
//!
//! ## States
//!
//! - *AcceptingData*: bytes are welcome; descriptors accumulate until the
//!   first temporal-unit OBU seals them.
//! - *EndOfStream*: after [`IamfDecoder::signal_end_of_decoding`]; no more
//!   input, queued units drain.
//! - *Closed*: terminal.
//!
//! The first [`IamfDecoder::decode`] call that seals the descriptors returns
//! before touching temporal units, giving the caller a chance to configure
//! the output sample type.

use std::collections::{HashMap, VecDeque};

use anyhow::{Result, bail};
use log::debug;

use crate::api::{
    OutputLayout, OutputSampleType, RequestedMix, SelectedMix, Settings,
};
use crate::process::codec::{BuiltinCodecFactory, CodecDecoderFactory};
use crate::process::demix::DemixGraph;
use crate::process::descriptors::{Descriptors, MixSelection, playable_mixes, select_mix};
use crate::process::parse::ObuParser;
use crate::process::render::{Renderer, evaluate_mix_gain, write_interleaved};
use crate::process::reorder::ChannelReorderer;
use crate::process::temporal_unit::{TemporalUnit, TemporalUnitAssembler};
use crate::structs::obu::{Obu, ObuType};
use crate::structs::parameter_block::{
    DemixingInfoParameterData, ParamSpec, ParameterData, ReconGainInfoParameterData,
};
use crate::utils::errors::{
    DecodeError, DescriptorError, FrameError, SequenceError,
};
use crate::utils::read_bit_buffer::ReadBitBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderStatus {
    AcceptingData,
    EndOfStream,
    Closed,
}

/// One selected audio element bound into the pipeline.
struct ElementBinding {
    graph: DemixGraph,
    mix_gain_param_id: u32,
    mix_gain_default: i16,
    demix_param_id: Option<u32>,
    recon_param_id: Option<u32>,
}

/// Everything derived from the sealed descriptors.
struct Pipeline {
    selection: MixSelection,
    elements: Vec<ElementBinding>,
    output_gain_param_id: u32,
    output_gain_default: i16,
    param_rates: HashMap<u32, u32>,
    renderer: Renderer,
    assembler: TemporalUnitAssembler,
    reorderer: ChannelReorderer,
    sample_rate: u32,
    frame_length: u32,
    default_sample_type: OutputSampleType,
}

/// A rendered temporal unit waiting for the caller, planar float channels.
struct RenderedUnit {
    start_timestamp: u64,
    channels: Vec<Vec<f64>>,
}

struct DecoderState {
    status: DecoderStatus,
    settings: Settings,
    read_buffer: ReadBitBuffer,
    parser: ObuParser,
    descriptors: Descriptors,
    pipeline: Option<Pipeline>,
    /// Raw descriptor OBU bytes, replayed by `reset`.
    descriptor_bytes: Vec<u8>,
    rendered: VecDeque<RenderedUnit>,
    created_from_descriptors: bool,
    factory: Box<dyn CodecDecoderFactory>,
    configured_sample_type: Option<OutputSampleType>,
    emitted_sample_type: Option<OutputSampleType>,
}

/// Streaming IAMF decoder.
///
/// See the crate documentation for the call sequence.
pub struct IamfDecoder {
    state: DecoderState,
}

impl IamfDecoder {
    /// Creates a decoder for pure streaming use.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_codec_factory(settings, Box::new(BuiltinCodecFactory))
    }

    /// Creates a decoder with caller-supplied codec bindings.
    pub fn with_codec_factory(
        settings: Settings,
        factory: Box<dyn CodecDecoderFactory>,
    ) -> Result<Self> {
        let configured_sample_type = settings.requested_output_sample_type;
        Ok(Self {
            state: DecoderState {
                status: DecoderStatus::AcceptingData,
                settings,
                read_buffer: ReadBitBuffer::new(),
                parser: ObuParser::default(),
                descriptors: Descriptors::default(),
                pipeline: None,
                descriptor_bytes: Vec::new(),
                rendered: VecDeque::new(),
                created_from_descriptors: false,
                factory,
                configured_sample_type,
                emitted_sample_type: None,
            },
        })
    }

    /// Creates a decoder from a self-contained descriptor block.
    ///
    /// The buffer must contain all descriptor OBUs and nothing else; decode
    /// calls must then carry whole temporal units.
    pub fn from_descriptors(settings: Settings, descriptor_obus: &[u8]) -> Result<Self> {
        Self::from_descriptors_with_codec_factory(
            settings,
            descriptor_obus,
            Box::new(BuiltinCodecFactory),
        )
    }

    pub fn from_descriptors_with_codec_factory(
        settings: Settings,
        descriptor_obus: &[u8],
        factory: Box<dyn CodecDecoderFactory>,
    ) -> Result<Self> {
        let mut decoder = Self::with_codec_factory(settings, factory)?;
        decoder.state.read_buffer.push_bytes(descriptor_obus);
        decoder.state.process_descriptors(true)?;
        decoder.state.created_from_descriptors = true;
        Ok(decoder)
    }

    /// Appends bytes and processes as many complete OBUs as possible.
    ///
    /// The call that completes descriptor processing returns immediately;
    /// later calls parse temporal units and enqueue rendered output.
    pub fn decode(&mut self, bitstream: &[u8]) -> Result<()> {
        match self.state.status {
            DecoderStatus::EndOfStream => bail!(DecodeError::DecodeAfterEndOfStream),
            DecoderStatus::Closed => bail!(DecodeError::Closed),
            DecoderStatus::AcceptingData => {}
        }

        self.state.read_buffer.push_bytes(bitstream);

        if self.state.pipeline.is_none() {
            return self.state.process_descriptors(false);
        }

        self.state.process_temporal_units()
    }

    /// Pops the oldest rendered temporal unit into the caller's buffer.
    ///
    /// Writes nothing and returns 0 when no unit is queued. Never blocks.
    pub fn get_output_temporal_unit(&mut self, output_buffer: &mut [u8]) -> Result<usize> {
        if self.state.status == DecoderStatus::Closed {
            bail!(DecodeError::Closed);
        }

        let Some(unit) = self.state.rendered.front() else {
            return Ok(0);
        };

        let sample_type = self.current_sample_type()?;
        let written = write_interleaved(&unit.channels, sample_type, output_buffer)?;

        self.state.emitted_sample_type = Some(sample_type);
        self.state.rendered.pop_front();
        Ok(written)
    }

    pub fn is_temporal_unit_available(&self) -> bool {
        !self.state.rendered.is_empty()
    }

    pub fn is_descriptor_processing_complete(&self) -> bool {
        self.state.pipeline.is_some()
    }

    /// Selects the output sample format for subsequent output.
    ///
    /// Changing the format after PCM has been emitted is an error.
    pub fn configure_output_sample_type(&mut self, sample_type: OutputSampleType) -> Result<()> {
        if let Some(emitted) = self.state.emitted_sample_type {
            if emitted != sample_type {
                bail!(DecodeError::SampleTypeLocked);
            }
        }
        self.state.configured_sample_type = Some(sample_type);
        Ok(())
    }

    pub fn get_output_layout(&self) -> Result<OutputLayout> {
        Ok(self.pipeline("GetOutputLayout")?.selection.output_layout)
    }

    pub fn get_number_of_output_channels(&self) -> Result<usize> {
        Ok(self
            .pipeline("GetNumberOfOutputChannels")?
            .selection
            .output_layout
            .channel_count())
    }

    pub fn get_output_sample_type(&self) -> Result<OutputSampleType> {
        let default = self.pipeline("GetOutputSampleType")?.default_sample_type;
        Ok(self.state.configured_sample_type.unwrap_or(default))
    }

    pub fn get_sample_rate(&self) -> Result<u32> {
        Ok(self.pipeline("GetSampleRate")?.sample_rate)
    }

    /// Samples per frame per channel of the output audio.
    pub fn get_frame_size(&self) -> Result<u32> {
        Ok(self.pipeline("GetFrameSize")?.frame_length)
    }

    /// The mix presentation and layout actually bound.
    pub fn get_output_mix(&self) -> Result<SelectedMix> {
        let selection = &self.pipeline("GetOutputMix")?.selection;
        Ok(SelectedMix {
            mix_presentation_id: selection.mix_presentation_id,
            output_layout: selection.output_layout,
        })
    }

    /// Enumerating mix presentation metadata is not part of the core.
    pub fn get_mix_presentations(&self) -> Result<()> {
        bail!(DecodeError::Unimplemented("GetMixPresentations"))
    }

    /// Returns the decoder to a clean post-descriptor state.
    ///
    /// Queued output and buffered input are dropped; the cached descriptor
    /// bytes are replayed so the demix graphs and renderer start fresh.
    pub fn reset(&mut self) -> Result<()> {
        if self.state.pipeline.is_none() {
            bail!(DecodeError::DescriptorsNotReady("Reset"));
        }
        self.state.rebuild_from_cached_descriptors()
    }

    /// Like [`IamfDecoder::reset`], additionally retargeting the output
    /// layout. Mix selection re-runs against the new request.
    pub fn reset_with_new_layout(&mut self, output_layout: OutputLayout) -> Result<()> {
        if self.state.pipeline.is_none() {
            bail!(DecodeError::DescriptorsNotReady("ResetWithNewLayout"));
        }
        self.state.settings.requested_layout = output_layout;
        self.state.settings.requested_mix = None;
        self.state.rebuild_from_cached_descriptors()
    }

    /// Like [`IamfDecoder::reset`], with a new mix request.
    pub fn reset_with_new_mix(&mut self, requested_mix: RequestedMix) -> Result<()> {
        if self.state.pipeline.is_none() {
            bail!(DecodeError::DescriptorsNotReady("ResetWithNewMix"));
        }
        self.state.settings.requested_mix = Some(requested_mix);
        self.state.rebuild_from_cached_descriptors()
    }

    /// Declares that no more input will arrive.
    ///
    /// The pending temporal unit (if complete) is rendered so the queue can
    /// drain; further decode calls fail.
    pub fn signal_end_of_decoding(&mut self) -> Result<()> {
        if self.state.status == DecoderStatus::AcceptingData {
            if let Some(pipeline) = self.state.pipeline.as_mut() {
                if let Some(unit) = pipeline.assembler.finalize()? {
                    render_unit(pipeline, unit, &mut self.state.rendered)?;
                }
            }
            self.state.status = DecoderStatus::EndOfStream;
        }
        Ok(())
    }

    /// Closes the decoder; idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.state.status = DecoderStatus::Closed;
        self.state.rendered.clear();
        Ok(())
    }

    fn pipeline(&self, caller: &'static str) -> Result<&Pipeline> {
        self.state
            .pipeline
            .as_ref()
            .ok_or_else(|| DecodeError::DescriptorsNotReady(caller).into())
    }

    fn current_sample_type(&self) -> Result<OutputSampleType> {
        self.get_output_sample_type()
    }
}

impl DecoderState {
    /// Parses descriptor OBUs until the first temporal OBU or buffer end.
    ///
    /// In exhaustive mode the buffer must hold all descriptors and nothing
    /// else; in streaming mode running out of data is fine and sealing waits
    /// for the first temporal-unit OBU.
    fn process_descriptors(&mut self, exhaustive: bool) -> Result<()> {
        let empty_specs: HashMap<u32, ParamSpec> = HashMap::new();

        loop {
            let Some(header) = self.parser.peek_header(&mut self.read_buffer)? else {
                if exhaustive {
                    if self.read_buffer.available_bits() > 0 {
                        bail!(DescriptorError::TruncatedDescriptors);
                    }
                    return self.seal_and_bind();
                }
                return Ok(());
            };

            if !header.kind().is_descriptor() {
                if exhaustive {
                    bail!(DescriptorError::ResidualBytes(
                        (self.read_buffer.available_bits() / 8) as usize
                    ));
                }
                return self.seal_and_bind();
            }

            let Some(parsed) = self.parser.try_next(&mut self.read_buffer, &empty_specs)? else {
                if exhaustive {
                    bail!(DescriptorError::TruncatedDescriptors);
                }
                return Ok(());
            };

            if parsed.header.redundant_copy {
                debug!("ignoring redundant descriptor copy");
                continue;
            }
            self.descriptors.add(parsed.obu)?;
        }
    }

    /// Validates the descriptors and builds the rendering pipeline.
    fn seal_and_bind(&mut self) -> Result<()> {
        // Keep the raw descriptor bytes around for reset.
        let boundary = self.read_buffer.tell();
        self.read_buffer.seek(0)?;
        self.descriptor_bytes = self.read_buffer.read_bytes((boundary / 8) as usize)?;
        self.read_buffer.flush_consumed()?;

        self.descriptors.seal()?;

        let playable = playable_mixes(
            &self.descriptors,
            &self.settings.requested_profile_versions,
        )?;
        let selection = select_mix(
            &self.descriptors,
            self.settings.requested_mix,
            self.settings.requested_layout,
            &playable,
        )?;

        let sub_mix =
            &self.descriptors.mix_presentations[selection.mix_index].sub_mixes[selection.sub_mix_index];

        let mut elements = Vec::with_capacity(sub_mix.audio_elements.len());
        let mut required_substreams = Vec::new();
        let mut frame_length: Option<u32> = None;
        let mut sample_rate = 0;
        let mut max_bit_depth = 0u8;

        for sub_mix_element in &sub_mix.audio_elements {
            let element = self
                .descriptors
                .audio_element(sub_mix_element.audio_element_id)
                .expect("validated at seal");
            let codec_config = self
                .descriptors
                .codec_config_for(element)
                .expect("validated at seal");

            match frame_length {
                None => frame_length = Some(codec_config.num_samples_per_frame),
                Some(expected) if expected != codec_config.num_samples_per_frame => {
                    bail!(FrameError::MismatchedFrameLengths(
                        expected,
                        codec_config.num_samples_per_frame
                    ));
                }
                _ => {}
            }

            sample_rate = match codec_config.sample_rate() {
                Some(rate) => rate,
                None => self.factory.decoder_for(codec_config)?.output_sample_rate(),
            };
            max_bit_depth = max_bit_depth.max(codec_config.bit_depth().unwrap_or(32));

            let graph = DemixGraph::build(element, codec_config, self.factory.as_ref())?;
            required_substreams.extend_from_slice(graph.substream_ids());

            elements.push(ElementBinding {
                graph,
                mix_gain_param_id: sub_mix_element.element_mix_gain.base.parameter_id,
                mix_gain_default: sub_mix_element.element_mix_gain.default_mix_gain,
                demix_param_id: element
                    .demixing_param()
                    .map(|demixing| demixing.base.parameter_id),
                recon_param_id: element
                    .recon_gain_param()
                    .map(|recon| recon.base.parameter_id),
            });
        }

        let frame_length = frame_length.unwrap_or(0);
        let param_rates = self
            .descriptors
            .param_specs
            .iter()
            .map(|(&id, spec)| (id, spec.definition.parameter_rate))
            .collect();

        let default_sample_type = if max_bit_depth <= 16 {
            OutputSampleType::Int16LittleEndian
        } else {
            OutputSampleType::Int32LittleEndian
        };

        self.pipeline = Some(Pipeline {
            renderer: Renderer::new(selection.output_layout),
            assembler: TemporalUnitAssembler::new(required_substreams, frame_length),
            reorderer: ChannelReorderer::new(
                selection.output_layout,
                self.settings.channel_ordering,
            ),
            elements,
            output_gain_param_id: sub_mix.output_mix_gain.base.parameter_id,
            output_gain_default: sub_mix.output_mix_gain.default_mix_gain,
            param_rates,
            sample_rate,
            frame_length,
            default_sample_type,
            selection,
        });

        debug!(
            "bound mix presentation {} on layout {}",
            selection.mix_presentation_id, selection.output_layout
        );
        Ok(())
    }

    /// Drains all currently-parseable temporal-unit OBUs.
    fn process_temporal_units(&mut self) -> Result<()> {
        let empty_specs: HashMap<u32, ParamSpec> = HashMap::new();

        loop {
            let Some(header) = self.parser.peek_header(&mut self.read_buffer)? else {
                break;
            };

            let kind = header.kind();
            if kind.is_descriptor() {
                if header.redundant_copy {
                    // Redundant copies after sealing are parsed and dropped.
                    self.parser.try_next(&mut self.read_buffer, &empty_specs)?;
                    continue;
                }
                if kind == ObuType::SequenceHeader {
                    bail!(SequenceError::SequenceRestart);
                }
                bail!(DescriptorError::DescriptorAfterSeal(header.obu_type));
            }

            let Some(parsed) = self
                .parser
                .try_next(&mut self.read_buffer, &self.descriptors.param_specs)?
            else {
                break;
            };

            let pipeline = self.pipeline.as_mut().expect("pipeline is bound");
            match parsed.obu {
                Obu::AudioFrame(frame) => {
                    if let Some(unit) = pipeline.assembler.push_audio_frame(frame)? {
                        render_unit(pipeline, unit, &mut self.rendered)?;
                    }
                }
                Obu::ParameterBlock(block) => pipeline.assembler.push_parameter_block(block),
                Obu::TemporalDelimiter => {
                    if let Some(unit) = pipeline.assembler.finalize()? {
                        render_unit(pipeline, unit, &mut self.rendered)?;
                    }
                }
                Obu::Arbitrary(arbitrary) => pipeline.assembler.push_arbitrary(arbitrary),
                _ => unreachable!("descriptor kinds are handled above"),
            }
        }

        // Descriptor-fed decoders receive whole temporal units per call.
        if self.created_from_descriptors {
            let pipeline = self.pipeline.as_mut().expect("pipeline is bound");
            if let Some(unit) = pipeline.assembler.finalize()? {
                render_unit(pipeline, unit, &mut self.rendered)?;
            }
        }

        self.read_buffer.flush_consumed()?;
        Ok(())
    }

    fn rebuild_from_cached_descriptors(&mut self) -> Result<()> {
        self.rendered.clear();
        self.read_buffer.clear();
        self.pipeline = None;
        self.descriptors = Descriptors::default();
        self.status = DecoderStatus::AcceptingData;

        let descriptor_bytes = std::mem::take(&mut self.descriptor_bytes);
        self.read_buffer.push_bytes(&descriptor_bytes);
        self.process_descriptors(true)
    }
}

fn find_demixing<'a>(
    unit: &'a TemporalUnit,
    parameter_id: Option<u32>,
) -> Option<&'a DemixingInfoParameterData> {
    let parameter_id = parameter_id?;
    unit.parameter_blocks
        .iter()
        .filter(|block| block.parameter_id == parameter_id)
        .filter_map(|block| block.subblocks.first())
        .find_map(|subblock| match &subblock.data {
            ParameterData::Demixing(demixing) => Some(demixing),
            _ => None,
        })
}

fn find_recon_gain<'a>(
    unit: &'a TemporalUnit,
    parameter_id: Option<u32>,
) -> Option<&'a ReconGainInfoParameterData> {
    let parameter_id = parameter_id?;
    unit.parameter_blocks
        .iter()
        .filter(|block| block.parameter_id == parameter_id)
        .filter_map(|block| block.subblocks.first())
        .find_map(|subblock| match &subblock.data {
            ParameterData::ReconGain(recon) => Some(recon),
            _ => None,
        })
}

/// Demixes, renders, mixes and trims one temporal unit onto the queue.
fn render_unit(
    pipeline: &mut Pipeline,
    unit: TemporalUnit,
    rendered: &mut VecDeque<RenderedUnit>,
) -> Result<()> {
    let target_channels = pipeline.selection.output_layout.channel_count();
    let mut mixed: Vec<Vec<f64>> = Vec::new();
    let mut num_samples = 0;

    for binding in &mut pipeline.elements {
        let demixing = find_demixing(&unit, binding.demix_param_id);
        let recon_gain = find_recon_gain(&unit, binding.recon_param_id);

        let labeled = binding.graph.demix(&unit.frames, demixing, recon_gain)?;
        let element_channels = pipeline.renderer.render_element(&labeled)?;

        if mixed.is_empty() {
            num_samples = labeled.num_samples;
            mixed = vec![vec![0.0; num_samples]; target_channels];
        }

        let rate = pipeline
            .param_rates
            .get(&binding.mix_gain_param_id)
            .copied()
            .unwrap_or(pipeline.sample_rate)
            .max(1);
        let gains = evaluate_mix_gain(
            unit.parameter_blocks
                .iter()
                .find(|block| block.parameter_id == binding.mix_gain_param_id),
            binding.mix_gain_default,
            num_samples,
            pipeline.sample_rate as f64 / rate as f64,
        );

        for (out, element) in mixed.iter_mut().zip(element_channels) {
            for ((o, &sample), &gain) in out.iter_mut().zip(element.iter()).zip(&gains) {
                *o += sample * gain;
            }
        }
    }

    // Submix output gain.
    let rate = pipeline
        .param_rates
        .get(&pipeline.output_gain_param_id)
        .copied()
        .unwrap_or(pipeline.sample_rate)
        .max(1);
    let output_gains = evaluate_mix_gain(
        unit.parameter_blocks
            .iter()
            .find(|block| block.parameter_id == pipeline.output_gain_param_id),
        pipeline.output_gain_default,
        num_samples,
        pipeline.sample_rate as f64 / rate as f64,
    );
    for channel in &mut mixed {
        for (sample, &gain) in channel.iter_mut().zip(&output_gains) {
            *sample *= gain;
        }
    }

    // Authored head/tail trim.
    let trim_start = unit.samples_to_trim_at_start as usize;
    let trim_end = unit.samples_to_trim_at_end as usize;
    if trim_start + trim_end > num_samples {
        bail!(FrameError::TrimExceedsFrame {
            trim_start: unit.samples_to_trim_at_start,
            trim_end: unit.samples_to_trim_at_end,
            frame_length: num_samples as u32,
        });
    }
    for channel in &mut mixed {
        channel.truncate(num_samples - trim_end);
        channel.drain(..trim_start);
    }

    pipeline
        .renderer
        .notify_observer(unit.start_timestamp, &mixed);
    pipeline.reorderer.reorder(&mut mixed);

    rendered.push_back(RenderedUnit {
        start_timestamp: unit.start_timestamp,
        channels: mixed,
    });

    debug!(
        "rendered temporal unit at {} ({} samples)",
        unit.start_timestamp,
        num_samples - trim_start - trim_end
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChannelOrdering, ProfileVersion};
    use crate::process::render::ambisonics_decode_matrix;

    fn frame_obu(obu_type: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
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

    fn sequence_header_obu(primary: u8, additional: u8) -> Vec<u8> {
        frame_obu(31, 0, &[b'i', b'a', b'm', b'f', primary, additional])
    }

    fn lpcm_codec_config_obu(id: u8, num_samples_per_frame: u8) -> Vec<u8> {
        let mut payload = vec![id];
        payload.extend(b"ipcm");
        payload.push(num_samples_per_frame);
        payload.extend([0x00, 0x00, 0x01, 16]);
        payload.extend(48_000u32.to_be_bytes());
        frame_obu(0, 0, &payload)
    }

    fn stereo_element_obu(element_id: u8, codec_id: u8, substream_id: u8) -> Vec<u8> {
        let payload = vec![
            element_id,
            0x00,
            codec_id,
            0x01,
            substream_id,
            0x00,
            0b001_00000,
            0b0001_0000,
            0x01,
            0x01,
        ];
        frame_obu(1, 0, &payload)
    }

    fn mono_stereo_element_obu(element_id: u8, codec_id: u8) -> Vec<u8> {
        let payload = vec![
            element_id,
            0x00,
            codec_id,
            0x02,
            0x00,
            0x01,
            0x00,
            0b010_00000,
            0b0000_0000,
            0x01,
            0x00,
            0b0001_0000,
            0x01,
            0x00,
        ];
        frame_obu(1, 0, &payload)
    }

    fn ambisonics_element_obu(
        element_id: u8,
        codec_id: u8,
        substream_ids: &[u8],
        channel_mapping: &[u8],
    ) -> Vec<u8> {
        let mut payload = vec![element_id, 0b001_00000, codec_id];
        payload.push(substream_ids.len() as u8);
        payload.extend_from_slice(substream_ids);
        payload.push(0x00); // num_parameters
        payload.push(0x00); // ambisonics_mode = mono
        payload.push(channel_mapping.len() as u8);
        payload.push(substream_ids.len() as u8);
        payload.extend_from_slice(channel_mapping);
        frame_obu(1, 0, &payload)
    }

    fn stereo_mix_obu(mix_id: u8, element_id: u8) -> Vec<u8> {
        let payload = crate::structs::mix_presentation::tests::stereo_mix_bytes(mix_id, element_id);
        frame_obu(2, 0, &payload)
    }

    fn pcm_frame_obu(substream_id: u8, samples: &[i16]) -> Vec<u8> {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if substream_id <= 17 {
            frame_obu(6 + substream_id, 0, &payload)
        } else {
            let mut body = vec![substream_id];
            body.extend(payload);
            frame_obu(5, 0, &body)
        }
    }

    fn stereo_settings() -> Settings {
        Settings {
            requested_layout: OutputLayout::SoundSystemA0_2_0,
            requested_output_sample_type: Some(OutputSampleType::Int16LittleEndian),
            ..Settings::default()
        }
    }

    /// Scenario: stereo LPCM, one temporal unit echoed bit-exactly.
    #[test]
    fn stereo_lpcm_round_trip() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 8));
        stream.extend(stereo_element_obu(2, 1, 18));
        stream.extend(stereo_mix_obu(3, 2));

        let pcm: Vec<u8> = (1..=16).collect();
        let mut frame = vec![18u8];
        frame.extend(&pcm);
        let frame = frame_obu(5, 0, &frame);

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        assert!(!decoder.is_descriptor_processing_complete());

        // The first frame header seals the descriptors; decode returns early.
        decoder.decode(&frame)?;
        assert!(decoder.is_descriptor_processing_complete());
        assert_eq!(decoder.get_output_layout()?, OutputLayout::SoundSystemA0_2_0);
        assert_eq!(decoder.get_number_of_output_channels()?, 2);
        assert_eq!(decoder.get_sample_rate()?, 48_000);
        assert_eq!(decoder.get_frame_size()?, 8);
        assert_eq!(decoder.get_output_mix()?.mix_presentation_id, 3);

        decoder.decode(&[])?;
        decoder.signal_end_of_decoding()?;
        assert!(decoder.is_temporal_unit_available());

        let mut out = vec![0u8; 64];
        let written = decoder.get_output_temporal_unit(&mut out)?;
        assert_eq!(written, 16);
        assert_eq!(&out[..16], &pcm[..]);

        assert_eq!(decoder.get_output_temporal_unit(&mut out)?, 0);
        decoder.close()?;
        Ok(())
    }

    /// Scenario: two-layer mono/stereo element demixes R2 = 2·Mono − L2.
    #[test]
    fn mono_to_stereo_scalable_demix() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(mono_stereo_element_obu(2, 1));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(0, &[750]));
        stream.extend(pcm_frame_obu(1, &[1000]));

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;
        decoder.signal_end_of_decoding()?;

        let mut out = vec![0u8; 16];
        let written = decoder.get_output_temporal_unit(&mut out)?;
        assert_eq!(written, 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 1000);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 500);
        Ok(())
    }

    /// Scenario: first-order ambisonics decoded through the stereo rows.
    #[test]
    fn first_order_ambisonics_to_stereo() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(ambisonics_element_obu(2, 1, &[0, 1, 2, 3], &[0, 1, 2, 3]));
        stream.extend(stereo_mix_obu(3, 2));
        for (substream, sample) in [(0u8, 1i16), (1, 2), (2, 3), (3, 4)] {
            stream.extend(pcm_frame_obu(substream, &[sample]));
        }

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;
        decoder.signal_end_of_decoding()?;

        let mut out = vec![0u8; 16];
        assert_eq!(decoder.get_output_temporal_unit(&mut out)?, 4);

        let matrix = ambisonics_decode_matrix(4, OutputLayout::SoundSystemA0_2_0);
        let scene = [1.0, 2.0, 3.0, 4.0].map(|s| s / 32768.0);
        for (channel, row) in matrix.iter().enumerate() {
            let expected: f64 = row.iter().zip(scene).map(|(g, s)| g * s).sum();
            let expected = (expected * 32768.0).round() as i16;
            let actual =
                i16::from_le_bytes([out[channel * 2], out[channel * 2 + 1]]);
            assert_eq!(actual, expected);
        }
        Ok(())
    }

    /// Scenario: mixed-order ambisonics treats the dropped ACN as silence.
    #[test]
    fn mixed_order_ambisonics_drops_acn1() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(ambisonics_element_obu(2, 1, &[0, 1, 2], &[0, 255, 1, 2]));
        stream.extend(stereo_mix_obu(3, 2));
        for (substream, sample) in [(0u8, 1i16), (1, 3), (2, 4)] {
            stream.extend(pcm_frame_obu(substream, &[sample]));
        }

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;
        decoder.signal_end_of_decoding()?;

        let mut out = vec![0u8; 16];
        assert_eq!(decoder.get_output_temporal_unit(&mut out)?, 4);

        let matrix = ambisonics_decode_matrix(4, OutputLayout::SoundSystemA0_2_0);
        let scene = [1.0, 0.0, 3.0, 4.0].map(|s| s / 32768.0);
        for (channel, row) in matrix.iter().enumerate() {
            let expected: f64 = row.iter().zip(scene).map(|(g, s)| g * s).sum();
            let expected = (expected * 32768.0).round() as i16;
            let actual =
                i16::from_le_bytes([out[channel * 2], out[channel * 2 + 1]]);
            assert_eq!(actual, expected);
        }
        Ok(())
    }

    /// Scenario: fourth-order ambisonics needs Base-Enhanced.
    #[test]
    fn profile_filter_rejects_fourth_order_for_simple() -> Result<()> {
        let substream_ids: Vec<u8> = (0..25).collect();
        let channel_mapping: Vec<u8> = (0..25).collect();

        let mut descriptors = sequence_header_obu(2, 2);
        descriptors.extend(lpcm_codec_config_obu(1, 8));
        descriptors.extend(ambisonics_element_obu(2, 1, &substream_ids, &channel_mapping));
        descriptors.extend(stereo_mix_obu(3, 2));

        let simple_only = Settings {
            requested_profile_versions: vec![ProfileVersion::Simple],
            ..stereo_settings()
        };
        assert!(IamfDecoder::from_descriptors(simple_only, &descriptors).is_err());

        let base_enhanced = Settings {
            requested_profile_versions: vec![ProfileVersion::BaseEnhanced],
            ..stereo_settings()
        };
        let decoder = IamfDecoder::from_descriptors(base_enhanced, &descriptors)?;
        assert!(decoder.is_descriptor_processing_complete());
        Ok(())
    }

    /// Scenario: reset replays the descriptors and reproduces the output.
    #[test]
    fn reset_preserves_descriptors_and_output() -> Result<()> {
        let mut descriptors = sequence_header_obu(0, 1);
        descriptors.extend(lpcm_codec_config_obu(1, 1));
        descriptors.extend(mono_stereo_element_obu(2, 1));
        descriptors.extend(stereo_mix_obu(3, 2));

        let mut units = Vec::new();
        units.extend(pcm_frame_obu(0, &[750]));
        units.extend(pcm_frame_obu(1, &[1000]));
        units.extend(pcm_frame_obu(0, &[400]));
        units.extend(pcm_frame_obu(1, &[300]));

        let mut decoder = IamfDecoder::from_descriptors(stereo_settings(), &descriptors)?;

        let mut first_pass = Vec::new();
        decoder.decode(&units)?;
        let mut out = vec![0u8; 32];
        while decoder.is_temporal_unit_available() {
            let written = decoder.get_output_temporal_unit(&mut out)?;
            first_pass.extend_from_slice(&out[..written]);
        }
        assert!(!first_pass.is_empty());

        decoder.reset()?;
        assert!(!decoder.is_temporal_unit_available());

        let mut second_pass = Vec::new();
        decoder.decode(&units)?;
        while decoder.is_temporal_unit_available() {
            let written = decoder.get_output_temporal_unit(&mut out)?;
            second_pass.extend_from_slice(&out[..written]);
        }

        assert_eq!(first_pass, second_pass);
        Ok(())
    }

    #[test]
    fn descriptors_split_across_calls_seal_once() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 8));
        stream.extend(stereo_element_obu(2, 1, 18));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(18, &[1, 2, 3, 4, 5, 6, 7, 8]));

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        let (first, rest) = stream.split_at(7);
        decoder.decode(first)?;
        assert!(!decoder.is_descriptor_processing_complete());
        decoder.decode(rest)?;
        assert!(decoder.is_descriptor_processing_complete());
        Ok(())
    }

    #[test]
    fn reset_before_seal_fails() -> Result<()> {
        let mut decoder = IamfDecoder::new(stereo_settings())?;
        assert!(decoder.reset().is_err());
        Ok(())
    }

    #[test]
    fn decode_after_end_of_stream_fails() -> Result<()> {
        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.signal_end_of_decoding()?;
        assert!(decoder.decode(&[0x00]).is_err());
        Ok(())
    }

    #[test]
    fn from_descriptors_rejects_residual_bytes() {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 8));
        stream.extend(stereo_element_obu(2, 1, 18));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(18, &[1, 2]));

        assert!(IamfDecoder::from_descriptors(stereo_settings(), &stream).is_err());
    }

    #[test]
    fn mid_stream_sequence_restart_is_fatal() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(mono_stereo_element_obu(2, 1));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(0, &[1]));
        stream.extend(pcm_frame_obu(1, &[1]));

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;

        assert!(decoder.decode(&sequence_header_obu(0, 1)).is_err());
        Ok(())
    }

    #[test]
    fn sample_type_locks_after_first_output() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(mono_stereo_element_obu(2, 1));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(0, &[10]));
        stream.extend(pcm_frame_obu(1, &[10]));

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;
        decoder.signal_end_of_decoding()?;

        let mut out = vec![0u8; 16];
        decoder.get_output_temporal_unit(&mut out)?;

        assert!(
            decoder
                .configure_output_sample_type(OutputSampleType::Int32LittleEndian)
                .is_err()
        );
        assert!(
            decoder
                .configure_output_sample_type(OutputSampleType::Int16LittleEndian)
                .is_ok()
        );
        Ok(())
    }

    #[test]
    fn temporal_delimiter_closes_unit() -> Result<()> {
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(mono_stereo_element_obu(2, 1));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(0, &[750]));
        stream.extend(pcm_frame_obu(1, &[1000]));
        stream.extend(frame_obu(4, 0, &[])); // temporal delimiter

        let mut decoder = IamfDecoder::new(stereo_settings())?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;
        assert!(decoder.is_temporal_unit_available());
        Ok(())
    }

    /// Both creation modes agree on the bound configuration.
    #[test]
    fn creation_modes_bind_identically() -> Result<()> {
        let mut descriptors = sequence_header_obu(0, 1);
        descriptors.extend(lpcm_codec_config_obu(1, 8));
        descriptors.extend(stereo_element_obu(2, 1, 18));
        descriptors.extend(stereo_mix_obu(3, 2));

        let from_descriptors = IamfDecoder::from_descriptors(stereo_settings(), &descriptors)?;

        let mut streamed = IamfDecoder::new(stereo_settings())?;
        let mut stream = descriptors.clone();
        stream.extend(frame_obu(4, 0, &[])); // temporal delimiter seals
        streamed.decode(&stream)?;
        assert!(streamed.is_descriptor_processing_complete());

        assert_eq!(
            from_descriptors.get_output_layout()?,
            streamed.get_output_layout()?
        );
        assert_eq!(
            from_descriptors.get_number_of_output_channels()?,
            streamed.get_number_of_output_channels()?
        );
        assert_eq!(
            from_descriptors.get_sample_rate()?,
            streamed.get_sample_rate()?
        );
        assert_eq!(
            from_descriptors.get_frame_size()?,
            streamed.get_frame_size()?
        );
        assert_eq!(
            from_descriptors.get_output_mix()?,
            streamed.get_output_mix()?
        );
        Ok(())
    }

    #[test]
    fn reset_with_new_layout_reruns_selection() -> Result<()> {
        let mut descriptors = sequence_header_obu(0, 1);
        descriptors.extend(lpcm_codec_config_obu(1, 1));
        descriptors.extend(mono_stereo_element_obu(2, 1));
        descriptors.extend(stereo_mix_obu(3, 2));

        let mut decoder = IamfDecoder::from_descriptors(stereo_settings(), &descriptors)?;
        assert_eq!(decoder.get_output_layout()?, OutputLayout::SoundSystemA0_2_0);

        // The mix only offers stereo; a 5.1 request falls back to it.
        decoder.reset_with_new_layout(OutputLayout::SoundSystemB0_5_0)?;
        assert_eq!(decoder.get_output_layout()?, OutputLayout::SoundSystemA0_2_0);

        let mut units = Vec::new();
        units.extend(pcm_frame_obu(0, &[750]));
        units.extend(pcm_frame_obu(1, &[1000]));
        decoder.decode(&units)?;
        assert!(decoder.is_temporal_unit_available());
        Ok(())
    }

    #[test]
    fn android_ordering_applies_to_output() -> Result<()> {
        // A stereo output is untouched; this exercises the wiring only.
        let mut stream = sequence_header_obu(0, 1);
        stream.extend(lpcm_codec_config_obu(1, 1));
        stream.extend(mono_stereo_element_obu(2, 1));
        stream.extend(stereo_mix_obu(3, 2));
        stream.extend(pcm_frame_obu(0, &[750]));
        stream.extend(pcm_frame_obu(1, &[1000]));

        let settings = Settings {
            channel_ordering: ChannelOrdering::AndroidOrdering,
            ..stereo_settings()
        };
        let mut decoder = IamfDecoder::new(settings)?;
        decoder.decode(&stream)?;
        decoder.decode(&[])?;
        decoder.signal_end_of_decoding()?;

        let mut out = vec![0u8; 16];
        assert_eq!(decoder.get_output_temporal_unit(&mut out)?, 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 1000);
        Ok(())
    }
}
