//! Audio Element structures.
//!
//! An audio element groups substreams into either a scalable channel-based
//! layout (layered mono up to 7.1.4) or a scene-based ambisonics
//! configuration, and declares the parameters (demixing, recon gain) its
//! reconstruction needs.

use anyhow::{Result, bail};

use crate::structs::channel::{LoudspeakerLayout, layer_step};
use crate::structs::parameter_block::ParamDefinition;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ElementError;

/// Highest ambisonics channel count handled (fourth order).
pub const MAX_AMBISONICS_CHANNELS: u8 = 25;

/// Sentinel marking an inactive ACN in mixed-order ambisonics mappings.
pub const AMBISONICS_INACTIVE: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioElementType {
    ChannelBased,
    SceneBased,
    Reserved(u8),
}

impl AudioElementType {
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::ChannelBased,
            1 => Self::SceneBased,
            other => Self::Reserved(other),
        }
    }
}

/// Demixing parameter declaration with its per-sequence defaults.
#[derive(Debug, Clone)]
pub struct DemixingParamDefinition {
    pub base: ParamDefinition,
    pub default_dmixp_mode: u8,
    pub default_w: u8,
}

impl DemixingParamDefinition {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let base = ParamDefinition::read(reader)?;

        let default_dmixp_mode: u8 = reader.get_n(3)?;
        reader.skip_n(5)?;
        let default_w: u8 = reader.get_n(4)?;
        reader.skip_n(4)?;

        Ok(Self {
            base,
            default_dmixp_mode,
            default_w,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReconGainParamDefinition {
    pub base: ParamDefinition,
}

/// One parameter declared by an audio element.
#[derive(Debug, Clone)]
pub enum AudioElementParam {
    Demixing(DemixingParamDefinition),
    ReconGain(ReconGainParamDefinition),
    Extension {
        param_definition_type: u32,
        bytes: Vec<u8>,
    },
}

/// One layer of a scalable channel audio element.
#[derive(Debug, Clone)]
pub struct ChannelAudioLayerConfig {
    pub loudspeaker_layout: LoudspeakerLayout,
    pub output_gain_is_present: bool,
    pub recon_gain_is_present: bool,
    pub substream_count: u8,
    pub coupled_substream_count: u8,
    pub output_gain_flags: u8,
    pub output_gain: i16,
    pub expanded_loudspeaker_layout: Option<u8>,
}

impl ChannelAudioLayerConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let loudspeaker_layout = LoudspeakerLayout::from_bits(reader.get_n(4)?)?;
        let output_gain_is_present = reader.get()?;
        let recon_gain_is_present = reader.get()?;
        reader.skip_n(2)?;

        let substream_count: u8 = reader.get_n(8)?;
        let coupled_substream_count: u8 = reader.get_n(8)?;

        let (output_gain_flags, output_gain) = if output_gain_is_present {
            let flags: u8 = reader.get_n(6)?;
            reader.skip_n(2)?;
            (flags, reader.get_s(16)?)
        } else {
            (0, 0)
        };

        let expanded_loudspeaker_layout = if loudspeaker_layout == LoudspeakerLayout::Expanded {
            Some(reader.get_n(8)?)
        } else {
            None
        };

        Ok(Self {
            loudspeaker_layout,
            output_gain_is_present,
            recon_gain_is_present,
            substream_count,
            coupled_substream_count,
            output_gain_flags,
            output_gain,
            expanded_loudspeaker_layout,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScalableChannelLayoutConfig {
    pub layers: Vec<ChannelAudioLayerConfig>,
}

impl ScalableChannelLayoutConfig {
    fn read(reader: &mut BsIoSliceReader, num_substreams: usize) -> Result<Self> {
        let num_layers: u8 = reader.get_n(3)?;
        reader.skip_n(5)?;

        if num_layers == 0 || num_layers > 6 {
            bail!(ElementError::InvalidLayerCount(num_layers));
        }

        let mut layers = Vec::with_capacity(num_layers as usize);
        for _ in 0..num_layers {
            layers.push(ChannelAudioLayerConfig::read(reader)?);
        }

        let config = Self { layers };
        config.validate(num_substreams)?;
        Ok(config)
    }

    /// Checks layer monotonicity and that each layer's substream counts match
    /// the channels its layout step adds.
    fn validate(&self, num_substreams: usize) -> Result<()> {
        let mut previous = None;
        let mut consumed = 0usize;

        for (index, layer) in self.layers.iter().enumerate() {
            if index == 0 && layer.recon_gain_is_present {
                bail!(ElementError::SpuriousReconGain(0));
            }

            if layer.loudspeaker_layout == LoudspeakerLayout::Expanded {
                // Expanded layouts are single-layer by construction; their
                // substream shape is taken at face value.
                consumed += layer.substream_count as usize;
                continue;
            }

            let step = layer_step(index, previous, layer.loudspeaker_layout)?;
            if step.substream_count() != layer.substream_count as usize
                || step.coupled.len() != layer.coupled_substream_count as usize
            {
                bail!(ElementError::SubstreamCountMismatch {
                    index,
                    substreams: layer.substream_count,
                    coupled: layer.coupled_substream_count,
                    labels: step.channel_count(),
                });
            }

            consumed += layer.substream_count as usize;
            previous = Some(layer.loudspeaker_layout);
        }

        if consumed != num_substreams {
            bail!(ElementError::SubstreamTotalMismatch {
                ids: num_substreams,
                consumed,
            });
        }

        Ok(())
    }

    /// The layout of the highest layer.
    pub fn top_layout(&self) -> LoudspeakerLayout {
        self.layers
            .last()
            .map(|layer| layer.loudspeaker_layout)
            .unwrap_or(LoudspeakerLayout::Mono)
    }
}

#[derive(Debug, Clone)]
pub struct AmbisonicsMonoConfig {
    pub output_channel_count: u8,
    pub substream_count: u8,
    /// ACN → substream index, [`AMBISONICS_INACTIVE`] for silent channels.
    pub channel_mapping: Vec<u8>,
}

impl AmbisonicsMonoConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let output_channel_count: u8 = reader.get_n(8)?;
        let substream_count: u8 = reader.get_n(8)?;

        if output_channel_count > MAX_AMBISONICS_CHANNELS {
            bail!(ElementError::AmbisonicsOrderTooHigh(output_channel_count));
        }

        let mut channel_mapping = Vec::with_capacity(output_channel_count as usize);
        for _ in 0..output_channel_count {
            let value: u8 = reader.get_n(8)?;
            if value != AMBISONICS_INACTIVE && value >= substream_count {
                bail!(ElementError::AmbisonicsMappingOutOfRange {
                    value,
                    substreams: substream_count,
                });
            }
            channel_mapping.push(value);
        }

        Ok(Self {
            output_channel_count,
            substream_count,
            channel_mapping,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AmbisonicsProjectionConfig {
    pub output_channel_count: u8,
    pub substream_count: u8,
    pub coupled_substream_count: u8,
    /// Q15 weights, row-major with one row per decoded channel.
    pub demixing_matrix: Vec<i16>,
}

impl AmbisonicsProjectionConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let output_channel_count: u8 = reader.get_n(8)?;
        let substream_count: u8 = reader.get_n(8)?;
        let coupled_substream_count: u8 = reader.get_n(8)?;

        if output_channel_count > MAX_AMBISONICS_CHANNELS {
            bail!(ElementError::AmbisonicsOrderTooHigh(output_channel_count));
        }

        let rows = substream_count as usize + coupled_substream_count as usize;
        let columns = output_channel_count as usize;

        let mut demixing_matrix = Vec::with_capacity(rows * columns);
        for _ in 0..rows * columns {
            demixing_matrix.push(reader.get_s(16)?);
        }

        Ok(Self {
            output_channel_count,
            substream_count,
            coupled_substream_count,
            demixing_matrix,
        })
    }

    pub fn decoded_channel_count(&self) -> usize {
        self.substream_count as usize + self.coupled_substream_count as usize
    }
}

#[derive(Debug, Clone)]
pub enum AmbisonicsConfig {
    Mono(AmbisonicsMonoConfig),
    Projection(AmbisonicsProjectionConfig),
}

impl AmbisonicsConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let ambisonics_mode = reader.get_uleb128()?;
        Ok(match ambisonics_mode {
            0 => Self::Mono(AmbisonicsMonoConfig::read(reader)?),
            1 => Self::Projection(AmbisonicsProjectionConfig::read(reader)?),
            other => bail!(ElementError::InvalidAmbisonicsMode(other)),
        })
    }

    pub fn output_channel_count(&self) -> usize {
        match self {
            Self::Mono(mono) => mono.output_channel_count as usize,
            Self::Projection(projection) => projection.output_channel_count as usize,
        }
    }
}

/// Type-specific configuration of an audio element.
#[derive(Debug, Clone)]
pub enum ElementConfig {
    Scalable(ScalableChannelLayoutConfig),
    Ambisonics(AmbisonicsConfig),
    Extension(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct AudioElement {
    pub audio_element_id: u32,
    pub audio_element_type: AudioElementType,
    pub codec_config_id: u32,
    pub audio_substream_ids: Vec<u32>,
    pub params: Vec<AudioElementParam>,
    pub config: ElementConfig,
}

impl AudioElement {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let audio_element_id = reader.get_uleb128()?;
        let audio_element_type = AudioElementType::from_bits(reader.get_n(3)?);
        reader.skip_n(5)?;

        let codec_config_id = reader.get_uleb128()?;

        let num_substreams = reader.get_uleb128()?;
        let mut audio_substream_ids = Vec::with_capacity(num_substreams as usize);
        for _ in 0..num_substreams {
            audio_substream_ids.push(reader.get_uleb128()?);
        }

        let num_parameters = reader.get_uleb128()?;
        let mut params = Vec::with_capacity(num_parameters as usize);
        for _ in 0..num_parameters {
            let param_definition_type = reader.get_uleb128()?;
            params.push(match param_definition_type {
                1 => AudioElementParam::Demixing(DemixingParamDefinition::read(reader)?),
                2 => AudioElementParam::ReconGain(ReconGainParamDefinition {
                    base: ParamDefinition::read(reader)?,
                }),
                other => {
                    let size = reader.get_uleb128()?;
                    AudioElementParam::Extension {
                        param_definition_type: other,
                        bytes: reader.get_bytes(size as usize)?,
                    }
                }
            });
        }

        let config = match audio_element_type {
            AudioElementType::ChannelBased => ElementConfig::Scalable(
                ScalableChannelLayoutConfig::read(reader, audio_substream_ids.len())?,
            ),
            AudioElementType::SceneBased => {
                ElementConfig::Ambisonics(AmbisonicsConfig::read(reader)?)
            }
            AudioElementType::Reserved(_) => {
                let remaining = (reader.available()? / 8) as usize;
                ElementConfig::Extension(reader.get_bytes(remaining)?)
            }
        };

        Ok(Self {
            audio_element_id,
            audio_element_type,
            codec_config_id,
            audio_substream_ids,
            params,
            config,
        })
    }

    /// Total channels the element contributes, for profile accounting.
    pub fn channel_count(&self) -> usize {
        match &self.config {
            ElementConfig::Scalable(scalable) => scalable
                .layers
                .iter()
                .map(|layer| {
                    layer.coupled_substream_count as usize * 2
                        + (layer.substream_count - layer.coupled_substream_count) as usize
                })
                .sum(),
            ElementConfig::Ambisonics(ambisonics) => ambisonics.output_channel_count(),
            ElementConfig::Extension(_) => 0,
        }
    }

    pub fn demixing_param(&self) -> Option<&DemixingParamDefinition> {
        self.params.iter().find_map(|param| match param {
            AudioElementParam::Demixing(demixing) => Some(demixing),
            _ => None,
        })
    }

    pub fn recon_gain_param(&self) -> Option<&ReconGainParamDefinition> {
        self.params.iter().find_map(|param| match param {
            AudioElementParam::ReconGain(recon) => Some(recon),
            _ => None,
        })
    }
}
