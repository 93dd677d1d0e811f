//! Mix Presentation structures.
//!
//! A mix presentation describes how audio elements combine into playable
//! submixes: per-element rendering configs and mix gains, an output mix gain,
//! and the loudspeaker layouts the mix was authored and measured for.

use anyhow::{Result, bail};

use crate::api::OutputLayout;
use crate::structs::parameter_block::ParamDefinition;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ElementError;

/// ITU-R BS.2051 sound system of a loudness layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSystem {
    A0_2_0,
    B0_5_0,
    C2_5_0,
    D4_5_0,
    E4_5_1,
    F3_7_0,
    G4_9_0,
    H9_10_3,
    I0_7_0,
    J4_7_0,
    Ext7_1_2,
    Ext3_1_2,
    Mono0_1_0,
    Ext9_1_6,
}

impl SoundSystem {
    pub fn from_bits(bits: u8) -> Result<Self> {
        Ok(match bits {
            0 => Self::A0_2_0,
            1 => Self::B0_5_0,
            2 => Self::C2_5_0,
            3 => Self::D4_5_0,
            4 => Self::E4_5_1,
            5 => Self::F3_7_0,
            6 => Self::G4_9_0,
            7 => Self::H9_10_3,
            8 => Self::I0_7_0,
            9 => Self::J4_7_0,
            10 => Self::Ext7_1_2,
            11 => Self::Ext3_1_2,
            12 => Self::Mono0_1_0,
            13 => Self::Ext9_1_6,
            other => bail!(ElementError::InvalidLoudspeakerLayout(other)),
        })
    }

    pub const fn output_layout(self) -> OutputLayout {
        match self {
            Self::A0_2_0 => OutputLayout::SoundSystemA0_2_0,
            Self::B0_5_0 => OutputLayout::SoundSystemB0_5_0,
            Self::C2_5_0 => OutputLayout::SoundSystemC2_5_0,
            Self::D4_5_0 => OutputLayout::SoundSystemD4_5_0,
            Self::E4_5_1 => OutputLayout::SoundSystemE4_5_1,
            Self::F3_7_0 => OutputLayout::SoundSystemF3_7_0,
            Self::G4_9_0 => OutputLayout::SoundSystemG4_9_0,
            Self::H9_10_3 => OutputLayout::SoundSystemH9_10_3,
            Self::I0_7_0 => OutputLayout::SoundSystemI0_7_0,
            Self::J4_7_0 => OutputLayout::SoundSystemJ4_7_0,
            Self::Ext7_1_2 => OutputLayout::Extension7_1_2,
            Self::Ext3_1_2 => OutputLayout::Extension3_1_2,
            Self::Mono0_1_0 => OutputLayout::ExtensionMono0_1_0,
            Self::Ext9_1_6 => OutputLayout::Extension9_1_6,
        }
    }
}

/// Target of one loudness layout entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    SoundSystem(SoundSystem),
    Binaural,
    Reserved(u8),
}

impl Layout {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let layout_type: u8 = reader.get_n(2)?;
        Ok(match layout_type {
            2 => {
                let sound_system = SoundSystem::from_bits(reader.get_n(4)?)?;
                reader.skip_n(2)?;
                Self::SoundSystem(sound_system)
            }
            3 => {
                reader.skip_n(6)?;
                Self::Binaural
            }
            other => {
                reader.skip_n(6)?;
                Self::Reserved(other)
            }
        })
    }

    /// The abstract output layout this entry plays on, when supported.
    pub fn output_layout(&self) -> Option<OutputLayout> {
        match self {
            Self::SoundSystem(sound_system) => Some(sound_system.output_layout()),
            Self::Binaural => Some(OutputLayout::Binaural),
            Self::Reserved(_) => None,
        }
    }
}

/// Authored loudness of a submix on one layout.
#[derive(Debug, Clone, Default)]
pub struct LoudnessInfo {
    pub info_type: u8,
    pub integrated_loudness: i16,
    pub digital_peak: i16,
    pub true_peak: Option<i16>,
    pub anchored_loudness: Vec<(u8, i16)>,
    pub extension: Vec<u8>,
}

impl LoudnessInfo {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut loudness = Self {
            info_type: reader.get_n(8)?,
            integrated_loudness: reader.get_s(16)?,
            digital_peak: reader.get_s(16)?,
            ..Default::default()
        };

        if loudness.info_type & 1 != 0 {
            loudness.true_peak = Some(reader.get_s(16)?);
        }

        if loudness.info_type & 2 != 0 {
            let num_anchored_loudness: u8 = reader.get_n(8)?;
            for _ in 0..num_anchored_loudness {
                let anchor_element: u8 = reader.get_n(8)?;
                let anchored_loudness: i16 = reader.get_s(16)?;
                loudness
                    .anchored_loudness
                    .push((anchor_element, anchored_loudness));
            }
        }

        if loudness.info_type & 0b1111_1100 != 0 {
            let size = reader.get_uleb128()?;
            loudness.extension = reader.get_bytes(size as usize)?;
        }

        Ok(loudness)
    }
}

#[derive(Debug, Clone)]
pub struct MixPresentationLayout {
    pub layout: Layout,
    pub loudness: LoudnessInfo,
}

/// Mix gain declaration plus its sequence-wide default.
#[derive(Debug, Clone)]
pub struct MixGainParamDefinition {
    pub base: ParamDefinition,
    pub default_mix_gain: i16,
}

impl MixGainParamDefinition {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            base: ParamDefinition::read(reader)?,
            default_mix_gain: reader.get_s(16)?,
        })
    }
}

/// Per-element rendering configuration inside a submix.
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    pub headphones_rendering_mode: u8,
    pub extension: Vec<u8>,
}

impl RenderingConfig {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let headphones_rendering_mode: u8 = reader.get_n(2)?;
        reader.skip_n(6)?;

        let extension_size = reader.get_uleb128()?;
        let extension = reader.get_bytes(extension_size as usize)?;

        Ok(Self {
            headphones_rendering_mode,
            extension,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubMixAudioElement {
    pub audio_element_id: u32,
    pub localized_annotations: Vec<String>,
    pub rendering_config: RenderingConfig,
    pub element_mix_gain: MixGainParamDefinition,
}

#[derive(Debug, Clone)]
pub struct SubMix {
    pub audio_elements: Vec<SubMixAudioElement>,
    pub output_mix_gain: MixGainParamDefinition,
    pub layouts: Vec<MixPresentationLayout>,
}

#[derive(Debug, Clone)]
pub struct MixPresentation {
    pub mix_presentation_id: u32,
    /// (language tag, localized annotation) pairs.
    pub annotations: Vec<(String, String)>,
    pub sub_mixes: Vec<SubMix>,
}

impl MixPresentation {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let mix_presentation_id = reader.get_uleb128()?;

        let count_label = reader.get_uleb128()?;
        let mut language_tags = Vec::with_capacity(count_label as usize);
        for _ in 0..count_label {
            language_tags.push(reader.get_string()?);
        }
        let mut annotations = Vec::with_capacity(count_label as usize);
        for tag in language_tags {
            annotations.push((tag, reader.get_string()?));
        }

        let num_sub_mixes = reader.get_uleb128()?;
        let mut sub_mixes = Vec::with_capacity(num_sub_mixes as usize);
        for _ in 0..num_sub_mixes {
            sub_mixes.push(Self::read_sub_mix(reader, annotations.len())?);
        }

        Ok(Self {
            mix_presentation_id,
            annotations,
            sub_mixes,
        })
    }

    fn read_sub_mix(reader: &mut BsIoSliceReader, count_label: usize) -> Result<SubMix> {
        let num_audio_elements = reader.get_uleb128()?;

        let mut audio_elements = Vec::with_capacity(num_audio_elements as usize);
        for _ in 0..num_audio_elements {
            let audio_element_id = reader.get_uleb128()?;

            let mut localized_annotations = Vec::with_capacity(count_label);
            for _ in 0..count_label {
                localized_annotations.push(reader.get_string()?);
            }

            audio_elements.push(SubMixAudioElement {
                audio_element_id,
                localized_annotations,
                rendering_config: RenderingConfig::read(reader)?,
                element_mix_gain: MixGainParamDefinition::read(reader)?,
            });
        }

        let output_mix_gain = MixGainParamDefinition::read(reader)?;

        let num_layouts = reader.get_uleb128()?;
        let mut layouts = Vec::with_capacity(num_layouts as usize);
        for _ in 0..num_layouts {
            layouts.push(MixPresentationLayout {
                layout: Layout::read(reader)?,
                loudness: LoudnessInfo::read(reader)?,
            });
        }

        Ok(SubMix {
            audio_elements,
            output_mix_gain,
            layouts,
        })
    }
}
