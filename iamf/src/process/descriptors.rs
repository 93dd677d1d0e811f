//! Descriptor accumulation, validation, profile filtering and mix selection.
//!
//! Descriptor OBUs arrive once at the head of an IA sequence. The store
//! accumulates them, seals on the first temporal-unit OBU, validates every
//! cross-reference, and builds the parameter index the temporal phase parses
//! parameter blocks against. Selection then picks the mix presentation,
//! submix and layout the renderer binds to.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use log::{debug, info};

use crate::api::{OutputLayout, ProfileVersion, RequestedMix};
use crate::structs::audio_element::{AudioElement, AudioElementParam, ElementConfig};
use crate::structs::codec_config::CodecConfig;
use crate::structs::mix_presentation::MixPresentation;
use crate::structs::obu::Obu;
use crate::structs::parameter_block::{ParamKind, ParamSpec, ReconLayerSpec};
use crate::structs::sequence_header::IaSequenceHeader;
use crate::utils::errors::{DescriptorError, ElementError};

/// Profile capability caps: (max audio elements, max channels) per submix.
const SIMPLE_PROFILE_CAPS: (usize, usize) = (1, 16);
const BASE_PROFILE_CAPS: (usize, usize) = (2, 18);
const BASE_ENHANCED_PROFILE_CAPS: (usize, usize) = (28, 28);

/// The sealed set of descriptor OBUs of one IA sequence.
#[derive(Debug, Default)]
pub struct Descriptors {
    pub sequence_header: Option<IaSequenceHeader>,
    pub codec_configs: HashMap<u32, CodecConfig>,
    /// Audio elements in bitstream order.
    pub audio_elements: Vec<AudioElement>,
    /// Mix presentations in bitstream order; the order drives selection.
    pub mix_presentations: Vec<MixPresentation>,
    /// Parameter id → declaration, built at seal time.
    pub param_specs: HashMap<u32, ParamSpec>,

    element_index: HashMap<u32, usize>,
    sealed: bool,
}

impl Descriptors {
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Accumulates one descriptor OBU.
    pub fn add(&mut self, obu: Obu) -> Result<()> {
        match obu {
            Obu::SequenceHeader(header) => {
                if self.sequence_header.is_some() {
                    bail!(crate::utils::errors::SequenceError::SequenceRestart);
                }
                self.sequence_header = Some(header);
            }
            Obu::CodecConfig(config) => {
                if self.sequence_header.is_none() {
                    bail!(DescriptorError::MissingSequenceHeader);
                }
                if self.codec_configs.contains_key(&config.codec_config_id) {
                    bail!(DescriptorError::DuplicateCodecConfigId(
                        config.codec_config_id
                    ));
                }
                self.codec_configs.insert(config.codec_config_id, config);
            }
            Obu::AudioElement(element) => {
                if self.sequence_header.is_none() {
                    bail!(DescriptorError::MissingSequenceHeader);
                }
                if self.element_index.contains_key(&element.audio_element_id) {
                    bail!(DescriptorError::DuplicateAudioElementId(
                        element.audio_element_id
                    ));
                }
                self.element_index
                    .insert(element.audio_element_id, self.audio_elements.len());
                self.audio_elements.push(element);
            }
            Obu::MixPresentation(mix) => {
                if self.sequence_header.is_none() {
                    bail!(DescriptorError::MissingSequenceHeader);
                }
                if self
                    .mix_presentations
                    .iter()
                    .any(|existing| existing.mix_presentation_id == mix.mix_presentation_id)
                {
                    bail!(DescriptorError::DuplicateMixPresentationId(
                        mix.mix_presentation_id
                    ));
                }
                self.mix_presentations.push(mix);
            }
            _ => unreachable!("only descriptor OBUs reach the store"),
        }

        Ok(())
    }

    /// Validates cross-references and freezes the store.
    pub fn seal(&mut self) -> Result<()> {
        if self.sequence_header.is_none() {
            bail!(DescriptorError::MissingSequenceHeader);
        }

        let mut seen_substreams = HashSet::new();
        for element in &self.audio_elements {
            let Some(codec_config) = self.codec_configs.get(&element.codec_config_id) else {
                bail!(DescriptorError::UnknownCodecConfig {
                    audio_element_id: element.audio_element_id,
                    codec_config_id: element.codec_config_id,
                });
            };

            for &substream_id in &element.audio_substream_ids {
                if !seen_substreams.insert(substream_id) {
                    bail!(DescriptorError::DuplicateSubstreamId(substream_id));
                }
            }

            // Recon gain rides exactly on lossy layers above the base.
            if let ElementConfig::Scalable(scalable) = &element.config {
                let lossless = codec_config.codec_id.is_lossless();
                for (index, layer) in scalable.layers.iter().enumerate().skip(1) {
                    if layer.recon_gain_is_present == lossless {
                        bail!(ElementError::SpuriousReconGain(index));
                    }
                }
            }
        }

        for mix in &self.mix_presentations {
            for sub_mix in &mix.sub_mixes {
                for sub_mix_element in &sub_mix.audio_elements {
                    if !self
                        .element_index
                        .contains_key(&sub_mix_element.audio_element_id)
                    {
                        bail!(DescriptorError::UnknownAudioElement {
                            mix_presentation_id: mix.mix_presentation_id,
                            audio_element_id: sub_mix_element.audio_element_id,
                        });
                    }
                }
            }
        }

        self.build_param_specs()?;
        self.sealed = true;

        debug!(
            "descriptors sealed: {} codec configs, {} audio elements, {} mix presentations",
            self.codec_configs.len(),
            self.audio_elements.len(),
            self.mix_presentations.len()
        );
        Ok(())
    }

    fn build_param_specs(&mut self) -> Result<()> {
        let mut specs: HashMap<u32, ParamSpec> = HashMap::new();

        let mut insert = |id: u32, spec: ParamSpec| -> Result<()> {
            if let Some(existing) = specs.get(&id) {
                let same_kind = matches!(
                    (&existing.kind, &spec.kind),
                    (ParamKind::MixGain, ParamKind::MixGain)
                        | (ParamKind::Demixing, ParamKind::Demixing)
                        | (ParamKind::ReconGain(_), ParamKind::ReconGain(_))
                        | (ParamKind::Extension, ParamKind::Extension)
                );
                if !same_kind {
                    bail!(DescriptorError::ConflictingParameterDefinition(id));
                }
                return Ok(());
            }
            specs.insert(id, spec);
            Ok(())
        };

        for element in &self.audio_elements {
            let recon_layers: Vec<ReconLayerSpec> = match &element.config {
                ElementConfig::Scalable(scalable) => scalable
                    .layers
                    .iter()
                    .map(|layer| ReconLayerSpec {
                        layout: layer.loudspeaker_layout,
                        recon_gain_is_present: layer.recon_gain_is_present,
                    })
                    .collect(),
                _ => vec![],
            };

            for param in &element.params {
                match param {
                    AudioElementParam::Demixing(demixing) => insert(
                        demixing.base.parameter_id,
                        ParamSpec {
                            kind: ParamKind::Demixing,
                            definition: demixing.base.clone(),
                        },
                    )?,
                    AudioElementParam::ReconGain(recon) => insert(
                        recon.base.parameter_id,
                        ParamSpec {
                            kind: ParamKind::ReconGain(recon_layers.clone()),
                            definition: recon.base.clone(),
                        },
                    )?,
                    AudioElementParam::Extension { .. } => {}
                }
            }
        }

        for mix in &self.mix_presentations {
            for sub_mix in &mix.sub_mixes {
                for sub_mix_element in &sub_mix.audio_elements {
                    insert(
                        sub_mix_element.element_mix_gain.base.parameter_id,
                        ParamSpec {
                            kind: ParamKind::MixGain,
                            definition: sub_mix_element.element_mix_gain.base.clone(),
                        },
                    )?;
                }
                insert(
                    sub_mix.output_mix_gain.base.parameter_id,
                    ParamSpec {
                        kind: ParamKind::MixGain,
                        definition: sub_mix.output_mix_gain.base.clone(),
                    },
                )?;
            }
        }

        self.param_specs = specs;
        Ok(())
    }

    pub fn audio_element(&self, audio_element_id: u32) -> Option<&AudioElement> {
        self.element_index
            .get(&audio_element_id)
            .map(|&index| &self.audio_elements[index])
    }

    pub fn codec_config_for(&self, element: &AudioElement) -> Option<&CodecConfig> {
        self.codec_configs.get(&element.codec_config_id)
    }
}

/// Profiles out of `candidates` able to carry the given submix shape.
fn profiles_supporting(
    candidates: &[ProfileVersion],
    num_sub_mixes: usize,
    num_audio_elements: usize,
    num_channels: usize,
) -> Vec<ProfileVersion> {
    if num_sub_mixes > 1 {
        return vec![];
    }

    candidates
        .iter()
        .copied()
        .filter(|profile| {
            let (max_elements, max_channels) = match profile {
                ProfileVersion::Simple => SIMPLE_PROFILE_CAPS,
                ProfileVersion::Base => BASE_PROFILE_CAPS,
                ProfileVersion::BaseEnhanced => BASE_ENHANCED_PROFILE_CAPS,
                ProfileVersion::Reserved(_) => return false,
            };
            num_audio_elements <= max_elements && num_channels <= max_channels
        })
        .collect()
}

/// Indices of mix presentations playable under some requested profile.
///
/// The candidate set is first pruned to the profiles the IA Sequence Header
/// names; a mix survives when its widest submix fits a surviving profile.
pub fn playable_mixes(
    descriptors: &Descriptors,
    requested: &[ProfileVersion],
) -> Result<Vec<usize>> {
    if requested.is_empty() {
        bail!(DescriptorError::NoRequestedProfiles);
    }
    if requested
        .iter()
        .any(|profile| matches!(profile, ProfileVersion::Reserved(_)))
    {
        bail!(DescriptorError::ReservedProfileRequested);
    }

    let header = descriptors
        .sequence_header
        .as_ref()
        .expect("descriptors are sealed");
    let stream_profiles = [header.primary_profile, header.additional_profile];
    let candidates: Vec<ProfileVersion> = requested
        .iter()
        .copied()
        .filter(|profile| stream_profiles.contains(profile))
        .collect();

    let mut playable = Vec::new();
    let mut widest = (0usize, 0usize);

    for (index, mix) in descriptors.mix_presentations.iter().enumerate() {
        let mut num_audio_elements = 0usize;
        let mut num_channels = 0usize;
        for sub_mix in &mix.sub_mixes {
            for sub_mix_element in &sub_mix.audio_elements {
                num_audio_elements += 1;
                if let Some(element) = descriptors.audio_element(sub_mix_element.audio_element_id)
                {
                    num_channels += element.channel_count();
                }
            }
        }
        widest = (widest.0.max(num_audio_elements), widest.1.max(num_channels));

        let supported = profiles_supporting(
            &candidates,
            mix.sub_mixes.len(),
            num_audio_elements,
            num_channels,
        );
        if !supported.is_empty() {
            playable.push(index);
        }
    }

    if playable.is_empty() {
        bail!(DescriptorError::NoMatchingProfile {
            mix_presentations: descriptors.mix_presentations.len(),
            audio_elements: widest.0,
            channels: widest.1,
        });
    }

    Ok(playable)
}

/// The mix presentation, submix and layout the pipeline binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixSelection {
    pub mix_presentation_id: u32,
    pub mix_index: usize,
    pub sub_mix_index: usize,
    pub layout_index: usize,
    pub output_layout: OutputLayout,
}

/// Chooses a submix layout satisfying the request, with fallbacks.
///
/// A requested mix presentation id is tried first when playable; otherwise
/// mixes are scanned in bitstream order for an exact layout match, and
/// failing that the first playable layout wins.
pub fn select_mix(
    descriptors: &Descriptors,
    requested_mix: Option<RequestedMix>,
    requested_layout: OutputLayout,
    playable: &[usize],
) -> Result<MixSelection> {
    let requested_layout = requested_mix
        .and_then(|mix| mix.output_layout)
        .unwrap_or(requested_layout);

    let mut ordered: Vec<usize> = playable.to_vec();
    if let Some(requested_id) = requested_mix.and_then(|mix| mix.mix_presentation_id) {
        if let Some(position) = ordered.iter().position(|&index| {
            descriptors.mix_presentations[index].mix_presentation_id == requested_id
        }) {
            let preferred = ordered.remove(position);
            ordered.insert(0, preferred);
        }
    }

    // Exact layout match first.
    for &mix_index in &ordered {
        let mix = &descriptors.mix_presentations[mix_index];
        for (sub_mix_index, sub_mix) in mix.sub_mixes.iter().enumerate() {
            for (layout_index, entry) in sub_mix.layouts.iter().enumerate() {
                if entry.layout.output_layout() == Some(requested_layout) {
                    return Ok(MixSelection {
                        mix_presentation_id: mix.mix_presentation_id,
                        mix_index,
                        sub_mix_index,
                        layout_index,
                        output_layout: requested_layout,
                    });
                }
            }
        }
    }

    // Fall back to the first playable layout in bitstream order.
    for &mix_index in &ordered {
        let mix = &descriptors.mix_presentations[mix_index];
        for (sub_mix_index, sub_mix) in mix.sub_mixes.iter().enumerate() {
            for (layout_index, entry) in sub_mix.layouts.iter().enumerate() {
                if let Some(output_layout) = entry.layout.output_layout() {
                    info!(
                        "requested layout {requested_layout} unavailable, falling back to {output_layout} from mix {}",
                        mix.mix_presentation_id
                    );
                    return Ok(MixSelection {
                        mix_presentation_id: mix.mix_presentation_id,
                        mix_index,
                        sub_mix_index,
                        layout_index,
                        output_layout,
                    });
                }
            }
        }
    }

    bail!(DescriptorError::NoPlayableMix {
        requested: requested_layout.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::audio_element::AudioElement;
    use crate::utils::bitstream_io::BsIoSliceReader;

    fn sealed_stereo_descriptors() -> Descriptors {
        let mut descriptors = Descriptors::default();
        descriptors
            .add(Obu::SequenceHeader(
                IaSequenceHeader::read(&mut BsIoSliceReader::from_slice(&[
                    b'i', b'a', b'm', b'f', 0, 1,
                ]))
                .unwrap(),
            ))
            .unwrap();

        let codec_bytes: Vec<u8> = {
            let mut bytes = vec![0x01];
            bytes.extend(b"ipcm");
            bytes.extend([0x08, 0x00, 0x00, 0x01, 16]);
            bytes.extend(48_000u32.to_be_bytes());
            bytes
        };
        descriptors
            .add(Obu::CodecConfig(
                CodecConfig::read(&mut BsIoSliceReader::from_slice(&codec_bytes)).unwrap(),
            ))
            .unwrap();

        let element_bytes = vec![
            0x02, 0x00, 0x01, 0x01, 0x12, 0x00, 0b001_00000, 0b0001_0000, 0x01, 0x01,
        ];
        descriptors
            .add(Obu::AudioElement(
                AudioElement::read(&mut BsIoSliceReader::from_slice(&element_bytes)).unwrap(),
            ))
            .unwrap();

        let mix_bytes = crate::structs::mix_presentation::tests::stereo_mix_bytes(3, 2);
        descriptors
            .add(Obu::MixPresentation(
                MixPresentation::read(&mut BsIoSliceReader::from_slice(&mix_bytes)).unwrap(),
            ))
            .unwrap();

        descriptors.seal().unwrap();
        descriptors
    }

    #[test]
    fn seal_builds_param_specs() {
        let descriptors = sealed_stereo_descriptors();
        assert!(descriptors.is_sealed());
        // Element and output mix gains from the submix.
        assert_eq!(descriptors.param_specs.len(), 2);
        assert!(descriptors.param_specs.contains_key(&100));
        assert!(descriptors.param_specs.contains_key(&101));
    }

    #[test]
    fn unknown_element_reference_fails_seal() {
        let mut descriptors = Descriptors::default();
        descriptors
            .add(Obu::SequenceHeader(
                IaSequenceHeader::read(&mut BsIoSliceReader::from_slice(&[
                    b'i', b'a', b'm', b'f', 0, 1,
                ]))
                .unwrap(),
            ))
            .unwrap();

        let mix_bytes = crate::structs::mix_presentation::tests::stereo_mix_bytes(3, 9);
        descriptors
            .add(Obu::MixPresentation(
                MixPresentation::read(&mut BsIoSliceReader::from_slice(&mix_bytes)).unwrap(),
            ))
            .unwrap();

        assert!(descriptors.seal().is_err());
    }

    #[test]
    fn profile_filter_keeps_stereo_for_simple() -> Result<()> {
        let descriptors = sealed_stereo_descriptors();
        let playable = playable_mixes(&descriptors, &[ProfileVersion::Simple])?;
        assert_eq!(playable, vec![0]);
        Ok(())
    }

    #[test]
    fn profile_filter_rejects_empty_request() {
        let descriptors = sealed_stereo_descriptors();
        assert!(playable_mixes(&descriptors, &[]).is_err());
        assert!(playable_mixes(&descriptors, &[ProfileVersion::Reserved(255)]).is_err());
    }

    #[test]
    fn channel_caps_prune_profiles() {
        assert!(profiles_supporting(&[ProfileVersion::Simple], 1, 1, 25).is_empty());
        assert_eq!(
            profiles_supporting(&[ProfileVersion::BaseEnhanced], 1, 1, 25),
            vec![ProfileVersion::BaseEnhanced]
        );
        assert!(profiles_supporting(&[ProfileVersion::BaseEnhanced], 2, 1, 2).is_empty());
        assert_eq!(
            profiles_supporting(&[ProfileVersion::Base], 1, 2, 18),
            vec![ProfileVersion::Base]
        );
        assert!(profiles_supporting(&[ProfileVersion::Base], 1, 3, 18).is_empty());
    }

    #[test]
    fn selects_exact_layout() -> Result<()> {
        let descriptors = sealed_stereo_descriptors();
        let selection = select_mix(
            &descriptors,
            None,
            OutputLayout::SoundSystemA0_2_0,
            &[0],
        )?;

        assert_eq!(selection.mix_presentation_id, 3);
        assert_eq!(selection.output_layout, OutputLayout::SoundSystemA0_2_0);
        Ok(())
    }

    #[test]
    fn falls_back_to_first_playable_layout() -> Result<()> {
        let descriptors = sealed_stereo_descriptors();
        let selection = select_mix(
            &descriptors,
            None,
            OutputLayout::SoundSystemJ4_7_0,
            &[0],
        )?;

        // Only a stereo layout exists; selection falls back to it.
        assert_eq!(selection.output_layout, OutputLayout::SoundSystemA0_2_0);
        Ok(())
    }
}
