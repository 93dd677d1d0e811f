//! Channel demixing and ambisonics reconstruction.
//!
//! ## Demixers
//!
//! Scalable channel audio transmits lower layers as down-mixes of the full
//! layout. Each [`DemixStage`] is a pure function over labeled samples: it
//! reads authored (or previously demixed) channels and appends the demixed
//! channels of the next layer, never overwriting authored ones. The stage
//! chain of an element runs bottom layer to top.
//!
//! ## Parameters
//!
//! The stages take their weights from the active demixing parameter subblock;
//! `dmixp_mode` selects the (α, β, γ, δ) row and steps the `w` index.
//!
//! ## Ambisonics
//!
//! Scene-based elements need no demixers: mono mode maps substreams onto ACN
//! slots directly, projection mode multiplies the decoded substreams by the
//! stored demixing matrix.

use std::collections::HashMap;

use anyhow::{Result, bail};
use log::debug;

use crate::process::codec::{CodecDecoder, CodecDecoderFactory};
use crate::structs::audio_element::{
    AMBISONICS_INACTIVE, AmbisonicsConfig, AudioElement, ChannelAudioLayerConfig, ElementConfig,
};
use crate::structs::audio_frame::AudioFrameObu;
use crate::structs::channel::{ChannelLabel, LoudspeakerLayout, layer_step};
use crate::structs::codec_config::CodecConfig;
use crate::structs::parameter_block::{
    DemixingInfoParameterData, ReconGainInfoParameterData, q7_8_to_linear,
};
use crate::utils::errors::DemixError;

/// `w` values selected by the clamped w index.
pub const W_TABLE: [f64; 11] = [
    0.0, 0.0179, 0.0391, 0.0658, 0.1038, 0.25, 0.3962, 0.4342, 0.4609, 0.4821, 0.5,
];

/// Demixing weights active for one temporal unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownMixParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub w: f64,
}

/// (α, β, γ, δ, w index offset) per `dmixp_mode`; reserved rows are `None`.
const DMIXP_TABLE: [Option<(f64, f64, f64, f64, i8)>; 8] = [
    Some((1.0, 1.0, 0.707, 0.707, -1)),
    Some((0.707, 0.707, 0.707, 0.707, -1)),
    Some((1.0, 0.866, 0.866, 0.866, -1)),
    None,
    Some((1.0, 1.0, 0.707, 0.707, 1)),
    Some((0.707, 0.707, 0.707, 0.707, 1)),
    Some((1.0, 0.866, 0.866, 0.866, 1)),
    None,
];

/// Steps the `w` index by the mode's offset, clamped to the table.
pub fn advance_w_idx(w_idx: u8, dmixp_mode: u8) -> u8 {
    let offset = DMIXP_TABLE[dmixp_mode as usize & 7]
        .map(|row| row.4)
        .unwrap_or(0);
    (w_idx as i16 + offset as i16).clamp(0, W_TABLE.len() as i16 - 1) as u8
}

/// Builds the weights for one unit from a mode and the current `w` index.
pub fn params_from_mode(dmixp_mode: u8, w_idx: u8) -> DownMixParams {
    let (alpha, beta, gamma, delta, _) =
        DMIXP_TABLE[dmixp_mode as usize & 7].unwrap_or((1.0, 1.0, 0.707, 0.707, 0));

    DownMixParams {
        alpha,
        beta,
        gamma,
        delta,
        w: W_TABLE[(w_idx as usize).min(W_TABLE.len() - 1)],
    }
}

/// Dense per-label sample storage for one element and temporal unit.
#[derive(Debug, Default)]
pub struct LabelMap {
    channels: Vec<Option<Vec<f64>>>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self {
            channels: (0..ChannelLabel::COUNT).map(|_| None).collect(),
        }
    }

    pub fn set(&mut self, label: ChannelLabel, samples: Vec<f64>) -> Result<()> {
        let slot = &mut self.channels[label.index()];
        if slot.is_some() {
            bail!(DemixError::LabelOverwrite(label.name()));
        }
        *slot = Some(samples);
        Ok(())
    }

    pub fn get(&self, label: ChannelLabel) -> Option<&[f64]> {
        self.channels[label.index()].as_deref()
    }

    /// The authored samples of a label, falling back to its demixed variant.
    pub fn resolve(&self, label: ChannelLabel) -> Option<&[f64]> {
        self.get(label)
            .or_else(|| label.demixed().and_then(|demixed| self.get(demixed)))
    }

    pub fn scale(&mut self, label: ChannelLabel, gain: f64) {
        if let Some(samples) = &mut self.channels[label.index()] {
            for sample in samples {
                *sample *= gain;
            }
        }
    }

    fn resolve_or_err(&self, label: ChannelLabel) -> Result<&[f64]> {
        self.resolve(label)
            .ok_or_else(|| DemixError::MissingSourceLabel(label.name()).into())
    }
}

/// One transition of the scalable layering lattice, decoder side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DemixStage {
    S1ToS2,
    S2ToS3,
    S3ToS5,
    S5ToS7,
    Tf2ToT2,
    T2ToT4,
}

impl DemixStage {
    /// Runs the stage, appending its demixed labels.
    pub fn apply(self, map: &mut LabelMap, params: &DownMixParams) -> Result<()> {
        use ChannelLabel::*;
        use std::f64::consts::FRAC_1_SQRT_2;

        match self {
            Self::S1ToS2 => {
                let mono = map.resolve_or_err(Mono)?;
                let l2 = map.resolve_or_err(L2)?;
                let r2 = zip_map(mono, l2, |m, l| 2.0 * m - l);
                map.set(DemixedR2, r2)?;
            }
            Self::S2ToS3 => {
                let centre = map.resolve_or_err(Centre)?;
                let l3 = zip_map(map.resolve_or_err(L2)?, centre, |l, c| {
                    l - FRAC_1_SQRT_2 * c
                });
                let r3 = zip_map(map.resolve_or_err(R2)?, centre, |r, c| {
                    r - FRAC_1_SQRT_2 * c
                });
                map.set(DemixedL3, l3)?;
                map.set(DemixedR3, r3)?;
            }
            Self::S3ToS5 => {
                let delta = nonzero(params.delta, "delta")?;
                let ls5 = zip_map(map.resolve_or_err(L3)?, map.resolve_or_err(L5)?, |l3, l5| {
                    (l3 - l5) / delta
                });
                let rs5 = zip_map(map.resolve_or_err(R3)?, map.resolve_or_err(R5)?, |r3, r5| {
                    (r3 - r5) / delta
                });
                map.set(DemixedLs5, ls5)?;
                map.set(DemixedRs5, rs5)?;
            }
            Self::S5ToS7 => {
                let beta = nonzero(params.beta, "beta")?;
                let alpha = params.alpha;

                let l7 = map.resolve_or_err(L5)?.to_vec();
                let r7 = map.resolve_or_err(R5)?.to_vec();
                map.set(DemixedL7, l7)?;
                map.set(DemixedR7, r7)?;

                let lrs7 = zip_map(
                    map.resolve_or_err(Ls5)?,
                    map.resolve_or_err(Lss7)?,
                    |ls, lss| (ls - alpha * lss) / beta,
                );
                let rrs7 = zip_map(
                    map.resolve_or_err(Rs5)?,
                    map.resolve_or_err(Rss7)?,
                    |rs, rss| (rs - alpha * rss) / beta,
                );
                map.set(DemixedLrs7, lrs7)?;
                map.set(DemixedRrs7, rrs7)?;
            }
            Self::Tf2ToT2 => {
                let w = params.w;
                let ltf2 = zip_map3(
                    map.resolve_or_err(Ltf3)?,
                    map.resolve_or_err(L3)?,
                    map.resolve_or_err(L5)?,
                    |ltf3, l3, l5| ltf3 - w * (l3 - l5),
                );
                let rtf2 = zip_map3(
                    map.resolve_or_err(Rtf3)?,
                    map.resolve_or_err(R3)?,
                    map.resolve_or_err(R5)?,
                    |rtf3, r3, r5| rtf3 - w * (r3 - r5),
                );
                map.set(DemixedLtf2, ltf2)?;
                map.set(DemixedRtf2, rtf2)?;
            }
            Self::T2ToT4 => {
                let gamma = nonzero(params.gamma, "gamma")?;
                let ltb4 = zip_map(
                    map.resolve_or_err(Ltf2)?,
                    map.resolve_or_err(Ltf4)?,
                    |ltf2, ltf4| (ltf2 - ltf4) / gamma,
                );
                let rtb4 = zip_map(
                    map.resolve_or_err(Rtf2)?,
                    map.resolve_or_err(Rtf4)?,
                    |rtf2, rtf4| (rtf2 - rtf4) / gamma,
                );
                map.set(DemixedLtb4, ltb4)?;
                map.set(DemixedRtb4, rtb4)?;
            }
        }

        Ok(())
    }
}

fn zip_map(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

fn zip_map3(a: &[f64], b: &[f64], c: &[f64], f: impl Fn(f64, f64, f64) -> f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .zip(c)
        .map(|((&x, &y), &z)| f(x, y, z))
        .collect()
}

fn nonzero(value: f64, name: &'static str) -> Result<f64> {
    if value.abs() < 1e-12 {
        bail!(DemixError::DegenerateParameter { name, value });
    }
    Ok(value)
}

/// The demix stages needed to raise an element's layer list to its top layout.
pub fn stages_for_layers(layers: &[ChannelAudioLayerConfig]) -> Vec<DemixStage> {
    let mut stages = Vec::new();

    for window in layers.windows(2) {
        let (prev_s, _, prev_h) = window[0].loudspeaker_layout.axes();
        let (cur_s, _, cur_h) = window[1].loudspeaker_layout.axes();

        let mut s = prev_s;
        while s < cur_s {
            stages.push(match s {
                1 => DemixStage::S1ToS2,
                2 => DemixStage::S2ToS3,
                3 => DemixStage::S3ToS5,
                _ => DemixStage::S5ToS7,
            });
            s = match s {
                1 => 2,
                2 => 3,
                3 => 5,
                _ => 7,
            };
        }

        // A 3.1.2 base authors Ltf3; raising the surround level converts its
        // tops into Ltf2/Rtf2.
        if prev_s == 3 && cur_s > 3 && prev_h == 2 {
            stages.push(DemixStage::Tf2ToT2);
        }

        if prev_h == 2 && cur_h == 4 {
            stages.push(DemixStage::T2ToT4);
        }
    }

    stages.sort();
    stages.dedup();
    stages
}

/// Channel identity of one demixed element, as the renderer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChannels {
    Channel(LoudspeakerLayout),
    Ambisonics(usize),
}

/// The demixer output for one audio element at one timestamp.
#[derive(Debug)]
pub struct LabeledFrame {
    pub source: SourceChannels,
    pub map: LabelMap,
    pub num_samples: usize,
}

#[derive(Debug, Clone)]
struct ScalableSlot {
    labels: Vec<ChannelLabel>,
    layer: usize,
}

enum GraphKind {
    Scalable {
        slots: Vec<ScalableSlot>,
        stages: Vec<DemixStage>,
        /// (flags, linear gain) per layer when output gain is present.
        layer_gains: Vec<Option<(u8, f64)>>,
        top_layout: LoudspeakerLayout,
        default_dmixp_mode: u8,
        default_w: u8,
        w_idx: u8,
    },
    AmbisonicsMono {
        channel_mapping: Vec<u8>,
    },
    AmbisonicsProjection {
        /// Row-major Q15 matrix scaled to f64, rows × columns.
        matrix: Vec<f64>,
        rows: usize,
        columns: usize,
        coupled: usize,
    },
}

/// The decode-and-demix chain of one audio element.
pub struct DemixGraph {
    pub audio_element_id: u32,
    pub frame_length: u32,
    substream_ids: Vec<u32>,
    decoders: Vec<Box<dyn CodecDecoder>>,
    kind: GraphKind,
}

impl DemixGraph {
    /// Builds the graph, binding one codec decoder per substream.
    pub fn build(
        element: &AudioElement,
        codec_config: &CodecConfig,
        factory: &dyn CodecDecoderFactory,
    ) -> Result<Self> {
        let substream_ids = element.audio_substream_ids.clone();
        let mut decoders = Vec::with_capacity(substream_ids.len());
        for _ in &substream_ids {
            decoders.push(factory.decoder_for(codec_config)?);
        }

        let kind = match &element.config {
            ElementConfig::Scalable(scalable) => {
                if scalable
                    .layers
                    .iter()
                    .any(|layer| layer.loudspeaker_layout == LoudspeakerLayout::Expanded)
                {
                    bail!(crate::utils::errors::DecodeError::Unimplemented(
                        "expanded loudspeaker layouts"
                    ));
                }

                let mut slots = Vec::with_capacity(substream_ids.len());
                let mut layer_gains = Vec::with_capacity(scalable.layers.len());
                let mut previous = None;

                for (layer_index, layer) in scalable.layers.iter().enumerate() {
                    let step = layer_step(layer_index, previous, layer.loudspeaker_layout)?;
                    for (left, right) in step.coupled {
                        slots.push(ScalableSlot {
                            labels: vec![left, right],
                            layer: layer_index,
                        });
                    }
                    for label in step.singles {
                        slots.push(ScalableSlot {
                            labels: vec![label],
                            layer: layer_index,
                        });
                    }

                    layer_gains.push(
                        layer
                            .output_gain_is_present
                            .then(|| (layer.output_gain_flags, q7_8_to_linear(layer.output_gain))),
                    );
                    previous = Some(layer.loudspeaker_layout);
                }

                let (default_dmixp_mode, default_w) = element
                    .demixing_param()
                    .map(|demixing| (demixing.default_dmixp_mode, demixing.default_w))
                    .unwrap_or((0, 0));

                GraphKind::Scalable {
                    stages: stages_for_layers(&scalable.layers),
                    slots,
                    layer_gains,
                    top_layout: scalable.top_layout(),
                    default_dmixp_mode,
                    default_w,
                    w_idx: default_w,
                }
            }
            ElementConfig::Ambisonics(AmbisonicsConfig::Mono(mono)) => GraphKind::AmbisonicsMono {
                channel_mapping: mono.channel_mapping.clone(),
            },
            ElementConfig::Ambisonics(AmbisonicsConfig::Projection(projection)) => {
                let rows = projection.decoded_channel_count();
                let columns = projection.output_channel_count as usize;
                GraphKind::AmbisonicsProjection {
                    matrix: projection
                        .demixing_matrix
                        .iter()
                        .map(|&q15| q15 as f64 / 32768.0)
                        .collect(),
                    rows,
                    columns,
                    coupled: projection.coupled_substream_count as usize,
                }
            }
            ElementConfig::Extension(_) => {
                bail!(crate::utils::errors::DecodeError::Unimplemented(
                    "reserved audio element types"
                ))
            }
        };

        Ok(Self {
            audio_element_id: element.audio_element_id,
            frame_length: codec_config.num_samples_per_frame,
            substream_ids,
            decoders,
            kind,
        })
    }

    pub fn substream_ids(&self) -> &[u32] {
        &self.substream_ids
    }

    /// Decodes the unit's frames and reconstructs the element's top layer.
    pub fn demix(
        &mut self,
        frames: &HashMap<u32, AudioFrameObu>,
        demixing: Option<&DemixingInfoParameterData>,
        recon_gain: Option<&ReconGainInfoParameterData>,
    ) -> Result<LabeledFrame> {
        let mut decoded = Vec::with_capacity(self.substream_ids.len());
        let mut num_samples = None;

        for (index, &substream_id) in self.substream_ids.iter().enumerate() {
            let Some(frame) = frames.get(&substream_id) else {
                bail!(DemixError::MissingFrame(substream_id));
            };

            let num_channels = match &self.kind {
                GraphKind::Scalable { slots, .. } => slots[index].labels.len(),
                GraphKind::AmbisonicsMono { .. } => 1,
                GraphKind::AmbisonicsProjection { coupled, .. } => {
                    if index < *coupled {
                        2
                    } else {
                        1
                    }
                }
            };

            let channels = self.decoders[index].decode_frame(num_channels, &frame.payload)?;
            if channels.len() != num_channels {
                bail!(DemixError::ChannelCountMismatch {
                    substream_id,
                    channels: channels.len(),
                    expected: num_channels,
                });
            }

            let len = channels.first().map(|c| c.len()).unwrap_or(0);
            match num_samples {
                None => num_samples = Some(len),
                Some(expected) if expected != len => {
                    bail!(DemixError::SampleCountMismatch {
                        substream_id,
                        samples: len,
                        expected,
                    });
                }
                _ => {}
            }

            decoded.push(channels);
        }

        let num_samples = num_samples.unwrap_or(self.frame_length as usize);

        match &mut self.kind {
            GraphKind::Scalable {
                slots,
                stages,
                layer_gains,
                top_layout,
                default_dmixp_mode,
                default_w,
                w_idx,
            } => {
                let mut map = LabelMap::new();

                for (slot, channels) in slots.iter().zip(decoded) {
                    let gain = layer_gains[slot.layer];
                    for (label, mut samples) in slot.labels.iter().copied().zip(channels) {
                        if let Some((flags, linear)) = gain {
                            if output_gain_applies(flags, label) {
                                for sample in &mut samples {
                                    *sample *= linear;
                                }
                            }
                        }
                        map.set(label, samples)?;
                    }
                }

                let params = match demixing {
                    Some(info) => {
                        *w_idx = advance_w_idx(*w_idx, info.dmixp_mode);
                        params_from_mode(info.dmixp_mode, *w_idx)
                    }
                    None => params_from_mode(*default_dmixp_mode, *default_w),
                };

                for stage in stages.iter() {
                    stage.apply(&mut map, &params)?;
                }

                if let Some(recon_gain) = recon_gain {
                    apply_recon_gain(&mut map, recon_gain);
                }

                Ok(LabeledFrame {
                    source: SourceChannels::Channel(*top_layout),
                    map,
                    num_samples,
                })
            }
            GraphKind::AmbisonicsMono { channel_mapping } => {
                let mut map = LabelMap::new();

                for (acn, &mapping) in channel_mapping.iter().enumerate() {
                    let label = ChannelLabel::from_ambisonics_channel_number(acn)
                        .expect("mapping length is bounded at parse time");
                    let samples = if mapping == AMBISONICS_INACTIVE {
                        vec![0.0; num_samples]
                    } else {
                        decoded[mapping as usize][0].clone()
                    };
                    map.set(label, samples)?;
                }

                Ok(LabeledFrame {
                    source: SourceChannels::Ambisonics(channel_mapping.len()),
                    map,
                    num_samples,
                })
            }
            GraphKind::AmbisonicsProjection {
                matrix,
                rows,
                columns,
                ..
            } => {
                let mut map = LabelMap::new();

                let flat: Vec<&[f64]> = decoded
                    .iter()
                    .flat_map(|channels| channels.iter().map(|c| c.as_slice()))
                    .collect();
                debug!(
                    "projection demix: {} decoded rows into {} ambisonics channels",
                    flat.len(),
                    columns
                );

                for column in 0..*columns {
                    let label = ChannelLabel::from_ambisonics_channel_number(column)
                        .expect("column count is bounded at parse time");

                    let mut samples = vec![0.0; num_samples];
                    for (row, row_samples) in flat.iter().enumerate().take(*rows) {
                        let weight = matrix[row * *columns + column];
                        for (out, &sample) in samples.iter_mut().zip(row_samples.iter()) {
                            *out += weight * sample;
                        }
                    }
                    map.set(label, samples)?;
                }

                Ok(LabeledFrame {
                    source: SourceChannels::Ambisonics(*columns),
                    map,
                    num_samples,
                })
            }
        }
    }
}

/// Whether an output gain flag mask covers a channel label.
fn output_gain_applies(flags: u8, label: ChannelLabel) -> bool {
    use ChannelLabel::*;
    let bit = match label {
        Mono | L2 | L3 | L5 | L7 => 5,
        R2 | R3 | R5 | R7 => 4,
        Ls5 | Lss7 | Lrs7 => 3,
        Rs5 | Rss7 | Rrs7 => 2,
        Ltf2 | Ltf3 | Ltf4 | Ltb4 => 1,
        Rtf2 | Rtf3 | Rtf4 | Rtb4 => 0,
        _ => return false,
    };
    flags >> bit & 1 != 0
}

/// Demixed labels addressed by each recon gain flag bit.
const RECON_GAIN_TARGETS: [&[ChannelLabel]; 12] = {
    use ChannelLabel::*;
    [
        &[DemixedL3, DemixedL7],
        &[],
        &[DemixedR2, DemixedR3, DemixedR7],
        &[DemixedLs5],
        &[DemixedRs5],
        &[DemixedLtf2],
        &[DemixedRtf2],
        &[DemixedLrs7],
        &[DemixedRrs7],
        &[DemixedLtb4],
        &[DemixedRtb4],
        &[],
    ]
};

/// Scales the demixed channels of lossy layers by their recon gains.
fn apply_recon_gain(map: &mut LabelMap, recon_gain: &ReconGainInfoParameterData) {
    for element in recon_gain.layers.iter().flatten() {
        let mut value_index = 0;
        for (bit, targets) in RECON_GAIN_TARGETS.iter().enumerate() {
            if element.recon_gain_flag >> bit & 1 == 0 {
                continue;
            }
            let gain = element.recon_gains[value_index] as f64 / 255.0;
            value_index += 1;

            for &label in *targets {
                map.scale(label, gain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::codec::BuiltinCodecFactory;
    use crate::utils::bitstream_io::BsIoSliceReader;

    fn lpcm_config(num_samples_per_frame: u32) -> CodecConfig {
        let mut bytes = vec![0x01];
        bytes.extend(b"ipcm");
        bytes.push(num_samples_per_frame as u8);
        bytes.extend([0x00, 0x00, 0x01, 16]);
        bytes.extend(48_000u32.to_be_bytes());
        CodecConfig::read(&mut BsIoSliceReader::from_slice(&bytes)).unwrap()
    }

    fn frame(substream_id: u32, samples: &[i16]) -> AudioFrameObu {
        AudioFrameObu {
            substream_id,
            samples_to_trim_at_start: 0,
            samples_to_trim_at_end: 0,
            payload: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }

    #[test]
    fn dmixp_table_rows() {
        let params = params_from_mode(2, 5);
        assert_eq!(params.alpha, 1.0);
        assert_eq!(params.beta, 0.866);
        assert_eq!(params.w, 0.25);

        assert_eq!(advance_w_idx(5, 0), 4);
        assert_eq!(advance_w_idx(0, 1), 0);
        assert_eq!(advance_w_idx(10, 4), 10);
    }

    #[test]
    fn mono_to_stereo_demix() -> Result<()> {
        // Two-layer {Mono, Stereo} element over LPCM.
        let element_bytes = vec![
            0x02, 0x00, 0x01, 0x02, 0x00, 0x01, 0x00, // ids 0 and 1
            0b010_00000, // num_layers = 2
            0b0000_0000, 0x01, 0x00, // layer 0: mono
            0b0001_0000, 0x01, 0x00, // layer 1: stereo, one single substream
        ];
        let element =
            crate::structs::audio_element::AudioElement::read(&mut BsIoSliceReader::from_slice(
                &element_bytes,
            ))?;

        let mut graph = DemixGraph::build(&element, &lpcm_config(1), &BuiltinCodecFactory)?;
        assert_eq!(graph.substream_ids(), &[0, 1]);

        let mut frames = HashMap::new();
        frames.insert(0, frame(0, &[750]));
        frames.insert(1, frame(1, &[1000]));

        let labeled = graph.demix(&frames, None, None)?;
        assert_eq!(
            labeled.source,
            SourceChannels::Channel(LoudspeakerLayout::Stereo)
        );

        let l2 = labeled.map.resolve(ChannelLabel::L2).unwrap();
        let r2 = labeled.map.resolve(ChannelLabel::R2).unwrap();
        assert!((l2[0] - 1000.0 / 32768.0).abs() < 1e-12);
        // R2 = 2 * Mono - L2 = 2 * 750 - 1000 = 500.
        assert!((r2[0] - 500.0 / 32768.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn stage_chain_for_stereo_to_7_1_4() {
        use crate::structs::channel::LoudspeakerLayout::*;

        let layer = |layout| ChannelAudioLayerConfig {
            loudspeaker_layout: layout,
            output_gain_is_present: false,
            recon_gain_is_present: false,
            substream_count: 0,
            coupled_substream_count: 0,
            output_gain_flags: 0,
            output_gain: 0,
            expanded_loudspeaker_layout: None,
        };

        let stages = stages_for_layers(&[layer(Stereo), layer(Surround5_1), layer(Surround7_1_4)]);
        assert_eq!(
            stages,
            vec![
                DemixStage::S2ToS3,
                DemixStage::S3ToS5,
                DemixStage::S5ToS7,
            ]
        );
    }

    #[test]
    fn stage_overwrite_is_rejected() {
        let mut map = LabelMap::new();
        map.set(ChannelLabel::Mono, vec![0.5]).unwrap();
        map.set(ChannelLabel::L2, vec![0.5]).unwrap();
        map.set(ChannelLabel::DemixedR2, vec![0.1]).unwrap();

        let params = params_from_mode(0, 0);
        assert!(DemixStage::S1ToS2.apply(&mut map, &params).is_err());
    }

    #[test]
    fn ambisonics_mono_with_inactive_acn() -> Result<()> {
        let element_bytes = vec![
            0x05, 0b001_00000, 0x01, 0x03, 0x00, 0x01, 0x02, 0x00, 0x00, 0x04, 0x03, 0x00, 0xFF,
            0x01, 0x02,
        ];
        let element =
            crate::structs::audio_element::AudioElement::read(&mut BsIoSliceReader::from_slice(
                &element_bytes,
            ))?;

        let mut graph = DemixGraph::build(&element, &lpcm_config(1), &BuiltinCodecFactory)?;

        let mut frames = HashMap::new();
        frames.insert(0, frame(0, &[100]));
        frames.insert(1, frame(1, &[300]));
        frames.insert(2, frame(2, &[400]));

        let labeled = graph.demix(&frames, None, None)?;
        assert_eq!(labeled.source, SourceChannels::Ambisonics(4));
        assert_eq!(labeled.map.get(ChannelLabel::A1).unwrap(), &[0.0]);
        assert!(
            (labeled.map.get(ChannelLabel::A2).unwrap()[0] - 300.0 / 32768.0).abs() < 1e-12
        );
        Ok(())
    }

    #[test]
    fn recon_gain_scales_demixed_channels() {
        let mut map = LabelMap::new();
        map.set(ChannelLabel::DemixedLs5, vec![1.0]).unwrap();
        map.set(ChannelLabel::DemixedRs5, vec![1.0]).unwrap();

        let recon = ReconGainInfoParameterData {
            layers: vec![
                None,
                Some(crate::structs::parameter_block::ReconGainElement {
                    recon_gain_flag: 0b11000,
                    recon_gains: vec![127, 255],
                }),
            ],
        };
        apply_recon_gain(&mut map, &recon);

        assert!((map.get(ChannelLabel::DemixedLs5).unwrap()[0] - 127.0 / 255.0).abs() < 1e-12);
        assert_eq!(map.get(ChannelLabel::DemixedRs5).unwrap()[0], 1.0);
    }
}
