//! Loudspeaker rendering.
//!
//! Demixed elements are projected into the target layout with gain matrices
//! keyed by the canonical layout names. Matching speaker positions pass
//! through at unity; everything else is panned constant-power onto the
//! nearest pair of the matching ring, with heights folded down when the
//! target has none. Ambisonics sources use an ACN/SN3D sampling decode at
//! the target speaker positions. Binaural output goes through an external
//! [`BinauralRenderer`] when one is installed and folds to the stereo
//! positions otherwise.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::api::{OutputLayout, OutputSampleType};
use crate::process::demix::{LabeledFrame, SourceChannels};
use crate::structs::channel::{ChannelLabel, LoudspeakerLayout};
use crate::structs::parameter_block::{ParameterBlockObu, ParameterData, q7_8_to_linear};
use crate::utils::errors::RenderError;

/// One loudspeaker of a layout: name, position, LFE flag.
///
/// Azimuth is in degrees, positive to the left; elevation positive up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speaker {
    pub name: &'static str,
    pub azimuth: f64,
    pub elevation: f64,
    pub lfe: bool,
}

const fn spk(name: &'static str, azimuth: f64, elevation: f64) -> Speaker {
    Speaker {
        name,
        azimuth,
        elevation,
        lfe: false,
    }
}

const fn lfe(name: &'static str, azimuth: f64) -> Speaker {
    Speaker {
        name,
        azimuth,
        elevation: -30.0,
        lfe: true,
    }
}

static SPEAKERS_0_2_0: [Speaker; 2] = [spk("L", 30.0, 0.0), spk("R", -30.0, 0.0)];

static SPEAKERS_0_5_0: [Speaker; 6] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Ls", 110.0, 0.0),
    spk("Rs", -110.0, 0.0),
];

static SPEAKERS_2_5_0: [Speaker; 8] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Ls", 110.0, 0.0),
    spk("Rs", -110.0, 0.0),
    spk("Ltf", 90.0, 45.0),
    spk("Rtf", -90.0, 45.0),
];

static SPEAKERS_4_5_0: [Speaker; 10] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Ls", 110.0, 0.0),
    spk("Rs", -110.0, 0.0),
    spk("Ltf", 45.0, 45.0),
    spk("Rtf", -45.0, 45.0),
    spk("Ltb", 135.0, 45.0),
    spk("Rtb", -135.0, 45.0),
];

static SPEAKERS_4_5_1: [Speaker; 11] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Ls", 110.0, 0.0),
    spk("Rs", -110.0, 0.0),
    spk("Ltf", 45.0, 45.0),
    spk("Rtf", -45.0, 45.0),
    spk("Ltb", 135.0, 45.0),
    spk("Rtb", -135.0, 45.0),
    spk("Cbf", 0.0, -30.0),
];

static SPEAKERS_3_7_0: [Speaker; 12] = [
    spk("C", 0.0, 0.0),
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("LH", 45.0, 45.0),
    spk("RH", -45.0, 45.0),
    spk("LS", 90.0, 0.0),
    spk("RS", -90.0, 0.0),
    spk("LB", 135.0, 0.0),
    spk("RB", -135.0, 0.0),
    spk("CH", 180.0, 45.0),
    lfe("LFE1", 45.0),
    lfe("LFE2", -45.0),
];

static SPEAKERS_4_9_0: [Speaker; 14] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Lss", 90.0, 0.0),
    spk("Rss", -90.0, 0.0),
    spk("Lrs", 135.0, 0.0),
    spk("Rrs", -135.0, 0.0),
    spk("Ltf", 45.0, 45.0),
    spk("Rtf", -45.0, 45.0),
    spk("Ltb", 135.0, 45.0),
    spk("Rtb", -135.0, 45.0),
    spk("Lsc", 15.0, 0.0),
    spk("Rsc", -15.0, 0.0),
];

static SPEAKERS_9_10_3: [Speaker; 24] = [
    spk("FL", 30.0, 0.0),
    spk("FR", -30.0, 0.0),
    spk("FC", 0.0, 0.0),
    lfe("LFE1", 45.0),
    spk("BL", 135.0, 0.0),
    spk("BR", -135.0, 0.0),
    spk("FLc", 15.0, 0.0),
    spk("FRc", -15.0, 0.0),
    spk("BC", 180.0, 0.0),
    lfe("LFE2", -45.0),
    spk("SiL", 90.0, 0.0),
    spk("SiR", -90.0, 0.0),
    spk("TpFL", 45.0, 45.0),
    spk("TpFR", -45.0, 45.0),
    spk("TpFC", 0.0, 45.0),
    spk("TpC", 0.0, 90.0),
    spk("TpBL", 135.0, 45.0),
    spk("TpBR", -135.0, 45.0),
    spk("TpSiL", 90.0, 45.0),
    spk("TpSiR", -90.0, 45.0),
    spk("TpBC", 180.0, 45.0),
    spk("BtFC", 0.0, -30.0),
    spk("BtFL", 45.0, -30.0),
    spk("BtFR", -45.0, -30.0),
];

static SPEAKERS_0_7_0: [Speaker; 8] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Lss", 90.0, 0.0),
    spk("Rss", -90.0, 0.0),
    spk("Lrs", 135.0, 0.0),
    spk("Rrs", -135.0, 0.0),
];

static SPEAKERS_4_7_0: [Speaker; 12] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Lss", 90.0, 0.0),
    spk("Rss", -90.0, 0.0),
    spk("Lrs", 135.0, 0.0),
    spk("Rrs", -135.0, 0.0),
    spk("Ltf", 45.0, 45.0),
    spk("Rtf", -45.0, 45.0),
    spk("Ltb", 135.0, 45.0),
    spk("Rtb", -135.0, 45.0),
];

static SPEAKERS_2_7_0: [Speaker; 10] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Lss", 90.0, 0.0),
    spk("Rss", -90.0, 0.0),
    spk("Lrs", 135.0, 0.0),
    spk("Rrs", -135.0, 0.0),
    spk("Ltf", 90.0, 45.0),
    spk("Rtf", -90.0, 45.0),
];

static SPEAKERS_2_3_0: [Speaker; 6] = [
    spk("L", 30.0, 0.0),
    spk("R", -30.0, 0.0),
    spk("C", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("Ltf", 45.0, 45.0),
    spk("Rtf", -45.0, 45.0),
];

static SPEAKERS_0_1_0: [Speaker; 1] = [spk("C", 0.0, 0.0)];

static SPEAKERS_6_9_0: [Speaker; 16] = [
    spk("FL", 30.0, 0.0),
    spk("FR", -30.0, 0.0),
    spk("FC", 0.0, 0.0),
    lfe("LFE", 45.0),
    spk("BL", 135.0, 0.0),
    spk("BR", -135.0, 0.0),
    spk("FLc", 15.0, 0.0),
    spk("FRc", -15.0, 0.0),
    spk("SiL", 90.0, 0.0),
    spk("SiR", -90.0, 0.0),
    spk("TpFL", 45.0, 45.0),
    spk("TpFR", -45.0, 45.0),
    spk("TpBL", 135.0, 45.0),
    spk("TpBR", -135.0, 45.0),
    spk("TpSiL", 90.0, 45.0),
    spk("TpSiR", -90.0, 45.0),
];

/// Loudspeaker positions of each output layout, in channel order.
pub fn output_speakers(layout: OutputLayout) -> &'static [Speaker] {
    use OutputLayout::*;
    match layout {
        SoundSystemA0_2_0 | Binaural => &SPEAKERS_0_2_0,
        SoundSystemB0_5_0 => &SPEAKERS_0_5_0,
        SoundSystemC2_5_0 => &SPEAKERS_2_5_0,
        SoundSystemD4_5_0 => &SPEAKERS_4_5_0,
        SoundSystemE4_5_1 => &SPEAKERS_4_5_1,
        SoundSystemF3_7_0 => &SPEAKERS_3_7_0,
        SoundSystemG4_9_0 => &SPEAKERS_4_9_0,
        SoundSystemH9_10_3 => &SPEAKERS_9_10_3,
        SoundSystemI0_7_0 => &SPEAKERS_0_7_0,
        SoundSystemJ4_7_0 => &SPEAKERS_4_7_0,
        Extension7_1_2 => &SPEAKERS_2_7_0,
        Extension3_1_2 => &SPEAKERS_2_3_0,
        ExtensionMono0_1_0 => &SPEAKERS_0_1_0,
        Extension9_1_6 => &SPEAKERS_6_9_0,
    }
}

/// Nominal position of a scalable channel label.
fn label_speaker(label: ChannelLabel) -> Speaker {
    use ChannelLabel::*;
    match label {
        Mono | Centre => spk("C", 0.0, 0.0),
        L2 | L3 | L5 | L7 => spk("L", 30.0, 0.0),
        R2 | R3 | R5 | R7 => spk("R", -30.0, 0.0),
        Lfe => lfe("LFE", 45.0),
        Ls5 => spk("Ls", 110.0, 0.0),
        Rs5 => spk("Rs", -110.0, 0.0),
        Lss7 => spk("Lss", 90.0, 0.0),
        Rss7 => spk("Rss", -90.0, 0.0),
        Lrs7 => spk("Lrs", 135.0, 0.0),
        Rrs7 => spk("Rrs", -135.0, 0.0),
        Ltf2 => spk("Ltf", 90.0, 45.0),
        Rtf2 => spk("Rtf", -90.0, 45.0),
        Ltf3 | Ltf4 => spk("Ltf", 45.0, 45.0),
        Rtf3 | Rtf4 => spk("Rtf", -45.0, 45.0),
        Ltb4 => spk("Ltb", 135.0, 45.0),
        Rtb4 => spk("Rtb", -135.0, 45.0),
        other => spk(other.name(), 0.0, 0.0),
    }
}

/// Builds the (target × source) gain matrix between two speaker sets.
pub fn build_matrix(source: &[Speaker], target: &[Speaker]) -> Vec<Vec<f64>> {
    let mut matrix = vec![vec![0.0; source.len()]; target.len()];

    for (source_index, src) in source.iter().enumerate() {
        for (target_index, gain) in route_speaker(src, target) {
            matrix[target_index][source_index] += gain;
        }
    }

    matrix
}

fn route_speaker(src: &Speaker, target: &[Speaker]) -> Vec<(usize, f64)> {
    use std::f64::consts::FRAC_1_SQRT_2;

    if src.lfe {
        if let Some(index) = target.iter().position(|t| t.lfe) {
            return vec![(index, 1.0)];
        }
        // No LFE on the target: fold into the widest front pair, or C.
        let fronts = front_pair(target);
        return match fronts {
            Some((left, right)) => vec![(left, FRAC_1_SQRT_2), (right, FRAC_1_SQRT_2)],
            None => vec![(0, 1.0)],
        };
    }

    if let Some(index) = target
        .iter()
        .position(|t| !t.lfe && close(t.azimuth, src.azimuth) && close(t.elevation, src.elevation))
    {
        return vec![(index, 1.0)];
    }

    // Pick the ring to pan on: heights stay up when the target has any,
    // otherwise everything folds to the horizontal ring.
    let heights: Vec<usize> = target
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.lfe && t.elevation > 20.0)
        .map(|(i, _)| i)
        .collect();
    let horizontals: Vec<usize> = target
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.lfe && t.elevation.abs() <= 20.0)
        .map(|(i, _)| i)
        .collect();

    let ring = if src.elevation > 20.0 && !heights.is_empty() {
        heights
    } else if !horizontals.is_empty() {
        horizontals
    } else {
        (0..target.len()).filter(|&i| !target[i].lfe).collect()
    };

    pan_on_ring(src.azimuth, &ring, target)
}

fn front_pair(target: &[Speaker]) -> Option<(usize, usize)> {
    let left = target
        .iter()
        .position(|t| !t.lfe && t.elevation.abs() <= 20.0 && (0.0..=60.0).contains(&t.azimuth))?;
    let right = target
        .iter()
        .position(|t| !t.lfe && t.elevation.abs() <= 20.0 && (-60.0..=0.0).contains(&t.azimuth))?;
    (left != right).then_some((left, right))
}

/// Constant-power pan between the two ring speakers bracketing the azimuth.
fn pan_on_ring(azimuth: f64, ring: &[usize], target: &[Speaker]) -> Vec<(usize, f64)> {
    use std::f64::consts::FRAC_PI_2;

    match ring {
        [] => vec![],
        [only] => vec![(*only, 1.0)],
        _ => {
            let mut ordered: Vec<(usize, f64)> = ring
                .iter()
                .map(|&i| (i, wrap_degrees(target[i].azimuth)))
                .collect();
            ordered.sort_by(|a, b| a.1.total_cmp(&b.1));

            let az = wrap_degrees(azimuth);
            let position = ordered.iter().position(|&(_, a)| a > az).unwrap_or(0);
            let (right_index, right_az) = ordered[position % ordered.len()];
            let (left_index, left_az) =
                ordered[(position + ordered.len() - 1) % ordered.len()];

            let span = wrap_degrees(right_az - left_az - 1e-9) + 1e-9;
            let offset = wrap_degrees(az - left_az);
            let fraction = if span.abs() < 1e-9 {
                0.0
            } else {
                (offset / span).clamp(0.0, 1.0)
            };

            vec![
                (left_index, (fraction * FRAC_PI_2).cos()),
                (right_index, (fraction * FRAC_PI_2).sin()),
            ]
        }
    }
}

fn wrap_degrees(az: f64) -> f64 {
    az.rem_euclid(360.0)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.5
}

/// The ACN/SN3D sampling decode matrix (target × acn) for a speaker layout.
///
/// LFE speakers receive nothing from the scene.
pub fn ambisonics_decode_matrix(num_channels: usize, layout: OutputLayout) -> Vec<Vec<f64>> {
    let speakers = output_speakers(layout);
    let norm = 1.0 / num_channels as f64;

    speakers
        .iter()
        .map(|speaker| {
            if speaker.lfe {
                return vec![0.0; num_channels];
            }
            let azimuth = speaker.azimuth.to_radians();
            let elevation = speaker.elevation.to_radians();
            (0..num_channels)
                .map(|acn| norm * sn3d(acn, azimuth, elevation))
                .collect()
        })
        .collect()
}

/// Real SN3D spherical harmonic for an ACN at a direction, no
/// Condon-Shortley phase.
pub fn sn3d(acn: usize, azimuth: f64, elevation: f64) -> f64 {
    let degree = (acn as f64).sqrt() as usize;
    let order = acn as i64 - (degree * (degree + 1)) as i64;
    let abs_order = order.unsigned_abs() as usize;

    let kronecker = if order == 0 { 1.0 } else { 2.0 };
    let norm =
        (kronecker * factorial(degree - abs_order) / factorial(degree + abs_order)).sqrt();

    let legendre = assoc_legendre(degree, abs_order, elevation.sin());
    let angular = if order >= 0 {
        (order as f64 * azimuth).cos()
    } else {
        (abs_order as f64 * azimuth).sin()
    };

    norm * legendre * angular
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|i| i as f64).product()
}

/// Associated Legendre polynomial without the Condon-Shortley phase.
fn assoc_legendre(l: usize, m: usize, x: f64) -> f64 {
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = (1.0 - x * x).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= fact * somx2;
            fact += 2.0;
        }
    }
    if l == m {
        return pmm;
    }

    let mut pmmp1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 {
        return pmmp1;
    }

    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = ((2 * ll - 1) as f64 * x * pmmp1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// Per-temporal-unit hook receiving the mixed output before conversion.
pub trait SampleObserver {
    fn on_temporal_unit(&mut self, start_timestamp: u64, channels: &[Vec<f64>]);
}

/// External binaural renderer collaborator.
pub trait BinauralRenderer {
    /// Renders positioned channels to a binaural pair.
    fn render(&mut self, speakers: &[Speaker], channels: &[Vec<f64>]) -> Result<[Vec<f64>; 2]>;
}

/// Projects demixed elements into the target layout.
pub struct Renderer {
    target: OutputLayout,
    matrix_cache: HashMap<&'static str, Vec<Vec<f64>>>,
    ambisonics_cache: HashMap<usize, Vec<Vec<f64>>>,
    binaural: Option<Box<dyn BinauralRenderer>>,
    observer: Option<Box<dyn SampleObserver>>,
}

impl Renderer {
    pub fn new(target: OutputLayout) -> Self {
        Self {
            target,
            matrix_cache: HashMap::new(),
            ambisonics_cache: HashMap::new(),
            binaural: None,
            observer: None,
        }
    }

    pub fn target(&self) -> OutputLayout {
        self.target
    }

    pub fn set_binaural_renderer(&mut self, renderer: Box<dyn BinauralRenderer>) {
        self.binaural = Some(renderer);
    }

    pub fn set_sample_observer(&mut self, observer: Box<dyn SampleObserver>) {
        self.observer = Some(observer);
    }

    /// Renders one demixed element into target-layout planar channels.
    pub fn render_element(&mut self, labeled: &LabeledFrame) -> Result<Vec<Vec<f64>>> {
        match labeled.source {
            SourceChannels::Channel(layout) => self.render_channel_element(layout, labeled),
            SourceChannels::Ambisonics(num_channels) => {
                self.render_ambisonics_element(num_channels, labeled)
            }
        }
    }

    fn render_channel_element(
        &mut self,
        layout: LoudspeakerLayout,
        labeled: &LabeledFrame,
    ) -> Result<Vec<Vec<f64>>> {
        let labels = layout.labels();
        if labels.is_empty() {
            bail!(RenderError::NoRenderingMatrix {
                source_layout: layout.itu_name().to_string(),
                target: self.target.itu_name().to_string(),
            });
        }

        let mut sources = Vec::with_capacity(labels.len());
        for &label in labels {
            let Some(samples) = labeled.map.resolve(label) else {
                bail!(RenderError::MissingChannel(label.name()));
            };
            sources.push(samples);
        }

        // Same layout in and out: straight copy.
        if self.target.itu_name() == layout.itu_name()
            || (self.target == OutputLayout::Binaural
                && matches!(
                    layout,
                    LoudspeakerLayout::Binaural | LoudspeakerLayout::Stereo
                ))
        {
            return Ok(sources.iter().map(|s| s.to_vec()).collect());
        }

        let source_speakers: Vec<Speaker> =
            labels.iter().map(|&label| label_speaker(label)).collect();

        if self.target == OutputLayout::Binaural {
            if let Some(binaural) = self.binaural.as_mut() {
                let channels: Vec<Vec<f64>> = sources.iter().map(|s| s.to_vec()).collect();
                let [left, right] = binaural.render(&source_speakers, &channels)?;
                return Ok(vec![left, right]);
            }
        }

        let target_speakers = output_speakers(self.target);
        let matrix = self
            .matrix_cache
            .entry(layout.itu_name())
            .or_insert_with(|| build_matrix(&source_speakers, target_speakers));

        Ok(apply_matrix(matrix, &sources, labeled.num_samples))
    }

    fn render_ambisonics_element(
        &mut self,
        num_channels: usize,
        labeled: &LabeledFrame,
    ) -> Result<Vec<Vec<f64>>> {
        let mut sources = Vec::with_capacity(num_channels);
        let silent = vec![0.0; labeled.num_samples];
        for acn in 0..num_channels {
            let label = ChannelLabel::from_ambisonics_channel_number(acn)
                .ok_or(RenderError::MissingChannel("A25"))?;
            sources.push(labeled.map.get(label).unwrap_or(silent.as_slice()));
        }

        let decode_layout = if self.target == OutputLayout::Binaural {
            // The scene decodes at the stereo positions when no binaural
            // collaborator is installed.
            OutputLayout::SoundSystemA0_2_0
        } else {
            self.target
        };

        let matrix = self
            .ambisonics_cache
            .entry(num_channels)
            .or_insert_with(|| ambisonics_decode_matrix(num_channels, decode_layout));

        Ok(apply_matrix(matrix, &sources, labeled.num_samples))
    }

    /// Feeds the mixed unit to the sample observer, when one is installed.
    pub fn notify_observer(&mut self, start_timestamp: u64, channels: &[Vec<f64>]) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_temporal_unit(start_timestamp, channels);
        }
    }
}

fn apply_matrix(matrix: &[Vec<f64>], sources: &[&[f64]], num_samples: usize) -> Vec<Vec<f64>> {
    matrix
        .iter()
        .map(|row| {
            let mut out = vec![0.0; num_samples];
            for (&gain, source) in row.iter().zip(sources) {
                if gain == 0.0 {
                    continue;
                }
                for (o, &s) in out.iter_mut().zip(source.iter()) {
                    *o += gain * s;
                }
            }
            out
        })
        .collect()
}

/// Evaluates a mix-gain curve over one temporal unit, per sample.
///
/// `rate_scale` converts parameter-rate ticks to audio samples. Without a
/// parameter block the default gain holds for the whole unit.
pub fn evaluate_mix_gain(
    block: Option<&ParameterBlockObu>,
    default_gain_q7_8: i16,
    num_samples: usize,
    rate_scale: f64,
) -> Vec<f64> {
    let Some(block) = block else {
        return vec![q7_8_to_linear(default_gain_q7_8); num_samples];
    };

    let mut gains = Vec::with_capacity(num_samples);
    let mut last = q7_8_to_linear(default_gain_q7_8);

    for subblock in &block.subblocks {
        let ParameterData::MixGain(animation) = &subblock.data else {
            continue;
        };

        let len = ((subblock.duration as f64) * rate_scale).round() as usize;
        for i in 0..len {
            if gains.len() >= num_samples {
                break;
            }
            let t = i as f64 / len.max(1) as f64;
            last = 10f64.powf(animation.value_db_at(t) / 20.0);
            gains.push(last);
        }
    }

    while gains.len() < num_samples {
        gains.push(last);
    }
    gains.truncate(num_samples);
    gains
}

/// Converts planar float samples to interleaved PCM in the caller's buffer.
///
/// Samples are clipped to [-1, 1] before conversion.
pub fn write_interleaved(
    channels: &[Vec<f64>],
    sample_type: OutputSampleType,
    out: &mut [u8],
) -> Result<usize> {
    let num_samples = channels.first().map(|c| c.len()).unwrap_or(0);
    let needed = num_samples * channels.len() * sample_type.bytes_per_sample();
    if out.len() < needed {
        bail!(RenderError::BufferTooSmall {
            needed,
            given: out.len(),
        });
    }

    let mut position = 0;
    for tick in 0..num_samples {
        for channel in channels {
            let clipped = channel[tick].clamp(-1.0, 1.0);
            match sample_type {
                OutputSampleType::Int16LittleEndian => {
                    let value = (clipped * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
                    out[position..position + 2].copy_from_slice(&value.to_le_bytes());
                    position += 2;
                }
                OutputSampleType::Int32LittleEndian => {
                    let value = (clipped * 2_147_483_648.0)
                        .round()
                        .clamp(-2_147_483_648.0, 2_147_483_647.0)
                        as i32;
                    out[position..position + 4].copy_from_slice(&value.to_le_bytes());
                    position += 4;
                }
            }
        }
    }

    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::demix::LabelMap;
    use crate::structs::parameter_block::GainAnimation;

    fn labeled_stereo(l: f64, r: f64) -> LabeledFrame {
        let mut map = LabelMap::new();
        map.set(ChannelLabel::L2, vec![l]).unwrap();
        map.set(ChannelLabel::R2, vec![r]).unwrap();
        LabeledFrame {
            source: SourceChannels::Channel(LoudspeakerLayout::Stereo),
            map,
            num_samples: 1,
        }
    }

    #[test]
    fn stereo_passthrough() -> Result<()> {
        let mut renderer = Renderer::new(OutputLayout::SoundSystemA0_2_0);
        let out = renderer.render_element(&labeled_stereo(0.25, -0.5))?;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![0.25]);
        assert_eq!(out[1], vec![-0.5]);
        Ok(())
    }

    #[test]
    fn matching_positions_render_at_unity() {
        let source = output_speakers(OutputLayout::SoundSystemB0_5_0);
        let matrix = build_matrix(source, output_speakers(OutputLayout::SoundSystemJ4_7_0));

        // L and R land only on the target L and R.
        assert_eq!(matrix[0][0], 1.0);
        assert_eq!(matrix[1][1], 1.0);
        assert_eq!(matrix[0][1], 0.0);
        // LFE routes to LFE.
        assert_eq!(matrix[3][3], 1.0);
    }

    #[test]
    fn five_one_to_stereo_folds_centre() {
        let source = output_speakers(OutputLayout::SoundSystemB0_5_0);
        let matrix = build_matrix(source, output_speakers(OutputLayout::SoundSystemA0_2_0));

        // Centre splits equally across L and R with power preserved.
        let to_l = matrix[0][2];
        let to_r = matrix[1][2];
        assert!((to_l - to_r).abs() < 1e-9);
        assert!((to_l * to_l + to_r * to_r - 1.0).abs() < 1e-9);

        // Surrounds reach both stereo speakers with total power 1.
        let ls_l = matrix[0][4];
        let ls_r = matrix[1][4];
        assert!((ls_l * ls_l + ls_r * ls_r - 1.0).abs() < 1e-9);
        assert!(ls_l > ls_r);
    }

    #[test]
    fn first_order_decode_rows() {
        let matrix = ambisonics_decode_matrix(4, OutputLayout::SoundSystemA0_2_0);
        let left = &matrix[0];

        assert!((left[0] - 0.25).abs() < 1e-9);
        assert!((left[1] - 0.125).abs() < 1e-9); // sin(30°) / 4
        assert!(left[2].abs() < 1e-9);
        assert!((left[3] - 0.75f64.sqrt() / 4.0).abs() < 1e-9); // cos(30°) / 4

        // The right row mirrors the Y component.
        assert!((matrix[1][1] + 0.125).abs() < 1e-9);
    }

    #[test]
    fn sn3d_basics() {
        // W is direction independent.
        assert!((sn3d(0, 1.0, 0.5) - 1.0).abs() < 1e-12);
        // Z at zenith.
        assert!((sn3d(2, 0.0, std::f64::consts::FRAC_PI_2) - 1.0).abs() < 1e-9);
        // X straight ahead.
        assert!((sn3d(3, 0.0, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn interleave_round_trips_16_bit() -> Result<()> {
        let channels = vec![
            vec![1.0 / 32768.0, 3.0 / 32768.0],
            vec![2.0 / 32768.0, 4.0 / 32768.0],
        ];
        let mut out = vec![0u8; 8];
        let written = write_interleaved(&channels, OutputSampleType::Int16LittleEndian, &mut out)?;

        assert_eq!(written, 8);
        assert_eq!(out, vec![1, 0, 2, 0, 3, 0, 4, 0]);
        Ok(())
    }

    #[test]
    fn interleave_clips() -> Result<()> {
        let channels = vec![vec![2.0, -2.0]];
        let mut out = vec![0u8; 4];
        write_interleaved(&channels, OutputSampleType::Int16LittleEndian, &mut out)?;

        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 32767);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -32768);
        Ok(())
    }

    #[test]
    fn buffer_too_small_is_fatal() {
        let channels = vec![vec![0.0; 4]];
        let mut out = vec![0u8; 4];
        assert!(
            write_interleaved(&channels, OutputSampleType::Int32LittleEndian, &mut out).is_err()
        );
    }

    #[test]
    fn mix_gain_defaults_and_steps() {
        let gains = evaluate_mix_gain(None, -1536, 4, 1.0);
        assert_eq!(gains.len(), 4);
        assert!((gains[0] - 10f64.powf(-6.0 / 20.0)).abs() < 1e-12);

        let block = ParameterBlockObu {
            parameter_id: 1,
            duration: 4,
            subblocks: vec![crate::structs::parameter_block::ParameterSubblock {
                duration: 4,
                data: ParameterData::MixGain(GainAnimation::Step { start: 0 }),
            }],
        };
        let gains = evaluate_mix_gain(Some(&block), -1536, 4, 1.0);
        assert!(gains.iter().all(|&g| (g - 1.0).abs() < 1e-12));
    }
}
