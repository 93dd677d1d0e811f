//! Channel labels and loudspeaker layouts.
//!
//! ## Labels
//!
//! Every channel moving through the demix graph carries a [`ChannelLabel`].
//! Authored channels come straight out of the codec decoders; `Demixed*`
//! labels are synthesized by demix stages and never overwrite authored ones.
//!
//! ## Scalable layouts
//!
//! Channel-based audio elements are layered: each layer grows the previous
//! loudspeaker layout along the surround, height and LFE axes. The layer-step
//! tables here decide which labels a layer's substreams carry.

use std::fmt::Display;

use anyhow::{Result, bail};

use crate::utils::errors::ElementError;

/// Symbolic name of one channel inside the demix graph.
///
/// Covers the scalable channel-based labels, the 9.1.6 expanded set, the
/// ambisonics channel numbers A0..A24 and the demixed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelLabel {
    Mono,
    L2,
    R2,
    Centre,
    Lfe,
    L3,
    R3,
    Ltf3,
    Rtf3,
    L5,
    R5,
    Ls5,
    Rs5,
    Ltf2,
    Rtf2,
    Ltf4,
    Rtf4,
    Ltb4,
    Rtb4,
    L7,
    R7,
    Lss7,
    Rss7,
    Lrs7,
    Rrs7,
    FLc,
    FC,
    FRc,
    FL,
    FR,
    SiL,
    SiR,
    BL,
    BR,
    TpFL,
    TpFR,
    TpSiL,
    TpSiR,
    TpBL,
    TpBR,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    A8,
    A9,
    A10,
    A11,
    A12,
    A13,
    A14,
    A15,
    A16,
    A17,
    A18,
    A19,
    A20,
    A21,
    A22,
    A23,
    A24,
    DemixedR2,
    DemixedL3,
    DemixedR3,
    DemixedLs5,
    DemixedRs5,
    DemixedLtf2,
    DemixedRtf2,
    DemixedL7,
    DemixedR7,
    DemixedLrs7,
    DemixedRrs7,
    DemixedLtb4,
    DemixedRtb4,
}

impl ChannelLabel {
    /// Number of distinct labels; dense index upper bound.
    pub const COUNT: usize = 78;

    /// Dense index for array-backed label maps.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        use ChannelLabel::*;
        match self {
            Mono => "Mono",
            L2 => "L2",
            R2 => "R2",
            Centre => "C",
            Lfe => "LFE",
            L3 => "L3",
            R3 => "R3",
            Ltf3 => "Ltf3",
            Rtf3 => "Rtf3",
            L5 => "L5",
            R5 => "R5",
            Ls5 => "Ls5",
            Rs5 => "Rs5",
            Ltf2 => "Ltf2",
            Rtf2 => "Rtf2",
            Ltf4 => "Ltf4",
            Rtf4 => "Rtf4",
            Ltb4 => "Ltb4",
            Rtb4 => "Rtb4",
            L7 => "L7",
            R7 => "R7",
            Lss7 => "Lss7",
            Rss7 => "Rss7",
            Lrs7 => "Lrs7",
            Rrs7 => "Rrs7",
            FLc => "FLc",
            FC => "FC",
            FRc => "FRc",
            FL => "FL",
            FR => "FR",
            SiL => "SiL",
            SiR => "SiR",
            BL => "BL",
            BR => "BR",
            TpFL => "TpFL",
            TpFR => "TpFR",
            TpSiL => "TpSiL",
            TpSiR => "TpSiR",
            TpBL => "TpBL",
            TpBR => "TpBR",
            A0 => "A0",
            A1 => "A1",
            A2 => "A2",
            A3 => "A3",
            A4 => "A4",
            A5 => "A5",
            A6 => "A6",
            A7 => "A7",
            A8 => "A8",
            A9 => "A9",
            A10 => "A10",
            A11 => "A11",
            A12 => "A12",
            A13 => "A13",
            A14 => "A14",
            A15 => "A15",
            A16 => "A16",
            A17 => "A17",
            A18 => "A18",
            A19 => "A19",
            A20 => "A20",
            A21 => "A21",
            A22 => "A22",
            A23 => "A23",
            A24 => "A24",
            DemixedR2 => "DemixedR2",
            DemixedL3 => "DemixedL3",
            DemixedR3 => "DemixedR3",
            DemixedLs5 => "DemixedLs5",
            DemixedRs5 => "DemixedRs5",
            DemixedLtf2 => "DemixedLtf2",
            DemixedRtf2 => "DemixedRtf2",
            DemixedL7 => "DemixedL7",
            DemixedR7 => "DemixedR7",
            DemixedLrs7 => "DemixedLrs7",
            DemixedRrs7 => "DemixedRrs7",
            DemixedLtb4 => "DemixedLtb4",
            DemixedRtb4 => "DemixedRtb4",
        }
    }

    /// The demixed counterpart of an authored channel, when one exists.
    pub const fn demixed(self) -> Option<Self> {
        use ChannelLabel::*;
        match self {
            R2 => Some(DemixedR2),
            L3 => Some(DemixedL3),
            R3 => Some(DemixedR3),
            Ls5 => Some(DemixedLs5),
            Rs5 => Some(DemixedRs5),
            Ltf2 => Some(DemixedLtf2),
            Rtf2 => Some(DemixedRtf2),
            L7 => Some(DemixedL7),
            R7 => Some(DemixedR7),
            Lrs7 => Some(DemixedLrs7),
            Rrs7 => Some(DemixedRrs7),
            Ltb4 => Some(DemixedLtb4),
            Rtb4 => Some(DemixedRtb4),
            _ => None,
        }
    }

    /// Maps a demixed label back to its authored base.
    pub const fn authored(self) -> Self {
        use ChannelLabel::*;
        match self {
            DemixedR2 => R2,
            DemixedL3 => L3,
            DemixedR3 => R3,
            DemixedLs5 => Ls5,
            DemixedRs5 => Rs5,
            DemixedLtf2 => Ltf2,
            DemixedRtf2 => Rtf2,
            DemixedL7 => L7,
            DemixedR7 => R7,
            DemixedLrs7 => Lrs7,
            DemixedRrs7 => Rrs7,
            DemixedLtb4 => Ltb4,
            DemixedRtb4 => Rtb4,
            other => other,
        }
    }

    pub const fn is_demixed(self) -> bool {
        (self.authored() as usize) != (self as usize)
    }

    /// The label for an Ambisonics Channel Number, up to fourth order.
    pub const fn from_ambisonics_channel_number(acn: usize) -> Option<Self> {
        use ChannelLabel::*;
        const AMBISONICS: [ChannelLabel; 25] = [
            A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15, A16, A17, A18,
            A19, A20, A21, A22, A23, A24,
        ];
        if acn < AMBISONICS.len() {
            Some(AMBISONICS[acn])
        } else {
            None
        }
    }
}

impl Display for ChannelLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Loudspeaker layout of one scalable channel layer.
///
/// Values follow the 4-bit `loudspeaker_layout` field of the channel audio
/// layer config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoudspeakerLayout {
    Mono,
    Stereo,
    Surround5_1,
    Surround5_1_2,
    Surround5_1_4,
    Surround7_1,
    Surround7_1_2,
    Surround7_1_4,
    Surround3_1_2,
    Binaural,
    /// `loudspeaker_layout == 15`; the concrete layout comes from the
    /// `expanded_loudspeaker_layout` field.
    Expanded,
}

impl LoudspeakerLayout {
    pub fn from_bits(bits: u8) -> Result<Self> {
        Ok(match bits {
            0 => Self::Mono,
            1 => Self::Stereo,
            2 => Self::Surround5_1,
            3 => Self::Surround5_1_2,
            4 => Self::Surround5_1_4,
            5 => Self::Surround7_1,
            6 => Self::Surround7_1_2,
            7 => Self::Surround7_1_4,
            8 => Self::Surround3_1_2,
            9 => Self::Binaural,
            15 => Self::Expanded,
            other => bail!(ElementError::InvalidLoudspeakerLayout(other)),
        })
    }

    /// (surround, lfe, height) channel counts.
    pub const fn axes(self) -> (u8, u8, u8) {
        match self {
            Self::Mono => (1, 0, 0),
            Self::Stereo | Self::Binaural => (2, 0, 0),
            Self::Surround3_1_2 => (3, 1, 2),
            Self::Surround5_1 => (5, 1, 0),
            Self::Surround5_1_2 => (5, 1, 2),
            Self::Surround5_1_4 => (5, 1, 4),
            Self::Surround7_1 => (7, 1, 0),
            Self::Surround7_1_2 => (7, 1, 2),
            Self::Surround7_1_4 => (7, 1, 4),
            Self::Expanded => (0, 0, 0),
        }
    }

    pub const fn channel_count(self) -> usize {
        let (s, l, h) = self.axes();
        (s + l + h) as usize
    }

    /// Canonical ITU-style name used as a rendering table key.
    pub const fn itu_name(self) -> &'static str {
        match self {
            Self::Mono => "0+1+0",
            Self::Stereo | Self::Binaural => "0+2+0",
            Self::Surround3_1_2 => "2+3+0",
            Self::Surround5_1 => "0+5+0",
            Self::Surround5_1_2 => "2+5+0",
            Self::Surround5_1_4 => "4+5+0",
            Self::Surround7_1 => "0+7+0",
            Self::Surround7_1_2 => "2+7+0",
            Self::Surround7_1_4 => "4+7+0",
            Self::Expanded => "expanded",
        }
    }

    /// Channels of the full layout in canonical rendering order.
    pub const fn labels(self) -> &'static [ChannelLabel] {
        use ChannelLabel::*;
        match self {
            Self::Mono => &[Mono],
            Self::Stereo | Self::Binaural => &[L2, R2],
            Self::Surround3_1_2 => &[L3, R3, Centre, Lfe, Ltf3, Rtf3],
            Self::Surround5_1 => &[L5, R5, Centre, Lfe, Ls5, Rs5],
            Self::Surround5_1_2 => &[L5, R5, Centre, Lfe, Ls5, Rs5, Ltf2, Rtf2],
            Self::Surround5_1_4 => &[L5, R5, Centre, Lfe, Ls5, Rs5, Ltf4, Rtf4, Ltb4, Rtb4],
            Self::Surround7_1 => &[L7, R7, Centre, Lfe, Lss7, Rss7, Lrs7, Rrs7],
            Self::Surround7_1_2 => &[L7, R7, Centre, Lfe, Lss7, Rss7, Lrs7, Rrs7, Ltf2, Rtf2],
            Self::Surround7_1_4 => &[
                L7, R7, Centre, Lfe, Lss7, Rss7, Lrs7, Rrs7, Ltf4, Rtf4, Ltb4, Rtb4,
            ],
            Self::Expanded => &[],
        }
    }
}

impl Display for LoudspeakerLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono => write!(f, "Mono"),
            Self::Stereo => write!(f, "Stereo"),
            Self::Surround5_1 => write!(f, "5.1"),
            Self::Surround5_1_2 => write!(f, "5.1.2"),
            Self::Surround5_1_4 => write!(f, "5.1.4"),
            Self::Surround7_1 => write!(f, "7.1"),
            Self::Surround7_1_2 => write!(f, "7.1.2"),
            Self::Surround7_1_4 => write!(f, "7.1.4"),
            Self::Surround3_1_2 => write!(f, "3.1.2"),
            Self::Binaural => write!(f, "Binaural"),
            Self::Expanded => write!(f, "Expanded"),
        }
    }
}

/// The channels authored by one scalable layer, in substream order.
///
/// Coupled substreams carry the pairs first, then each remaining substream
/// carries one single.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerStep {
    pub coupled: Vec<(ChannelLabel, ChannelLabel)>,
    pub singles: Vec<ChannelLabel>,
}

impl LayerStep {
    pub fn channel_count(&self) -> usize {
        self.coupled.len() * 2 + self.singles.len()
    }

    pub fn substream_count(&self) -> usize {
        self.coupled.len() + self.singles.len()
    }
}

/// Computes the labels a layer's substreams carry.
///
/// For the first layer this is the full label set of its layout; for later
/// layers it is the axis-wise growth from the previous layout. Growth must be
/// monotone on all three axes.
pub fn layer_step(
    index: usize,
    previous: Option<LoudspeakerLayout>,
    current: LoudspeakerLayout,
) -> Result<LayerStep> {
    use ChannelLabel::*;

    let Some(previous) = previous else {
        return Ok(first_layer_step(current));
    };

    let (prev_s, prev_l, prev_h) = previous.axes();
    let (cur_s, cur_l, cur_h) = current.axes();

    if cur_s < prev_s || cur_l < prev_l || cur_h < prev_h || previous == current {
        bail!(ElementError::NonMonotoneLayers {
            index,
            previous: previous.to_string(),
            current: current.to_string(),
        });
    }

    let mut step = LayerStep::default();

    // Surround growth walks the demix lattice one hop at a time.
    let mut s = prev_s;
    while s < cur_s {
        match s {
            1 => step.singles.push(L2),
            2 => step.singles.push(Centre),
            3 => step.coupled.push((L5, R5)),
            5 => step.coupled.push((Lss7, Rss7)),
            _ => unreachable!(),
        }
        s = match s {
            1 => 2,
            2 => 3,
            3 => 5,
            _ => 7,
        };
    }

    match (prev_h, cur_h) {
        (0, 0) | (2, 2) | (4, 4) => {}
        (0, 2) => {
            if cur_s == 3 {
                step.coupled.push((Ltf3, Rtf3));
            } else {
                step.coupled.push((Ltf2, Rtf2));
            }
        }
        (0, 4) => {
            step.coupled.push((Ltf4, Rtf4));
            step.coupled.push((Ltb4, Rtb4));
        }
        (2, 4) => step.coupled.push((Ltf4, Rtf4)),
        _ => bail!(ElementError::NonMonotoneLayers {
            index,
            previous: previous.to_string(),
            current: current.to_string(),
        }),
    }

    if prev_l == 0 && cur_l == 1 {
        step.singles.push(Lfe);
    }

    // Singles keep surround before LFE regardless of the axis walk above.
    step.singles.sort_by_key(|label| *label == Lfe);

    if step.coupled.is_empty() && step.singles.is_empty() {
        bail!(ElementError::NonMonotoneLayers {
            index,
            previous: previous.to_string(),
            current: current.to_string(),
        });
    }

    Ok(step)
}

fn first_layer_step(layout: LoudspeakerLayout) -> LayerStep {
    use ChannelLabel::*;

    let mut step = LayerStep::default();
    match layout {
        LoudspeakerLayout::Mono => step.singles.push(Mono),
        LoudspeakerLayout::Stereo | LoudspeakerLayout::Binaural => step.coupled.push((L2, R2)),
        LoudspeakerLayout::Surround3_1_2 => {
            step.coupled.push((L3, R3));
            step.coupled.push((Ltf3, Rtf3));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Surround5_1 => {
            step.coupled.push((L5, R5));
            step.coupled.push((Ls5, Rs5));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Surround5_1_2 => {
            step.coupled.push((L5, R5));
            step.coupled.push((Ls5, Rs5));
            step.coupled.push((Ltf2, Rtf2));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Surround5_1_4 => {
            step.coupled.push((L5, R5));
            step.coupled.push((Ls5, Rs5));
            step.coupled.push((Ltf4, Rtf4));
            step.coupled.push((Ltb4, Rtb4));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Surround7_1 => {
            step.coupled.push((L7, R7));
            step.coupled.push((Lss7, Rss7));
            step.coupled.push((Lrs7, Rrs7));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Surround7_1_2 => {
            step.coupled.push((L7, R7));
            step.coupled.push((Lss7, Rss7));
            step.coupled.push((Lrs7, Rrs7));
            step.coupled.push((Ltf2, Rtf2));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Surround7_1_4 => {
            step.coupled.push((L7, R7));
            step.coupled.push((Lss7, Rss7));
            step.coupled.push((Lrs7, Rrs7));
            step.coupled.push((Ltf4, Rtf4));
            step.coupled.push((Ltb4, Rtb4));
            step.singles.extend([Centre, Lfe]);
        }
        LoudspeakerLayout::Expanded => {}
    }

    step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_indices_are_dense() {
        assert_eq!(ChannelLabel::Mono.index(), 0);
        assert_eq!(ChannelLabel::DemixedRtb4.index(), ChannelLabel::COUNT - 1);
    }

    #[test]
    fn demixed_round_trip() {
        use ChannelLabel::*;
        for label in [R2, L3, Ls5, Ltf2, L7, Lrs7, Ltb4] {
            let demixed = label.demixed().unwrap();
            assert!(demixed.is_demixed());
            assert_eq!(demixed.authored(), label);
        }
        assert!(Centre.demixed().is_none());
        assert!(!Centre.is_demixed());
    }

    #[test]
    fn layer_step_counts_match_layouts() -> Result<()> {
        for layout in [
            LoudspeakerLayout::Mono,
            LoudspeakerLayout::Stereo,
            LoudspeakerLayout::Surround3_1_2,
            LoudspeakerLayout::Surround5_1,
            LoudspeakerLayout::Surround5_1_2,
            LoudspeakerLayout::Surround5_1_4,
            LoudspeakerLayout::Surround7_1,
            LoudspeakerLayout::Surround7_1_2,
            LoudspeakerLayout::Surround7_1_4,
        ] {
            let step = layer_step(0, None, layout)?;
            assert_eq!(step.channel_count(), layout.channel_count(), "{layout}");
        }
        Ok(())
    }

    #[test]
    fn mono_to_stereo_step() -> Result<()> {
        let step = layer_step(1, Some(LoudspeakerLayout::Mono), LoudspeakerLayout::Stereo)?;
        assert_eq!(step.coupled, vec![]);
        assert_eq!(step.singles, vec![ChannelLabel::L2]);
        Ok(())
    }

    #[test]
    fn stereo_to_5_1_step() -> Result<()> {
        let step = layer_step(
            1,
            Some(LoudspeakerLayout::Stereo),
            LoudspeakerLayout::Surround5_1,
        )?;
        assert_eq!(step.coupled, vec![(ChannelLabel::L5, ChannelLabel::R5)]);
        assert_eq!(step.singles, vec![ChannelLabel::Centre, ChannelLabel::Lfe]);
        Ok(())
    }

    #[test]
    fn five_one_to_7_1_4_step() -> Result<()> {
        let step = layer_step(
            1,
            Some(LoudspeakerLayout::Surround5_1),
            LoudspeakerLayout::Surround7_1_4,
        )?;
        assert_eq!(
            step.coupled,
            vec![
                (ChannelLabel::Lss7, ChannelLabel::Rss7),
                (ChannelLabel::Ltf4, ChannelLabel::Rtf4),
                (ChannelLabel::Ltb4, ChannelLabel::Rtb4),
            ]
        );
        assert!(step.singles.is_empty());
        Ok(())
    }

    #[test]
    fn shrinking_layers_rejected() {
        assert!(
            layer_step(
                1,
                Some(LoudspeakerLayout::Surround5_1),
                LoudspeakerLayout::Stereo
            )
            .is_err()
        );
        assert!(
            layer_step(
                1,
                Some(LoudspeakerLayout::Stereo),
                LoudspeakerLayout::Stereo
            )
            .is_err()
        );
    }
}
