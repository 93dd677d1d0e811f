//! Public decoder-facing types.
//!
//! Creation-time [`Settings`], the closed [`OutputLayout`] set and the small
//! enums callers exchange with the pipeline controller.

use std::fmt::Display;

/// IAMF profile version from the IA Sequence Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileVersion {
    Simple,
    Base,
    BaseEnhanced,
    Reserved(u8),
}

impl ProfileVersion {
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Simple,
            1 => Self::Base,
            2 => Self::BaseEnhanced,
            other => Self::Reserved(other),
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Simple => 0,
            Self::Base => 1,
            Self::BaseEnhanced => 2,
            Self::Reserved(bits) => bits,
        }
    }
}

impl Display for ProfileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "Simple"),
            Self::Base => write!(f, "Base"),
            Self::BaseEnhanced => write!(f, "Base-Enhanced"),
            Self::Reserved(bits) => write!(f, "Reserved({bits})"),
        }
    }
}

/// Playback layout the renderer targets.
///
/// Sound systems follow ITU-R BS.2051-3 plus the IAMF extensions; channel
/// ordering within each layout is the ITU/IAMF order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLayout {
    /// Sound system A (0+2+0), stereo. Ordered as [L, R].
    SoundSystemA0_2_0,
    /// Sound system B (0+5+0), 5.1.
    SoundSystemB0_5_0,
    /// Sound system C (2+5+0), 5.1.2.
    SoundSystemC2_5_0,
    /// Sound system D (4+5+0), 5.1.4.
    SoundSystemD4_5_0,
    /// Sound system E (4+5+1).
    SoundSystemE4_5_1,
    /// Sound system F (3+7+0).
    SoundSystemF3_7_0,
    /// Sound system G (4+9+0).
    SoundSystemG4_9_0,
    /// Sound system H (9+10+3).
    SoundSystemH9_10_3,
    /// Sound system I (0+7+0), 7.1.
    SoundSystemI0_7_0,
    /// Sound system J (4+7+0), 7.1.4.
    SoundSystemJ4_7_0,
    /// IAMF extension 7.1.2.
    Extension7_1_2,
    /// IAMF extension 3.1.2.
    Extension3_1_2,
    /// IAMF extension mono (0+1+0).
    ExtensionMono0_1_0,
    /// IAMF extension 9.1.6.
    Extension9_1_6,
    /// Binaural, two channels.
    Binaural,
}

impl OutputLayout {
    pub const fn channel_count(self) -> usize {
        match self {
            Self::SoundSystemA0_2_0 | Self::Binaural => 2,
            Self::SoundSystemB0_5_0 | Self::Extension3_1_2 => 6,
            Self::SoundSystemC2_5_0 | Self::SoundSystemI0_7_0 => 8,
            Self::SoundSystemD4_5_0 | Self::Extension7_1_2 => 10,
            Self::SoundSystemE4_5_1 => 11,
            Self::SoundSystemF3_7_0 | Self::SoundSystemJ4_7_0 => 12,
            Self::SoundSystemG4_9_0 => 14,
            Self::SoundSystemH9_10_3 => 24,
            Self::ExtensionMono0_1_0 => 1,
            Self::Extension9_1_6 => 16,
        }
    }

    /// Canonical ITU-style name used as a rendering table key.
    pub const fn itu_name(self) -> &'static str {
        match self {
            Self::SoundSystemA0_2_0 => "0+2+0",
            Self::SoundSystemB0_5_0 => "0+5+0",
            Self::SoundSystemC2_5_0 => "2+5+0",
            Self::SoundSystemD4_5_0 => "4+5+0",
            Self::SoundSystemE4_5_1 => "4+5+1",
            Self::SoundSystemF3_7_0 => "3+7+0",
            Self::SoundSystemG4_9_0 => "4+9+0",
            Self::SoundSystemH9_10_3 => "9+10+3",
            Self::SoundSystemI0_7_0 => "0+7+0",
            Self::SoundSystemJ4_7_0 => "4+7+0",
            Self::Extension7_1_2 => "2+7+0",
            Self::Extension3_1_2 => "2+3+0",
            Self::ExtensionMono0_1_0 => "0+1+0",
            Self::Extension9_1_6 => "6+9+0",
            Self::Binaural => "binaural",
        }
    }
}

impl Display for OutputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.itu_name())
    }
}

/// Format of the interleaved output samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSampleType {
    Int16LittleEndian,
    Int32LittleEndian,
}

impl OutputSampleType {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Int16LittleEndian => 2,
            Self::Int32LittleEndian => 4,
        }
    }
}

/// Channel ordering applied to the interleaved output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrdering {
    /// The ITU/IAMF order of [`OutputLayout`]; identity.
    #[default]
    IamfOrdering,
    /// The order of Android's `AudioFormat` channel masks, which also matches
    /// WAVEFORMATEXTENSIBLE for the channels both define.
    AndroidOrdering,
}

/// A particular mix presentation and/or layout to prefer for the output.
///
/// Missing pieces fall back to bitstream order and the layouts the selected
/// mix offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestedMix {
    pub mix_presentation_id: Option<u32>,
    pub output_layout: Option<OutputLayout>,
}

/// The mix and layout actually bound after descriptor processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedMix {
    pub mix_presentation_id: u32,
    pub output_layout: OutputLayout,
}

/// Creation-time configuration of the decoder.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Desired output layout; used as long as the descriptors offer it.
    pub requested_layout: OutputLayout,

    /// A specific mix presentation to prefer, when known in advance.
    pub requested_mix: Option<RequestedMix>,

    pub channel_ordering: ChannelOrdering,

    /// Profile versions the caller can handle. Mix presentations that no
    /// requested profile supports make creation fail.
    pub requested_profile_versions: Vec<ProfileVersion>,

    /// Output sample format; a content-dependent default applies when unset.
    pub requested_output_sample_type: Option<OutputSampleType>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            requested_layout: OutputLayout::SoundSystemA0_2_0,
            requested_mix: None,
            channel_ordering: ChannelOrdering::IamfOrdering,
            requested_profile_versions: vec![
                ProfileVersion::Simple,
                ProfileVersion::Base,
                ProfileVersion::BaseEnhanced,
            ],
            requested_output_sample_type: None,
        }
    }
}
