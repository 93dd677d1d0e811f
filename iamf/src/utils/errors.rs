#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ObuError {
    #[error("Insufficient buffer data to continue parsing")]
    InsufficientData,

    #[error("leb128 must not exceed 5 bytes")]
    Leb128TooLong,

    #[error("leb128 value does not fit in 32 bits")]
    Leb128Overflow,

    #[error("Read of {requested} bits exceeds the buffered tail ({available} bits left)")]
    OutOfBounds { requested: u64, available: u64 },

    #[error("Seek to bit {target} precedes the surviving buffer head at bit {head}")]
    SeekBeforeHead { target: u64, head: u64 },

    #[error("Flush of {0} bytes exceeds the buffered data")]
    FlushTooLong(usize),

    #[error("obu_size = {obu_size} is smaller than the {consumed} payload bytes already implied")]
    SizeMismatch { obu_size: u32, consumed: u32 },

    #[error("OBU payload for type {obu_type:#04X} decoded {read} bytes, expected {expected}")]
    PayloadLengthMismatch {
        obu_type: u8,
        read: u64,
        expected: u64,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SequenceError {
    #[error("Invalid ia_code. Read {0:#010X}, expected 0x69616D66 (\"iamf\")")]
    InvalidIaCode(u32),

    #[error("IA Sequence Header re-appeared mid-stream; sequence restart is not supported")]
    SequenceRestart,
}

#[derive(thiserror::Error, Debug)]
pub enum ElementError {
    #[error("Unknown codec_id fourcc {0:#010X}")]
    UnknownCodecId(u32),

    #[error("Invalid loudspeaker_layout value {0}")]
    InvalidLoudspeakerLayout(u8),

    #[error("num_layers must be between 1 and 6. Read {0}")]
    InvalidLayerCount(u8),

    #[error("Layer {index} layout {current} does not grow monotonically from {previous}")]
    NonMonotoneLayers {
        index: usize,
        previous: String,
        current: String,
    },

    #[error(
        "Layer {index} declares {substreams} substreams ({coupled} coupled) but its layout step adds {labels} channels"
    )]
    SubstreamCountMismatch {
        index: usize,
        substreams: u8,
        coupled: u8,
        labels: usize,
    },

    #[error("recon_gain_is_present requires a lossy codec and a layer index > 0 (layer {0})")]
    SpuriousReconGain(usize),

    #[error("Element substream list has {ids} ids but the layer configs consume {consumed}")]
    SubstreamTotalMismatch { ids: usize, consumed: usize },

    #[error("Ambisonics channel_mapping entry {value} exceeds substream count {substreams}")]
    AmbisonicsMappingOutOfRange { value: u8, substreams: u8 },

    #[error("Ambisonics output_channel_count {0} exceeds fourth order (25 channels)")]
    AmbisonicsOrderTooHigh(u8),

    #[error(
        "Ambisonics demixing_matrix has {entries} entries, expected {rows} x {columns}"
    )]
    AmbisonicsMatrixSizeMismatch {
        entries: usize,
        rows: usize,
        columns: usize,
    },

    #[error("Invalid ambisonics_mode {0}")]
    InvalidAmbisonicsMode(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum DescriptorError {
    #[error("Descriptor OBU of type {0:#04X} arrived after the descriptors were sealed")]
    DescriptorAfterSeal(u8),

    #[error("No IA Sequence Header was found before other descriptor OBUs")]
    MissingSequenceHeader,

    #[error("Duplicate codec_config_id {0}")]
    DuplicateCodecConfigId(u32),

    #[error("Duplicate audio_element_id {0}")]
    DuplicateAudioElementId(u32),

    #[error("Duplicate mix_presentation_id {0}")]
    DuplicateMixPresentationId(u32),

    #[error("audio_substream_id {0} is used by more than one audio element")]
    DuplicateSubstreamId(u32),

    #[error("Audio element {audio_element_id} references unknown codec_config_id {codec_config_id}")]
    UnknownCodecConfig {
        audio_element_id: u32,
        codec_config_id: u32,
    },

    #[error(
        "Mix presentation {mix_presentation_id} references unknown audio_element_id {audio_element_id}"
    )]
    UnknownAudioElement {
        mix_presentation_id: u32,
        audio_element_id: u32,
    },

    #[error("parameter_id {0} is declared by more than one definition with conflicting shapes")]
    ConflictingParameterDefinition(u32),

    #[error("Descriptor block contains {0} residual bytes after the descriptor OBUs")]
    ResidualBytes(usize),

    #[error("Descriptor block ended before any temporal unit while descriptors were incomplete")]
    TruncatedDescriptors,

    #[error(
        "No requested profile supports the descriptors: {mix_presentations} mix presentations, widest mix has {audio_elements} audio elements and {channels} channels"
    )]
    NoMatchingProfile {
        mix_presentations: usize,
        audio_elements: usize,
        channels: usize,
    },

    #[error("Requested profile set is empty")]
    NoRequestedProfiles,

    #[error("Reserved profile versions cannot be requested")]
    ReservedProfileRequested,

    #[error("No mix presentation offers a layout playable as {requested}, and no fallback exists")]
    NoPlayableMix { requested: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ParameterError {
    #[error("Parameter block references undeclared parameter_id {0}")]
    UnknownParameterId(u32),

    #[error("Subblock durations sum to {actual}, expected duration = {expected}")]
    DurationMismatch { expected: u32, actual: u32 },

    #[error("constant_subblock_duration {csd} cannot cover duration {duration} in {subblocks} subblocks")]
    ConstantSubblockMismatch {
        csd: u32,
        duration: u32,
        subblocks: u32,
    },

    #[error("Invalid animation_type {0}")]
    InvalidAnimationType(u32),

    #[error("Reserved dmixp_mode {0}")]
    ReservedDmixpMode(u8),

    #[error("recon_gain flag bit {0} does not map to a channel of the layer layout")]
    ReconGainFlagOutOfRange(u32),

    #[error("num_subblocks must be at least 1")]
    NoSubblocks,
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Audio frame for unknown audio_substream_id {0}")]
    UnknownSubstream(u32),

    #[error(
        "Trim of {trim_start}+{trim_end} samples exceeds the frame length {frame_length}"
    )]
    TrimExceedsFrame {
        trim_start: u32,
        trim_end: u32,
        frame_length: u32,
    },

    #[error("Substream {substream_id} received a second frame before the temporal unit closed")]
    DuplicateFrame { substream_id: u32 },

    #[error("Temporal unit at timestamp {timestamp} is missing {missing} of {required} substream frames")]
    IncompleteTemporalUnit {
        timestamp: u64,
        missing: usize,
        required: usize,
    },

    #[error("Selected audio elements disagree on frame length: {0} vs {1}")]
    MismatchedFrameLengths(u32, u32),
}

#[derive(thiserror::Error, Debug)]
pub enum DemixError {
    #[error("No audio frame for substream {0} in the temporal unit")]
    MissingFrame(u32),

    #[error("Demix stage input channel {0} is not present in the labeled frame")]
    MissingSourceLabel(&'static str),

    #[error("Demix stage would overwrite authored channel {0}")]
    LabelOverwrite(&'static str),

    #[error("Demixing parameter {name} = {value} cannot be used as a divisor")]
    DegenerateParameter { name: &'static str, value: f64 },

    #[error("Substream {substream_id} decoded {channels} channels, expected {expected}")]
    ChannelCountMismatch {
        substream_id: u32,
        channels: usize,
        expected: usize,
    },

    #[error("Decoded frame for substream {substream_id} has {samples} samples, expected {expected}")]
    SampleCountMismatch {
        substream_id: u32,
        samples: usize,
        expected: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("No rendering path from source layout {source_layout} to target layout {target}")]
    NoRenderingMatrix { source_layout: String, target: String },

    #[error("Channel {0} required by the target layout was not reconstructed")]
    MissingChannel(&'static str),

    #[error("Output buffer of {given} bytes cannot hold the {needed} byte temporal unit")]
    BufferTooSmall { needed: usize, given: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("No codec decoder bound for codec {0}")]
    MissingDecoder(&'static str),

    #[error("LPCM sample_size must be 16, 24 or 32. Read {0}")]
    InvalidSampleSize(u8),

    #[error("LPCM frame payload of {bytes} bytes is not {channels} channels of {expected}-byte samples")]
    PayloadSizeMismatch {
        bytes: usize,
        channels: usize,
        expected: usize,
    },

    #[error("FLAC decoder config does not start with a STREAMINFO block")]
    MissingStreamInfo,

    #[error("Codec config for codec {0} does not carry a sample rate")]
    UnknownSampleRate(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Decode() cannot be called after SignalEndOfDecoding()")]
    DecodeAfterEndOfStream,

    #[error("The decoder is closed")]
    Closed,

    #[error("{0}() cannot be called before descriptor processing is complete")]
    DescriptorsNotReady(&'static str),

    #[error("Output sample type cannot change after PCM has been emitted")]
    SampleTypeLocked,

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}
