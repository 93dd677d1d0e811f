#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Parser and decoder for IAMF bitstreams according to the IA sequence syntax.
//!
//! ### Bitstream Organization
//!
//! **Descriptors**: IA Sequence Header, Codec Configs, Audio Elements and Mix
//! Presentations, sent once at the head of the sequence.
//! **Temporal Units**: one audio frame per active substream plus any parameter
//! blocks sharing the same start timestamp.
//!
//! ### Audio Elements
//!
//! - Channel-based scalable layouts (mono up to 7.1.4, binaural)
//! - Scene-based ambisonics up to fourth order (mono and projection modes)
//!
//! ## Quick Start
//!
//! Steps for decoding a stream:
//!
//! 1. Create an [`IamfDecoder`](process::decode::IamfDecoder) with the target
//!    layout in its [`Settings`](api::Settings)
//! 2. Feed bytes with [`decode`](process::decode::IamfDecoder::decode) as they
//!    arrive
//! 3. Drain rendered PCM with
//!    [`get_output_temporal_unit`](process::decode::IamfDecoder::get_output_temporal_unit)
//!
//! ```rust,no_run
//! use iamf::api::{OutputLayout, Settings};
//! use iamf::process::decode::IamfDecoder;
//!
//! let settings = Settings {
//!     requested_layout: OutputLayout::SoundSystemA0_2_0,
//!     ..Settings::default()
//! };
//! let mut decoder = IamfDecoder::new(settings)?;
//!
//! let chunk: &[u8] = &[]; // bytes from the transport
//! decoder.decode(chunk)?;
//!
//! if decoder.is_descriptor_processing_complete() {
//!     let mut pcm = vec![0u8; 65536];
//!     while decoder.is_temporal_unit_available() {
//!         let written = decoder.get_output_temporal_unit(&mut pcm)?;
//!         // playback(&pcm[..written]);
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Public decoder-facing types.
///
/// - **Settings** ([`api::Settings`]): creation-time configuration
/// - **Layouts** ([`api::OutputLayout`]): supported playback layouts
/// - **Profiles** ([`api::ProfileVersion`]): IAMF profile versions
pub mod api;

/// Processing functionality for IAMF bitstreams.
///
/// 1. **OBU Parsing** ([`process::parse`]): Extracts typed OBUs from the
///    append-only read buffer under a resumable "insufficient data" contract.
///
/// 2. **Descriptor Handling** ([`process::descriptors`]): Accumulates and
///    seals descriptor OBUs, filters profiles, selects a mix presentation.
///
/// 3. **Demixing** ([`process::demix`]): Reconstructs the top channel layer of
///    each audio element from its substreams.
///
/// 4. **Rendering** ([`process::render`]): Projects labeled channels into the
///    target loudspeaker layout and interleaves PCM.
///
/// 5. **Decoding** ([`process::decode`]): The iterative pipeline controller.
pub mod process;

/// Data structures representing IAMF format components.
///
/// - **OBUs** ([`structs::obu`]): Common header and tagged payloads
/// - **Sequence Header** ([`structs::sequence_header`]): Profiles and magic
/// - **Codec Configs** ([`structs::codec_config`]): Per-codec decoder setup
/// - **Audio Elements** ([`structs::audio_element`]): Substream topology
/// - **Mix Presentations** ([`structs::mix_presentation`]): Submixes, layouts
/// - **Parameter Blocks** ([`structs::parameter_block`]): Animated parameters
/// - **Audio Frames** ([`structs::audio_frame`]): Compressed payloads
/// - **Channels** ([`structs::channel`]): Labels and loudspeaker layouts
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Read Buffer** ([`utils::read_bit_buffer`]): Append-only byte queue with
///   a bit cursor
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bounded payload readers
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
