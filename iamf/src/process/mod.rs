//! Processing functionality for IAMF bitstreams.
//!
//! 1. **OBU Parsing** ([`parse`]): Extracts typed OBUs from buffered data
//!    under the resumable "insufficient data" contract.
//!
//! 2. **Descriptor Handling** ([`descriptors`]): Accumulates, seals and
//!    validates descriptors; filters profiles; selects the mix.
//!
//! 3. **Assembly** ([`temporal_unit`]): Groups frames and parameter blocks
//!    into complete temporal units.
//!
//! 4. **Demixing** ([`demix`]): Reconstructs scalable layers and ambisonics
//!    scenes from decoded substreams.
//!
//! 5. **Rendering** ([`render`], [`reorder`]): Projects to the target layout
//!    and produces interleaved PCM.
//!
//! 6. **Decoding** ([`decode`]): The pipeline controller gluing it together.

pub mod codec;
pub mod decode;
pub mod demix;
pub mod descriptors;
pub mod parse;
pub mod render;
pub mod reorder;
pub mod temporal_unit;
