//! IA Sequence Header structures.
//!
//! One IA Sequence Header opens every IA sequence; its four-character code
//! must spell "iamf" and its two profile fields bound what the rest of the
//! descriptors may use.

use anyhow::{Result, bail};

use crate::api::ProfileVersion;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::SequenceError;

/// The required four-character code, ASCII "iamf".
pub const IA_CODE: u32 = 0x6961_6D66;

#[derive(Debug, Clone, Copy)]
pub struct IaSequenceHeader {
    pub primary_profile: ProfileVersion,
    pub additional_profile: ProfileVersion,
}

impl IaSequenceHeader {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let ia_code: u32 = reader.get_n(32)?;
        if ia_code != IA_CODE {
            bail!(SequenceError::InvalidIaCode(ia_code));
        }

        Ok(Self {
            primary_profile: ProfileVersion::from_bits(reader.get_n(8)?),
            additional_profile: ProfileVersion::from_bits(reader.get_n(8)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profiles() -> Result<()> {
        let mut reader = BsIoSliceReader::from_slice(&[b'i', b'a', b'm', b'f', 0, 2]);
        let header = IaSequenceHeader::read(&mut reader)?;

        assert_eq!(header.primary_profile, ProfileVersion::Simple);
        assert_eq!(header.additional_profile, ProfileVersion::BaseEnhanced);
        Ok(())
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut reader = BsIoSliceReader::from_slice(&[b'i', b'a', b'm', b'g', 0, 0]);
        assert!(IaSequenceHeader::read(&mut reader).is_err());
    }
}
