//! Parameter definitions and parameter blocks.
//!
//! ## Definitions
//!
//! Audio elements and mix presentations declare parameters up front: id,
//! rate, and (in mode 0) the fixed subblock timing every block of that id
//! follows. Parameter blocks in the temporal units then carry the animated
//! values.
//!
//! ## Subblock timing
//!
//! Subblock durations either come per subblock or derive from
//! `constant_subblock_duration` with one optional shorter tail so the
//! subblocks exactly cover `duration`.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::structs::channel::LoudspeakerLayout;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ParameterError;

/// Number of channel positions addressable by a recon gain flag mask.
pub const RECON_GAIN_CHANNELS: u32 = 12;

/// The common shape of a parameter declaration.
#[derive(Debug, Clone, Default)]
pub struct ParamDefinition {
    pub parameter_id: u32,
    pub parameter_rate: u32,
    /// Mode 1 leaves timing to each parameter block.
    pub param_definition_mode: bool,
    pub duration: u32,
    pub constant_subblock_duration: u32,
    pub subblock_durations: Vec<u32>,
}

impl ParamDefinition {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut definition = Self {
            parameter_id: reader.get_uleb128()?,
            parameter_rate: reader.get_uleb128()?,
            param_definition_mode: reader.get()?,
            ..Default::default()
        };
        reader.skip_n(7)?;

        if !definition.param_definition_mode {
            definition.duration = reader.get_uleb128()?;
            definition.constant_subblock_duration = reader.get_uleb128()?;

            if definition.constant_subblock_duration == 0 {
                let num_subblocks = reader.get_uleb128()?;
                for _ in 0..num_subblocks {
                    definition.subblock_durations.push(reader.get_uleb128()?);
                }
                validate_explicit_durations(definition.duration, &definition.subblock_durations)?;
            }
        }

        Ok(definition)
    }

    /// The subblock durations every block of this definition follows.
    pub fn resolved_durations(&self) -> Result<Vec<u32>> {
        if self.constant_subblock_duration == 0 {
            Ok(self.subblock_durations.clone())
        } else {
            constant_durations(self.duration, self.constant_subblock_duration)
        }
    }
}

fn validate_explicit_durations(duration: u32, subblocks: &[u32]) -> Result<()> {
    if subblocks.is_empty() {
        bail!(ParameterError::NoSubblocks);
    }

    let total: u32 = subblocks.iter().sum();
    if total != duration {
        bail!(ParameterError::DurationMismatch {
            expected: duration,
            actual: total,
        });
    }
    Ok(())
}

/// Expands `constant_subblock_duration` coverage of `duration`.
///
/// At most the final subblock may be shorter; anything else is malformed.
fn constant_durations(duration: u32, csd: u32) -> Result<Vec<u32>> {
    if csd == 0 || duration == 0 {
        bail!(ParameterError::NoSubblocks);
    }
    let num_subblocks = duration.div_ceil(csd);

    let mut durations = vec![csd; num_subblocks as usize];
    let tail = duration - csd * (num_subblocks - 1);
    if tail == 0 || tail > csd {
        bail!(ParameterError::ConstantSubblockMismatch {
            csd,
            duration,
            subblocks: num_subblocks,
        });
    }
    *durations.last_mut().unwrap() = tail;

    Ok(durations)
}

/// Gain animation of one mix-gain subblock, in Q7.8 dB points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainAnimation {
    Step {
        start: i16,
    },
    Linear {
        start: i16,
        end: i16,
    },
    Bezier {
        start: i16,
        end: i16,
        control: i16,
        /// Q0.8 position of the control point on the subblock's time axis.
        control_relative_time: u8,
    },
}

impl GainAnimation {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let animation_type = reader.get_uleb128()?;
        Ok(match animation_type {
            0 => Self::Step {
                start: reader.get_s(16)?,
            },
            1 => Self::Linear {
                start: reader.get_s(16)?,
                end: reader.get_s(16)?,
            },
            2 => Self::Bezier {
                start: reader.get_s(16)?,
                end: reader.get_s(16)?,
                control: reader.get_s(16)?,
                control_relative_time: reader.get_n(8)?,
            },
            other => bail!(ParameterError::InvalidAnimationType(other)),
        })
    }

    /// Gain in dB at relative time `t` within the subblock, `0 <= t < 1`.
    pub fn value_db_at(&self, t: f64) -> f64 {
        match *self {
            Self::Step { start } => q7_8_to_db(start),
            Self::Linear { start, end } => {
                q7_8_to_db(start) + (q7_8_to_db(end) - q7_8_to_db(start)) * t
            }
            Self::Bezier {
                start,
                end,
                control,
                control_relative_time,
            } => {
                let t_control = control_relative_time as f64 / 255.0;

                // Solve the quadratic time curve 2(1-a)a*tc + a^2 = t for the
                // bezier parameter, then evaluate the value curve at it.
                let a = if (2.0 * t_control - 1.0).abs() < 1e-9 {
                    t
                } else {
                    let alpha = 1.0 - 2.0 * t_control;
                    (-t_control + (t_control * t_control + alpha * t).sqrt()) / alpha
                };

                let (p0, p1, p2) = (q7_8_to_db(start), q7_8_to_db(control), q7_8_to_db(end));
                (1.0 - a) * (1.0 - a) * p0 + 2.0 * (1.0 - a) * a * p1 + a * a * p2
            }
        }
    }
}

/// Converts a Q7.8 fixed-point dB value to floating dB.
pub fn q7_8_to_db(q: i16) -> f64 {
    q as f64 / 256.0
}

/// Converts a Q7.8 fixed-point dB value to a linear gain.
pub fn q7_8_to_linear(q: i16) -> f64 {
    10f64.powf(q7_8_to_db(q) / 20.0)
}

/// Demixing info carried per subblock.
#[derive(Debug, Clone, Copy)]
pub struct DemixingInfoParameterData {
    pub dmixp_mode: u8,
}

impl DemixingInfoParameterData {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let dmixp_mode: u8 = reader.get_n(3)?;
        reader.skip_n(5)?;

        if matches!(dmixp_mode, 3 | 7) {
            bail!(ParameterError::ReservedDmixpMode(dmixp_mode));
        }

        Ok(Self { dmixp_mode })
    }
}

/// Recon gains of one layer: a flag mask and one value per set bit.
#[derive(Debug, Clone)]
pub struct ReconGainElement {
    pub recon_gain_flag: u32,
    /// Values aligned with the set bits of the mask, lowest bit first.
    pub recon_gains: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReconGainInfoParameterData {
    /// One entry per channel-audio layer; `None` where the layer carries no
    /// recon gain.
    pub layers: Vec<Option<ReconGainElement>>,
}

impl ReconGainInfoParameterData {
    pub fn read(reader: &mut BsIoSliceReader, layers: &[ReconLayerSpec]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(layers.len());

        for layer in layers {
            if !layer.recon_gain_is_present {
                parsed.push(None);
                continue;
            }

            let recon_gain_flag = reader.get_uleb128()?;
            if recon_gain_flag >> RECON_GAIN_CHANNELS != 0 {
                bail!(ParameterError::ReconGainFlagOutOfRange(
                    32 - recon_gain_flag.leading_zeros() - 1
                ));
            }

            let mut recon_gains = Vec::new();
            for bit in 0..RECON_GAIN_CHANNELS {
                if recon_gain_flag >> bit & 1 != 0 {
                    recon_gains.push(reader.get_n(8)?);
                }
            }

            parsed.push(Some(ReconGainElement {
                recon_gain_flag,
                recon_gains,
            }));
        }

        Ok(Self { layers: parsed })
    }
}

/// What a parameter id animates, resolved from the descriptors.
#[derive(Debug, Clone)]
pub enum ParamKind {
    MixGain,
    Demixing,
    ReconGain(Vec<ReconLayerSpec>),
    Extension,
}

/// Per-layer facts recon gain parsing needs.
#[derive(Debug, Clone, Copy)]
pub struct ReconLayerSpec {
    pub layout: LoudspeakerLayout,
    pub recon_gain_is_present: bool,
}

/// A parameter declaration joined with its kind, indexed by parameter id.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub definition: ParamDefinition,
}

#[derive(Debug, Clone)]
pub enum ParameterData {
    MixGain(GainAnimation),
    Demixing(DemixingInfoParameterData),
    ReconGain(ReconGainInfoParameterData),
    Extension(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ParameterSubblock {
    pub duration: u32,
    pub data: ParameterData,
}

/// A Parameter Block OBU, parsed against its declaration.
#[derive(Debug, Clone)]
pub struct ParameterBlockObu {
    pub parameter_id: u32,
    pub duration: u32,
    pub subblocks: Vec<ParameterSubblock>,
}

impl ParameterBlockObu {
    pub fn read(reader: &mut BsIoSliceReader, specs: &HashMap<u32, ParamSpec>) -> Result<Self> {
        let parameter_id = reader.get_uleb128()?;

        let Some(spec) = specs.get(&parameter_id) else {
            bail!(ParameterError::UnknownParameterId(parameter_id));
        };

        // Mode-1 definitions leave the timing to each block.
        let (duration, explicit_in_block, constant_subblock_duration) =
            if spec.definition.param_definition_mode {
                let duration = reader.get_uleb128()?;
                let csd = reader.get_uleb128()?;
                let num_subblocks = if csd == 0 { reader.get_uleb128()? } else { 0 };
                (duration, Some(num_subblocks), csd)
            } else {
                (
                    spec.definition.duration,
                    None,
                    spec.definition.constant_subblock_duration,
                )
            };

        // With an in-block explicit form the per-subblock durations are
        // interleaved with the payloads; placeholders mark those slots.
        let (durations, interleaved) = match explicit_in_block {
            Some(num_subblocks) if constant_subblock_duration == 0 => {
                if num_subblocks == 0 {
                    bail!(ParameterError::NoSubblocks);
                }
                (vec![0u32; num_subblocks as usize], true)
            }
            Some(_) => (constant_durations(duration, constant_subblock_duration)?, false),
            None if constant_subblock_duration == 0 => {
                (spec.definition.resolved_durations()?, false)
            }
            None => (constant_durations(duration, constant_subblock_duration)?, false),
        };

        let mut subblocks = Vec::with_capacity(durations.len());
        let mut total = 0u32;
        for expected in &durations {
            let subblock_duration = if interleaved {
                reader.get_uleb128()?
            } else {
                *expected
            };
            total += subblock_duration;

            let data = match &spec.kind {
                ParamKind::MixGain => ParameterData::MixGain(GainAnimation::read(reader)?),
                ParamKind::Demixing => {
                    ParameterData::Demixing(DemixingInfoParameterData::read(reader)?)
                }
                ParamKind::ReconGain(layers) => {
                    ParameterData::ReconGain(ReconGainInfoParameterData::read(reader, layers)?)
                }
                ParamKind::Extension => {
                    let size = reader.get_uleb128()?;
                    ParameterData::Extension(reader.get_bytes(size as usize)?)
                }
            };

            subblocks.push(ParameterSubblock {
                duration: subblock_duration,
                data,
            });
        }

        if total != duration {
            bail!(ParameterError::DurationMismatch {
                expected: duration,
                actual: total,
            });
        }

        Ok(Self {
            parameter_id,
            duration,
            subblocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_durations_cover_exactly() -> Result<()> {
        assert_eq!(constant_durations(8, 8)?, vec![8]);
        assert_eq!(constant_durations(10, 4)?, vec![4, 4, 2]);
        assert!(constant_durations(8, 0).is_err());
        Ok(())
    }

    #[test]
    fn explicit_durations_must_sum() {
        assert!(validate_explicit_durations(8, &[4, 4]).is_ok());
        assert!(validate_explicit_durations(8, &[4, 3]).is_err());
        assert!(validate_explicit_durations(8, &[]).is_err());
    }

    #[test]
    fn step_and_linear_animation() {
        let step = GainAnimation::Step { start: -256 };
        assert_eq!(step.value_db_at(0.0), -1.0);
        assert_eq!(step.value_db_at(0.9), -1.0);

        let linear = GainAnimation::Linear {
            start: 0,
            end: -512,
        };
        assert_eq!(linear.value_db_at(0.0), 0.0);
        assert!((linear.value_db_at(0.5) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn bezier_hits_endpoints() {
        let bezier = GainAnimation::Bezier {
            start: 0,
            end: -512,
            control: -1024,
            control_relative_time: 64,
        };
        assert!((bezier.value_db_at(0.0)).abs() < 1e-6);
        assert!(bezier.value_db_at(0.5) < 0.0);
    }

    #[test]
    fn q7_8_conversions() {
        assert_eq!(q7_8_to_db(256), 1.0);
        assert_eq!(q7_8_to_db(-512), -2.0);
        assert!((q7_8_to_linear(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mode0_mix_gain_block() -> Result<()> {
        let definition = ParamDefinition {
            parameter_id: 9,
            parameter_rate: 48_000,
            param_definition_mode: false,
            duration: 8,
            constant_subblock_duration: 8,
            ..Default::default()
        };
        let mut specs = HashMap::new();
        specs.insert(
            9,
            ParamSpec {
                kind: ParamKind::MixGain,
                definition,
            },
        );

        // parameter_id = 9, animation step, start = -256 (Q7.8 for -1 dB).
        let bytes = [0x09, 0x00, 0xFF, 0x00];
        let block = ParameterBlockObu::read(&mut BsIoSliceReader::from_slice(&bytes), &specs)?;

        assert_eq!(block.parameter_id, 9);
        assert_eq!(block.duration, 8);
        assert_eq!(block.subblocks.len(), 1);
        assert!(matches!(
            block.subblocks[0].data,
            ParameterData::MixGain(GainAnimation::Step { start: -256 })
        ));
        Ok(())
    }

    #[test]
    fn unknown_parameter_id_is_fatal() {
        let specs = HashMap::new();
        let bytes = [0x07];
        assert!(ParameterBlockObu::read(&mut BsIoSliceReader::from_slice(&bytes), &specs).is_err());
    }
}
