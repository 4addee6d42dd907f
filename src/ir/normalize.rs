use log::debug;

use crate::error::{Error, Result};
use crate::ir::convolver::Sample;
use crate::ir::model::{ImpulseResponse, NormalizedImpulseResponse};
use crate::settings::EngineConfig;

/// Gain and length parameters applied to a raw impulse response before
/// partitioning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Norm exponent: negative disables, zero divides by the tap sum,
    /// positive divides by the Lp norm.
    pub exponent: f64,
    /// Use the smallest per-channel gain for every channel.
    pub link: bool,
    /// Extra linear gain on top of the normalization gain.
    pub gain: f64,
    /// Fraction of the raw taps to keep, in `(0, 1]`.
    pub length: f64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            exponent: -1.0,
            link: false,
            gain: 1.0,
            length: 1.0,
        }
    }
}

impl Normalization {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            exponent: config.ir_norm,
            link: config.ir_link,
            gain: config.ir_gain,
            length: config.length,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.exponent.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "normalization exponent must be finite, got {}",
                self.exponent
            )));
        }
        if !self.gain.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "IR gain must be finite, got {}",
                self.gain
            )));
        }
        if !(self.length > 0.0 && self.length <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "IR length fraction must be in (0, 1], got {}",
                self.length
            )));
        }
        Ok(())
    }

    /// Number of taps kept from a raw response of `taps` samples.
    pub fn truncated_len(&self, taps: usize) -> usize {
        ((self.length * taps as f64) as usize).clamp(1, taps.max(1))
    }

    pub fn apply<T: Sample>(
        &self,
        ir: &ImpulseResponse<T>,
    ) -> Result<NormalizedImpulseResponse<T>> {
        self.validate()?;
        if ir.is_empty() {
            return Err(Error::EmptyImpulseResponse);
        }

        let keep = self.truncated_len(ir.len());
        let mut channels: Vec<Vec<T>> = ir
            .channels()
            .iter()
            .map(|taps| taps[..keep].to_vec())
            .collect();

        let mut gains = channels
            .iter()
            .enumerate()
            .map(|(channel, taps)| {
                channel_gain(taps, self.exponent)
                    .map_err(|reason| Error::DegenerateGain { channel, reason })
            })
            .collect::<Result<Vec<f64>>>()?;

        if self.link
            && let Some(min) = gains.iter().copied().reduce(f64::min)
        {
            gains.fill(min);
        }

        for (taps, gain) in channels.iter_mut().zip(gains.iter_mut()) {
            *gain *= self.gain;
            let scale = T::lit(*gain);
            for tap in taps.iter_mut() {
                *tap = *tap * scale;
            }
        }

        debug!(
            "Normalized IR: {} -> {} taps, gains {:?}",
            ir.len(),
            keep,
            gains
        );

        Ok(NormalizedImpulseResponse { channels, gains })
    }
}

fn channel_gain<T: Sample>(taps: &[T], exponent: f64) -> Result<f64, &'static str> {
    if exponent < 0.0 {
        return Ok(1.0);
    }

    let norm = if exponent == 0.0 {
        taps.iter().fold(0.0, |acc, &t| acc + t.as_f64())
    } else {
        taps.iter()
            .fold(0.0, |acc, &t| acc + t.as_f64().abs().powf(exponent))
            .powf(exponent.recip())
    };

    if !norm.is_finite() {
        return Err("tap norm is not finite");
    }
    if norm == 0.0 {
        return Err(if exponent == 0.0 {
            "sum of taps is zero"
        } else {
            "all taps are zero"
        });
    }

    let gain = norm.recip();
    if gain.is_finite() {
        Ok(gain)
    } else {
        Err("normalization gain overflows")
    }
}
