use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::ir::convolver::plan::partition_bounds;

/// Floating-point precision the engine is instantiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

/// When a delivered impulse response is turned into a runnable bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Build as soon as the IR is delivered.
    #[default]
    Eager,
    /// Keep the raw IR and build the first time the bank is selected.
    OnDemand,
}

/// How impulse-response channels map onto stream channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IrFormat {
    /// One IR channel applied to every stream channel.
    Mono,
    /// One IR channel per stream channel.
    #[default]
    Input,
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Channels: {}", self.channels)?;
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        writeln!(f, "Dry Gain: {}", self.dry_gain)?;
        writeln!(f, "Wet Gain: {}", self.wet_gain)?;
        writeln!(f, "IR Length Fraction: {}", self.length)?;
        writeln!(f, "IR Norm Exponent: {}", self.ir_norm)?;
        writeln!(f, "IR Link: {}", self.ir_link)?;
        writeln!(f, "IR Gain: {}", self.ir_gain)?;
        writeln!(f, "IR Format: {:?}", self.ir_format)?;
        writeln!(f, "Max IR Duration: {} s", self.max_ir_seconds)?;
        writeln!(f, "Min Partition: {}", self.min_partition)?;
        writeln!(f, "Max Partition: {}", self.max_partition)?;
        writeln!(f, "Banks: {}", self.bank_count)?;
        writeln!(f, "Selected Bank: {}", self.selected_bank)?;
        writeln!(f, "Precision: {:?}", self.precision)?;
        writeln!(f, "Load Strategy: {:?}", self.load_strategy)?;
        writeln!(f, "Workers: {}", self.workers)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub channels: usize,
    pub sample_rate: u32,
    /// Linear gain applied to the input before convolution.
    pub dry_gain: f64,
    /// Linear gain applied to the convolved output.
    pub wet_gain: f64,
    /// Fraction of each IR to keep, in `(0, 1]`.
    pub length: f64,
    /// IR normalization exponent (negative disables, 0 = sum, p > 0 = Lp norm).
    pub ir_norm: f64,
    /// Apply the smallest channel gain to every IR channel.
    pub ir_link: bool,
    /// Extra linear IR gain.
    pub ir_gain: f64,
    pub ir_format: IrFormat,
    /// Longest accepted IR, in seconds at `sample_rate`.
    pub max_ir_seconds: f64,
    /// Smallest partition; rounded down to a power of two it is the quantum.
    pub min_partition: usize,
    pub max_partition: usize,
    pub bank_count: usize,
    pub selected_bank: usize,
    pub precision: Precision,
    pub load_strategy: LoadStrategy,
    /// Worker threads for the channel fan-out; 0 runs on the caller thread.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48_000,
            dry_gain: 1.0,
            wet_gain: 1.0,
            length: 1.0,
            ir_norm: 1.0,
            ir_link: true,
            ir_gain: 1.0,
            ir_format: IrFormat::Input,
            max_ir_seconds: 30.0,
            min_partition: 256,
            max_partition: 8192,
            bank_count: 1,
            selected_bank: 0,
            precision: Precision::Single,
            load_strategy: LoadStrategy::Eager,
            workers: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        debug!("Parsed engine config");
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("failed to serialize config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channels must be at least 1".into()));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample_rate must be non-zero".into()));
        }
        for (name, value) in [
            ("dry_gain", self.dry_gain),
            ("wet_gain", self.wet_gain),
            ("ir_norm", self.ir_norm),
            ("ir_gain", self.ir_gain),
        ] {
            if !value.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if !(self.length > 0.0 && self.length <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "length must be in (0, 1], got {}",
                self.length
            )));
        }
        if !(self.max_ir_seconds.is_finite() && self.max_ir_seconds > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_ir_seconds must be positive, got {}",
                self.max_ir_seconds
            )));
        }
        partition_bounds(self.min_partition, self.max_partition)?;
        if self.bank_count == 0 {
            return Err(Error::InvalidConfig("bank_count must be at least 1".into()));
        }
        if self.selected_bank >= self.bank_count {
            return Err(Error::BankIndexOutOfRange {
                index: self.selected_bank,
                count: self.bank_count,
            });
        }
        Ok(())
    }

    /// Streaming quantum: the minimum partition rounded down to a power of two.
    pub const fn quantum(&self) -> usize {
        crate::ir::convolver::plan::floor_power_of_two(self.min_partition)
    }

    /// Longest accepted IR in taps.
    pub fn max_ir_taps(&self) -> usize {
        (self.max_ir_seconds * self.sample_rate as f64).ceil() as usize
    }
}
