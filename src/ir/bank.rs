use log::info;
use realfft::RealFftPlanner;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ir::convolver::{PartitionPlan, Sample, SegmentKernel, SegmentState};
use crate::ir::model::{ImpulseResponse, NormalizedImpulseResponse};
use crate::ir::normalize::Normalization;
use crate::settings::{EngineConfig, IrFormat};

/// Checked index of a bank slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BankId(usize);

impl BankId {
    pub fn new(index: usize, bank_count: usize) -> Result<Self> {
        if index < bank_count {
            Ok(Self(index))
        } else {
            Err(Error::BankIndexOutOfRange {
                index,
                count: bank_count,
            })
        }
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully prepared impulse response: normalized taps, the partition plan
/// and the frequency-domain kernels for every IR channel.
///
/// Immutable once built and shared between the control side and every
/// channel of the engine.
pub struct Bank<T: Sample> {
    id: BankId,
    response: NormalizedImpulseResponse<T>,
    plan: PartitionPlan,
    /// `kernels[ir_channel][segment]`
    kernels: Vec<Vec<SegmentKernel<T>>>,
    format: IrFormat,
}

impl<T: Sample> Bank<T> {
    pub fn build(id: BankId, ir: &ImpulseResponse<T>, config: &EngineConfig) -> Result<Self> {
        let response = Self::check_response(ir, config)?;
        let plan = PartitionPlan::new(response.len(), config.min_partition, config.max_partition)?;

        let mut planner = RealFftPlanner::<T>::new();
        let kernels = (0..response.channel_count())
            .map(|ch| {
                plan.segments()
                    .iter()
                    .map(|desc| SegmentKernel::new(*desc, response.channel(ch), &mut planner))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Built bank {}: {} taps, {} IR channel(s), {} segments, span {}",
            id,
            response.len(),
            response.channel_count(),
            plan.segments().len(),
            plan.span()
        );

        Ok(Self {
            id,
            response,
            plan,
            kernels,
            format: config.ir_format,
        })
    }

    /// Layout and length checks plus normalization, without building any
    /// FFT kernels.
    pub fn check_response(
        ir: &ImpulseResponse<T>,
        config: &EngineConfig,
    ) -> Result<NormalizedImpulseResponse<T>> {
        let expected = match config.ir_format {
            IrFormat::Mono => 1,
            IrFormat::Input => config.channels,
        };
        if ir.channel_count() != expected {
            return Err(Error::ChannelMismatch {
                expected,
                got: ir.channel_count(),
            });
        }

        let max = config.max_ir_taps();
        if ir.len() > max {
            return Err(Error::ImpulseResponseTooLong {
                taps: ir.len(),
                max,
            });
        }

        Normalization::from_config(config).apply(ir)
    }

    pub const fn id(&self) -> BankId {
        self.id
    }

    /// Segment kernels applied to stream channel `channel`.
    pub fn kernels(&self, channel: usize) -> &[SegmentKernel<T>] {
        match self.format {
            IrFormat::Mono => &self.kernels[0],
            IrFormat::Input => &self.kernels[channel],
        }
    }

    pub const fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Samples a freshly started channel state must see before its output
    /// no longer depends on what it held before.
    pub fn span(&self) -> usize {
        self.plan.span()
    }

    pub const fn response(&self) -> &NormalizedImpulseResponse<T> {
        &self.response
    }
}

/// Running state of one bank on one stream channel.
pub struct BankState<T: Sample> {
    segments: Vec<SegmentState<T>>,
}

impl<T: Sample> BankState<T> {
    pub fn new(bank: &Bank<T>, channel: usize) -> Self {
        let quantum = bank.plan.quantum();
        Self {
            segments: bank
                .kernels(channel)
                .iter()
                .map(|kernel| SegmentState::new(kernel, quantum))
                .collect(),
        }
    }

    /// Overwrites `dst` with this bank's output for one quantum of `input`.
    pub fn process(
        &mut self,
        bank: &Bank<T>,
        channel: usize,
        input: &[T],
        dry_gain: T,
        dst: &mut [T],
    ) {
        dst.fill(T::zero());
        for (state, kernel) in self.segments.iter_mut().zip(bank.kernels(channel)) {
            state.process(kernel, input, dry_gain, dst);
        }
    }

    pub fn reset(&mut self) {
        for state in &mut self.segments {
            state.reset();
        }
    }
}

/// A bank plus freshly allocated per-channel state, ready to be moved into
/// the engine without allocating on the processing thread.
///
/// Installing swaps the contents with whatever the slot held, so the same
/// value carries the replaced bank back out to be dropped elsewhere.
pub struct PreparedBank<T: Sample> {
    pub(crate) id: BankId,
    pub(crate) bank: Option<Arc<Bank<T>>>,
    pub(crate) channel_states: Vec<Option<BankState<T>>>,
}

impl<T: Sample> PreparedBank<T> {
    pub fn new(bank: Arc<Bank<T>>, channels: usize) -> Self {
        let channel_states = (0..channels)
            .map(|ch| Some(BankState::new(&bank, ch)))
            .collect();
        Self {
            id: bank.id(),
            bank: Some(bank),
            channel_states,
        }
    }

    pub const fn id(&self) -> BankId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            channels: 2,
            ir_norm: -1.0,
            min_partition: 16,
            max_partition: 64,
            bank_count: 2,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_bank_id_is_checked() {
        assert_eq!(BankId::new(1, 2).unwrap().index(), 1);
        assert!(matches!(
            BankId::new(2, 2),
            Err(Error::BankIndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_mono_bank_broadcasts_kernels() {
        let config = EngineConfig {
            ir_format: IrFormat::Mono,
            ..config()
        };
        let ir = ImpulseResponse::mono(&[1.0f64; 200]).unwrap();
        let bank = Bank::build(BankId(0), &ir, &config).unwrap();

        assert_eq!(bank.kernels(0).len(), bank.plan().segments().len());
        assert_eq!(bank.kernels(1).len(), bank.kernels(0).len());
        assert!(bank.span() >= 200);
    }

    #[test]
    fn test_input_format_requires_matching_channels() {
        let ir = ImpulseResponse::mono(&[1.0f32; 32]).unwrap();
        assert!(matches!(
            Bank::build(BankId(0), &ir, &config()),
            Err(Error::ChannelMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_rejects_overlong_response() {
        let config = EngineConfig {
            ir_format: IrFormat::Mono,
            sample_rate: 1000,
            max_ir_seconds: 0.1,
            ..config()
        };
        let ir = ImpulseResponse::mono(&[0.5f32; 101]).unwrap();
        assert!(matches!(
            Bank::build(BankId(0), &ir, &config),
            Err(Error::ImpulseResponseTooLong { taps: 101, max: 100 })
        ));
    }

    #[test]
    fn test_bank_state_reproduces_impulse_response() {
        let taps: Vec<f64> = (0..150).map(|i| 0.97f64.powi(i)).collect();
        let ir = ImpulseResponse::from_channels(vec![taps.clone(), taps.clone()]).unwrap();
        let bank = Bank::build(BankId(1), &ir, &config()).unwrap();
        let mut state = BankState::new(&bank, 1);

        let quantum = bank.plan().quantum();
        let mut out = Vec::new();
        let mut block = vec![0.0; quantum];
        for q in 0..16 {
            let mut input = vec![0.0; quantum];
            if q == 0 {
                input[0] = 1.0;
            }
            state.process(&bank, 1, &input, 1.0, &mut block);
            out.extend_from_slice(&block);
        }

        for (n, &y) in out.iter().enumerate() {
            let expected = taps.get(n).copied().unwrap_or(0.0);
            assert!((y - expected).abs() < 1e-10, "sample {n}: {y} vs {expected}");
        }
    }
}
