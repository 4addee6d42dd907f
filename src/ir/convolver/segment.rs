use log::error;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use super::Sample;
use super::plan::SegmentDescriptor;
use super::vector::{add_into, complex_mul_add};
use crate::error::{Error, Result};

/// Read-only half of a segment: the frequency-domain IR partitions and the
/// FFT plans. Shared by every stream running the same bank.
pub struct SegmentKernel<T: Sample> {
    descriptor: SegmentDescriptor,
    /// One spectral block per partition, pre-scaled by `1 / transform_size`.
    coefficients: Vec<Vec<Complex<T>>>,
    r2c: Arc<dyn RealToComplex<T>>,
    c2r: Arc<dyn ComplexToReal<T>>,
}

impl<T: Sample> SegmentKernel<T> {
    /// Transforms the taps `descriptor` covers. Taps past the end of `taps`
    /// are treated as zero.
    pub fn new(
        descriptor: SegmentDescriptor,
        taps: &[T],
        planner: &mut RealFftPlanner<T>,
    ) -> Result<Self> {
        let part = descriptor.partition_size;
        let r2c = planner.plan_fft_forward(descriptor.transform_size);
        let c2r = planner.plan_fft_inverse(descriptor.transform_size);

        let scale = T::one() / T::lit(descriptor.transform_size as f64);
        let mut time_block = r2c.make_input_vec();
        let mut scratch = r2c.make_scratch_vec();
        let mut coefficients = Vec::with_capacity(descriptor.partition_count);

        for p in 0..descriptor.partition_count {
            let start = (descriptor.time_offset + p * part).min(taps.len());
            let end = (start + part).min(taps.len());

            time_block.fill(T::zero());
            for (dst, &tap) in time_block.iter_mut().zip(&taps[start..end]) {
                *dst = tap * scale;
            }

            let mut freq_block = r2c.make_output_vec();
            r2c.process_with_scratch(&mut time_block, &mut freq_block, &mut scratch)
                .map_err(|e| Error::Fft(format!("IR partitioning failed: {e}")))?;

            coefficients.push(freq_block);
        }

        Ok(Self {
            descriptor,
            coefficients,
            r2c,
            c2r,
        })
    }

    pub const fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }
}

/// Mutable half of a segment for one channel: input delay line, spectral
/// history, overlap-add carry and scratch.
pub struct SegmentState<T: Sample> {
    partition_size: usize,
    quantum: usize,
    input_delay: usize,

    // Time-domain input ring (power-of-two capacity)
    ring: Vec<T>,
    ring_mask: usize,
    ring_write: usize,

    // Frequency-domain input history, one block per partition
    history: Vec<Vec<Complex<T>>>,
    part_index: usize,

    // Output block from the last firing, read a quantum at a time
    output: Vec<T>,
    output_offset: usize,
    // Second half of the last inverse transform
    carry: Vec<T>,

    // Scratch buffers
    time_scratch: Vec<T>,
    accumulator: Vec<Complex<T>>,
    r2c_scratch: Vec<Complex<T>>,
    c2r_scratch: Vec<Complex<T>>,

    fft_failed: bool,
}

impl<T: Sample> SegmentState<T> {
    pub fn new(kernel: &SegmentKernel<T>, quantum: usize) -> Self {
        let desc = kernel.descriptor;
        debug_assert!(desc.partition_size.is_multiple_of(quantum));

        let capacity = desc.input_ring_size.next_power_of_two();
        let zero = Complex::new(T::zero(), T::zero());

        Self {
            partition_size: desc.partition_size,
            quantum,
            input_delay: desc.input_delay(),

            ring: vec![T::zero(); capacity],
            ring_mask: capacity - 1,
            ring_write: 0,

            history: vec![vec![zero; desc.coefficient_size]; desc.partition_count],
            part_index: 0,

            output: vec![T::zero(); desc.partition_size],
            output_offset: desc.partition_size - quantum,
            carry: vec![T::zero(); desc.partition_size],

            time_scratch: vec![T::zero(); desc.transform_size],
            accumulator: vec![zero; desc.coefficient_size],
            r2c_scratch: kernel.r2c.make_scratch_vec(),
            c2r_scratch: kernel.c2r.make_scratch_vec(),

            fft_failed: false,
        }
    }

    /// Feeds one quantum of input and adds this segment's contribution for
    /// the same quantum into `dst`.
    pub fn process(&mut self, kernel: &SegmentKernel<T>, input: &[T], dry_gain: T, dst: &mut [T]) {
        debug_assert_eq!(input.len(), self.quantum);
        debug_assert_eq!(dst.len(), self.quantum);

        for &x in input {
            self.ring[self.ring_write] = x * dry_gain;
            self.ring_write = (self.ring_write + 1) & self.ring_mask;
        }

        self.output_offset += self.quantum;
        if self.output_offset == self.partition_size {
            self.output_offset = 0;
            self.fire(kernel);
        }

        let start = self.output_offset;
        add_into(dst, &self.output[start..start + self.quantum]);
    }

    /// Transforms the completed partition window, runs the frequency-domain
    /// delay line against every coefficient block and overlap-adds the result.
    fn fire(&mut self, kernel: &SegmentKernel<T>) {
        let part = self.partition_size;

        // Window of `part` samples ending `input_delay` samples before the newest one
        let start = self
            .ring_write
            .wrapping_sub(self.input_delay + part)
            & self.ring_mask;
        for (i, dst) in self.time_scratch[..part].iter_mut().enumerate() {
            *dst = self.ring[(start + i) & self.ring_mask];
        }
        self.time_scratch[part..].fill(T::zero());

        if let Err(e) = kernel.r2c.process_with_scratch(
            &mut self.time_scratch,
            &mut self.history[self.part_index],
            &mut self.r2c_scratch,
        ) {
            self.fail(&e);
            return;
        }

        let zero = Complex::new(T::zero(), T::zero());
        self.accumulator.fill(zero);

        let count = self.history.len();
        for (k, coeffs) in kernel.coefficients.iter().enumerate() {
            // Newest block pairs with the first partition
            let h = (self.part_index + count - k) % count;
            complex_mul_add(&mut self.accumulator, &self.history[h], coeffs);
        }

        if let Err(e) = kernel.c2r.process_with_scratch(
            &mut self.accumulator,
            &mut self.time_scratch,
            &mut self.c2r_scratch,
        ) {
            self.fail(&e);
            return;
        }

        let (head, tail) = self.time_scratch.split_at(part);
        for ((out, carry), (&h, &t)) in self
            .output
            .iter_mut()
            .zip(self.carry.iter_mut())
            .zip(head.iter().zip(tail))
        {
            *out = h + *carry;
            *carry = t;
        }

        self.part_index = (self.part_index + 1) % count;
    }

    fn fail(&mut self, e: &realfft::FftError) {
        if !self.fft_failed {
            error!("Segment FFT failed, emitting silence: {e}");
            self.fft_failed = true;
        }
        self.output.fill(T::zero());
        self.part_index = (self.part_index + 1) % self.history.len();
    }

    pub fn reset(&mut self) {
        let zero = Complex::new(T::zero(), T::zero());

        self.ring.fill(T::zero());
        self.ring_write = 0;

        for block in &mut self.history {
            block.fill(zero);
        }
        self.part_index = 0;

        self.output.fill(T::zero());
        self.output_offset = self.partition_size - self.quantum;
        self.carry.fill(T::zero());

        self.time_scratch.fill(T::zero());
        self.accumulator.fill(zero);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::convolver::PartitionPlan;

    fn run_segments(taps: &[f64], min: usize, max: usize, input: &[f64]) -> Vec<f64> {
        let plan = PartitionPlan::new(taps.len(), min, max).unwrap();
        let quantum = plan.quantum();
        let mut planner = RealFftPlanner::<f64>::new();
        let kernels: Vec<_> = plan
            .segments()
            .iter()
            .map(|d| SegmentKernel::new(*d, taps, &mut planner).unwrap())
            .collect();
        let mut states: Vec<_> = kernels.iter().map(|k| SegmentState::new(k, quantum)).collect();

        let mut out = Vec::new();
        let mut block = vec![0.0; quantum];
        for chunk in input.chunks(quantum) {
            let mut padded = chunk.to_vec();
            padded.resize(quantum, 0.0);
            block.fill(0.0);
            for (state, kernel) in states.iter_mut().zip(&kernels) {
                state.process(kernel, &padded, 1.0, &mut block);
            }
            out.extend_from_slice(&block);
        }
        out
    }

    fn direct(taps: &[f64], input: &[f64]) -> Vec<f64> {
        (0..input.len())
            .map(|n| {
                taps.iter()
                    .enumerate()
                    .take(n + 1)
                    .map(|(j, &h)| h * input[n - j])
                    .sum::<f64>()
            })
            .collect()
    }

    #[test]
    fn test_single_segment_impulse() {
        let taps = [1.0, 0.5, 0.25];
        let mut input = vec![0.0; 32];
        input[0] = 1.0;

        let out = run_segments(&taps, 8, 8, &input);

        assert!((out[0] - 1.0).abs() < 1e-12);
        assert!((out[1] - 0.5).abs() < 1e-12);
        assert!((out[2] - 0.25).abs() < 1e-12);
        assert!(out[3..].iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_non_uniform_matches_direct() {
        let taps: Vec<f64> = (0..700)
            .map(|i| ((i * 37 % 101) as f64 / 101.0 - 0.5) * 0.99f64.powi(i))
            .collect();
        let input: Vec<f64> = (0..2048)
            .map(|i| (i as f64 * 0.05).sin() + ((i * 13 % 7) as f64 - 3.0) * 0.1)
            .collect();

        let out = run_segments(&taps, 16, 128, &input);
        let expected = direct(&taps, &input);

        for (n, (a, b)) in out.iter().zip(&expected).enumerate() {
            assert!((a - b).abs() < 1e-9, "sample {n}: {a} vs {b}");
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let taps: Vec<f64> = (0..300).map(|i| 1.0 / (i + 1) as f64).collect();
        let plan = PartitionPlan::new(taps.len(), 32, 64).unwrap();
        let mut planner = RealFftPlanner::<f64>::new();
        let kernel = SegmentKernel::new(plan.segments()[1], &taps, &mut planner).unwrap();
        let mut state = SegmentState::new(&kernel, plan.quantum());

        let ones = vec![1.0; 32];
        let mut dst = vec![0.0; 32];
        for _ in 0..10 {
            state.process(&kernel, &ones, 1.0, &mut dst);
        }

        state.reset();
        let zeros = vec![0.0; 32];
        for _ in 0..10 {
            dst.fill(0.0);
            state.process(&kernel, &zeros, 1.0, &mut dst);
            assert!(dst.iter().all(|&v| v == 0.0));
        }
    }
}
