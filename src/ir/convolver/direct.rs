use super::Sample;

/// Time-domain FIR convolver using a ring buffer.
///
/// Zero latency, O(taps) per sample. Used as the reference the partitioned
/// engine is checked against.
pub struct DirectConvolver<T> {
    /// IR taps in original order
    taps: Vec<T>,
    /// Ring buffer for input history
    history: Vec<T>,
    write_pos: usize,
}

impl<T: Sample> DirectConvolver<T> {
    pub fn new(taps: &[T]) -> Self {
        Self {
            taps: taps.to_vec(),
            history: vec![T::zero(); taps.len().max(1)],
            write_pos: 0,
        }
    }

    #[inline]
    pub fn process_sample(&mut self, input: T) -> T {
        if self.taps.is_empty() {
            return T::zero();
        }

        let len = self.history.len();
        self.history[self.write_pos] = input;

        let mut output = T::zero();
        let mut idx = self.write_pos;
        for &tap in &self.taps {
            output = tap.mul_add(self.history[idx], output);
            idx = if idx == 0 { len - 1 } else { idx - 1 };
        }

        self.write_pos = (self.write_pos + 1) % len;

        output
    }

    pub fn process_block(&mut self, samples: &mut [T]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(T::zero());
        self.write_pos = 0;
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}
