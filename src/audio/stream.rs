use std::collections::VecDeque;

use crate::audio::block::AudioBlock;
use crate::audio::engine::Engine;
use crate::error::{Error, Result};
use crate::ir::convolver::Sample;

/// Buffers host blocks of any size and feeds the engine whole quanta.
pub struct StreamAdapter<T: Sample> {
    quantum: usize,
    fifo: Vec<VecDeque<T>>,
    input: AudioBlock<T>,
}

impl<T: Sample> StreamAdapter<T> {
    pub fn new(channels: usize, quantum: usize) -> Self {
        Self {
            quantum,
            fifo: (0..channels)
                .map(|_| VecDeque::with_capacity(quantum * 4))
                .collect(),
            input: AudioBlock::new(channels, quantum),
        }
    }

    pub fn for_engine(engine: &Engine<T>) -> Self {
        Self::new(engine.config().channels, engine.quantum())
    }

    /// Appends one host block, given as one slice per channel.
    pub fn push(&mut self, channels: &[&[T]]) -> Result<()> {
        if channels.len() != self.fifo.len() {
            return Err(Error::ChannelMismatch {
                expected: self.fifo.len(),
                got: channels.len(),
            });
        }
        let frames = channels.first().map_or(0, |c| c.len());
        if let Some(bad) = channels.iter().find(|c| c.len() != frames) {
            return Err(Error::BlockSizeMismatch {
                expected: frames,
                got: bad.len(),
            });
        }

        for (fifo, samples) in self.fifo.iter_mut().zip(channels) {
            fifo.extend(samples.iter().copied());
        }
        Ok(())
    }

    /// Frames waiting to be processed.
    pub fn buffered(&self) -> usize {
        self.fifo.first().map_or(0, VecDeque::len)
    }

    /// Processes one quantum into `output` if enough input is buffered.
    /// Returns `Ok(false)` without touching `output` otherwise.
    pub fn pull(&mut self, engine: &mut Engine<T>, output: &mut AudioBlock<T>) -> Result<bool> {
        if self.buffered() < self.quantum {
            return Ok(false);
        }

        let quantum = self.quantum;
        for (ch, fifo) in self.fifo.iter_mut().enumerate() {
            let dst = self.input.channel_mut(ch);
            for (d, s) in dst.iter_mut().zip(fifo.drain(..quantum)) {
                *d = s;
            }
        }

        engine.process(&self.input, output)?;
        Ok(true)
    }

    /// Zero-pads whatever is buffered to a full quantum and processes it.
    /// Returns how many frames of `output` correspond to real input.
    pub fn flush(&mut self, engine: &mut Engine<T>, output: &mut AudioBlock<T>) -> Result<usize> {
        let pending = self.buffered().min(self.quantum);
        if pending == 0 {
            return Ok(0);
        }

        let padding = self.quantum - pending;
        for fifo in &mut self.fifo {
            fifo.extend(std::iter::repeat_n(T::zero(), padding));
        }
        self.pull(engine, output)?;
        Ok(pending)
    }
}
