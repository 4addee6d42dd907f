use crate::error::{Error, Result};

/// Planar multi-channel buffer: one contiguous vector per channel, all the
/// same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock<T> {
    channels: Vec<Vec<T>>,
    frames: usize,
}

impl<T: Copy + Default> AudioBlock<T> {
    /// Silent block of `channels` x `frames`.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![T::default(); frames]; channels],
            frames,
        }
    }

    pub fn from_channels(channels: Vec<Vec<T>>) -> Result<Self> {
        let frames = channels.first().map_or(0, Vec::len);
        if let Some(bad) = channels.iter().find(|c| c.len() != frames) {
            return Err(Error::BlockSizeMismatch {
                expected: frames,
                got: bad.len(),
            });
        }
        Ok(Self { channels, frames })
    }

    pub const fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[T] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [T] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<T>] {
        &self.channels
    }

    /// Mutable access to the channel vectors; their lengths must not change.
    pub(crate) fn channels_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.channels
    }
}
