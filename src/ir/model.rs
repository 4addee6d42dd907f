use crate::error::{Error, Result};

/// Raw impulse response taps, one vector per channel.
///
/// All channels have the same, non-zero length. The buffer is immutable once
/// constructed; normalization produces a separate copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse<T> {
    channels: Vec<Vec<T>>,
}

impl<T: Copy> ImpulseResponse<T> {
    pub fn from_channels(channels: Vec<Vec<T>>) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(Error::EmptyImpulseResponse);
        };

        let len = first.len();
        if len == 0 {
            return Err(Error::EmptyImpulseResponse);
        }

        if let Some(bad) = channels.iter().find(|c| c.len() != len) {
            return Err(Error::InvalidConfig(format!(
                "impulse response channels differ in length ({} vs {})",
                len,
                bad.len()
            )));
        }

        Ok(Self { channels })
    }

    pub fn mono(taps: &[T]) -> Result<Self> {
        Self::from_channels(vec![taps.to_vec()])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of taps per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> &[T] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<T>] {
        &self.channels
    }
}

/// Gain-scaled, length-truncated copy of an [`ImpulseResponse`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImpulseResponse<T> {
    pub(crate) channels: Vec<Vec<T>>,
    pub(crate) gains: Vec<f64>,
}

impl<T> NormalizedImpulseResponse<T> {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> &[T] {
        &self.channels[index]
    }

    /// Scale applied to each channel (normalization gain times extra gain).
    pub fn gains(&self) -> &[f64] {
        &self.gains
    }
}
