use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid partition sizes: min {min}, max {max} (need 1 <= min <= max)")]
    InvalidPartitionSizes { min: usize, max: usize },

    #[error("impulse response has no taps")]
    EmptyImpulseResponse,

    #[error("impulse response too long: {taps} taps (max {max})")]
    ImpulseResponseTooLong { taps: usize, max: usize },

    #[error("cannot normalize channel {channel}: {reason}")]
    DegenerateGain { channel: usize, reason: &'static str },

    #[error("channel count mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("block size mismatch: expected {expected} frames, got {got}")]
    BlockSizeMismatch { expected: usize, got: usize },

    #[error("bank index {index} out of range (bank count {count})")]
    BankIndexOutOfRange { index: usize, count: usize },

    #[error("bank {0} has no impulse response loaded")]
    BankNotLoaded(usize),

    #[error("bank {0} is selected or audible and cannot be replaced")]
    BankBusy(usize),

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("engine is no longer receiving commands")]
    Disconnected,
}
