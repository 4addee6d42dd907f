pub mod block;
pub mod channel;
pub mod crossfade;
pub mod engine;
pub mod stream;
