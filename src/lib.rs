// Enable pedantic lints globally, then allow the noisy ones we're not fixing.
#![warn(clippy::pedantic, clippy::nursery)]
// --- Intentionally allowed ---
#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]
// DSP variable names (ramp_up vs ramp_down, etc.) are intentionally similar
#![allow(clippy::similar_names)]
// Audio code performs intentional casts
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap
)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
// Style/pedantic lints that add noise without value here
#![allow(
    clippy::module_name_repetitions,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::struct_field_names,
    clippy::needless_pass_by_value
)]
#![allow(clippy::redundant_pub_crate)]

//! Multi-bank, non-uniformly partitioned FIR convolution.
//!
//! An [`Engine`](audio::engine::Engine) filters a fixed-channel stream one
//! quantum at a time through whichever impulse-response bank is selected,
//! and crossfades when the selection or bypass state changes.

pub mod audio;
pub mod error;
pub mod ir;
pub mod settings;

pub use audio::block::AudioBlock;
pub use audio::engine::{Engine, EngineHandle, EngineStatus};
pub use audio::stream::StreamAdapter;
pub use error::{Error, Result};
pub use ir::bank::{Bank, BankId};
pub use ir::convolver::Sample;
pub use ir::model::ImpulseResponse;
pub use settings::{EngineConfig, IrFormat, LoadStrategy, Precision};
