pub mod bank;
pub mod convolver;
pub mod model;
pub mod normalize;
