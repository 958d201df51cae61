pub mod eval;
pub mod train;

pub use eval::{EvalOptions, EvaluationRunner};
pub use train::{RunFlags, TrainMode};
