//! Loss composition and per-loss gradients.
//!
//! - [`composer`]: builds the eight loss terms of a forward pass
//! - [`gradients`]: differentiates one loss at a time and collects the
//!   gradients of selected parameter groups

pub mod composer;
pub mod gradients;

pub use composer::{
    LossCoefficients, LossComposer, LossTargets, LossTerms, LossValues, TrainingBatch,
    HUBER_DELTA, LOG_EPS,
};
pub use gradients::{loss_gradients, LossGradients, LossKind, ParamGradNorm};
