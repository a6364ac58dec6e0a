//! Safety pipeline for the pose stream: per-sample velocity/acceleration
//! limiting and rate-reshaped output via upsampling extrapolation.
//!
//! The limiter runs synchronously on whichever task delivers the pose; the
//! resampler owns the only background loop (the upsampling tick).

pub mod limiter;
pub mod resampler;

pub use limiter::{LimitOutcome, MotionLimiter};
pub use resampler::{spawn_upsampler, Resampler, ResamplerConfig};
