//! Velocity and acceleration limiting for safe robot motion.
//!
//! When an incoming pose would exceed the configured limits, its position is
//! clamped; orientation always passes through unchanged. The reference for
//! displacement is the last *emitted* position, so the limiter enforces
//! continuity after earlier clamping instead of letting unlimited drift
//! accumulate.

use std::time::Instant;
use types::{Pose, PoseSample};

/// Result of feeding one sample through the limiter.
#[derive(Debug, Clone)]
pub struct LimitOutcome {
    pub sample: PoseSample,
    pub limited: bool,
    /// Human-readable descriptions of which limits fired.
    pub reasons: Vec<String>,
}

impl LimitOutcome {
    fn passthrough(sample: PoseSample) -> Self {
        Self {
            sample,
            limited: false,
            reasons: Vec::new(),
        }
    }
}

/// Per-sample velocity/acceleration clamp.
///
/// State is cleared on `movement_start` and on pipeline start/stop; the
/// first pose after a reset establishes the reference and passes through
/// unchanged.
pub struct MotionLimiter {
    vel_limit: Option<f64>,
    acc_limit: Option<f64>,
    prev: Option<(Pose, Instant)>,
    prev_velocity: f64,
    last_emitted: Option<[f64; 3]>,
}

impl MotionLimiter {
    pub fn new(vel_limit: Option<f64>, acc_limit: Option<f64>) -> Self {
        Self {
            vel_limit,
            acc_limit,
            prev: None,
            prev_velocity: 0.0,
            last_emitted: None,
        }
    }

    /// Clear the reference pose and velocity state.
    pub fn reset(&mut self) {
        self.prev = None;
        self.prev_velocity = 0.0;
        self.last_emitted = None;
    }

    /// Process one pose sample arriving at `now`.
    pub fn apply(&mut self, mut sample: PoseSample, now: Instant) -> LimitOutcome {
        let pose = sample.pose;

        if pose.movement_start {
            self.reset();
        }

        // First pose after a reset establishes the reference
        let Some((_, prev_ts)) = self.prev else {
            self.prev = Some((pose, now));
            self.last_emitted = Some(pose.position());
            return LimitOutcome::passthrough(sample);
        };

        let dt = now.saturating_duration_since(prev_ts).as_secs_f64();
        if dt <= 0.0 {
            return LimitOutcome::passthrough(sample);
        }

        let reference = self
            .last_emitted
            .unwrap_or_else(|| self.prev.map(|(p, _)| p.position()).unwrap_or_default());

        let dx = pose.x - reference[0];
        let dy = pose.y - reference[1];
        let dz = pose.z - reference[2];
        let distance = (dx * dx + dy * dy + dz * dz).sqrt();
        let velocity = distance / dt;

        let mut limited_velocity = velocity;
        let mut limited = false;
        let mut reasons = Vec::new();

        // Acceleration clamp first, symmetric over accel and decel
        if let Some(acc_limit) = self.acc_limit.filter(|limit| *limit > 0.0) {
            let acceleration = (velocity - self.prev_velocity) / dt;
            if acceleration.abs() > acc_limit {
                let max_velocity_change = acc_limit * dt;
                limited_velocity = if acceleration > 0.0 {
                    self.prev_velocity + max_velocity_change
                } else {
                    self.prev_velocity - max_velocity_change
                };
                // The robot stops rather than reversing
                limited_velocity = limited_velocity.max(0.0);
                limited = true;
                reasons.push(format!(
                    "acc={acceleration:.2}m/s\u{b2} > {acc_limit}m/s\u{b2}"
                ));
            }
        }

        // Velocity clamp after the acceleration clamp
        if let Some(vel_limit) = self.vel_limit.filter(|limit| *limit > 0.0) {
            if limited_velocity > vel_limit {
                limited_velocity = vel_limit;
                limited = true;
                reasons.push(format!("vel={velocity:.2}m/s > {vel_limit}m/s"));
            }
        }

        if limited && distance > 0.0 {
            let scale = (limited_velocity * dt) / distance;
            let emitted = [
                reference[0] + dx * scale,
                reference[1] + dy * scale,
                reference[2] + dz * scale,
            ];

            sample.pose.x = emitted[0];
            sample.pose.y = emitted[1];
            sample.pose.z = emitted[2];
            sample.limited = Some(true);

            self.last_emitted = Some(emitted);
            self.prev_velocity = limited_velocity;
            self.prev = Some((pose, now));

            LimitOutcome {
                sample,
                limited: true,
                reasons,
            }
        } else {
            self.last_emitted = Some(pose.position());
            self.prev_velocity = velocity;
            self.prev = Some((pose, now));
            LimitOutcome::passthrough(sample)
        }
    }
}
