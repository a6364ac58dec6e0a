//! Pose resampling: upsampling by linear/rotation-vector extrapolation and
//! rate limiting.
//!
//! Real poses arrive at the tracker's native rate (30-60 Hz); robot
//! controllers often want a faster, steadier stream (100-200 Hz). Two output
//! modes:
//!
//! - **Non-regulated**: real poses are forwarded synchronously with zero
//!   added latency; the upsampling tick fills gaps, and extrapolation stops
//!   one expected input interval past the last real pose.
//! - **Regulated**: all output comes from the fixed-period tick. Real poses
//!   only update the buffer. Costs up to one tick of latency, buys jitter-
//!   free timing; past 2x the expected input interval the last real pose is
//!   re-emitted unchanged so the robot holds position.

use nalgebra::Vector3;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use transforms::quat::{self, Frame};
use types::{Pose, PoseSample};

/// Fallback input interval when no arrival history exists yet (30 Hz, the
/// BLE worst case).
const DEFAULT_INPUT_INTERVAL: f64 = 1.0 / 30.0;

/// Rolling window length for the input-rate estimate.
const MAX_INTERVAL_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct ResamplerConfig {
    /// Target output frequency for upsampling.
    pub upsample_to_hz: Option<f64>,
    /// Upper bound on emission rate; excess poses are dropped, keeping the
    /// most recent.
    pub rate_limit_hz: Option<f64>,
    /// Output timing driven solely by the upsampling tick.
    pub regulated: bool,
}

/// The two most recent real poses plus the inter-arrival window.
struct Buffer {
    older: Option<(Pose, Instant)>,
    newest: Option<(Pose, Instant)>,
    intervals: VecDeque<f64>,
}

impl Buffer {
    fn new() -> Self {
        Self {
            older: None,
            newest: None,
            intervals: VecDeque::with_capacity(MAX_INTERVAL_SAMPLES),
        }
    }

    fn clear(&mut self) {
        self.older = None;
        self.newest = None;
        self.intervals.clear();
    }

    fn push(&mut self, pose: Pose, now: Instant) {
        if let Some((_, newest_ts)) = self.newest {
            let interval = now.saturating_duration_since(newest_ts).as_secs_f64();
            if self.intervals.len() == MAX_INTERVAL_SAMPLES {
                self.intervals.pop_front();
            }
            self.intervals.push_back(interval);
        }
        self.older = self.newest.take();
        self.newest = Some((pose, now));
    }

    fn expected_input_interval(&self) -> f64 {
        if self.intervals.is_empty() {
            return DEFAULT_INPUT_INTERVAL;
        }
        self.intervals.iter().sum::<f64>() / self.intervals.len() as f64
    }
}

struct RateState {
    last_emit: Option<Instant>,
    latest: Option<PoseSample>,
}

/// Resamples the pose stream per [`ResamplerConfig`].
///
/// `feed` is called synchronously with each real pose; `tick` is driven by
/// the upsampling task. Both return the sample to deliver, already passed
/// through the rate gate.
pub struct Resampler {
    config: ResamplerConfig,
    buffer: Mutex<Buffer>,
    rate: Mutex<RateState>,
    last_real_emit: Mutex<Option<Instant>>,
    /// Arrival timestamp of the newest real pose already emitted by the
    /// regulated tick.
    regulated_emitted_ts: Mutex<Option<Instant>>,
}

impl Resampler {
    pub fn new(config: ResamplerConfig) -> Self {
        Self {
            config,
            buffer: Mutex::new(Buffer::new()),
            rate: Mutex::new(RateState {
                last_emit: None,
                latest: None,
            }),
            last_real_emit: Mutex::new(None),
            regulated_emitted_ts: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    /// Feed one real pose arriving at `now`. Returns the sample to deliver
    /// immediately, or `None` in regulated mode (the tick does all output)
    /// or when the rate gate holds it back.
    pub fn feed(&self, sample: PoseSample, now: Instant) -> Option<PoseSample> {
        {
            let mut buffer = lock(&self.buffer);
            // Gestures never extrapolate across a discontinuity
            if sample.pose.movement_start {
                buffer.clear();
            }
            buffer.push(sample.pose, now);
        }

        if self.config.regulated {
            return None;
        }
        self.gate(sample, true, now)
    }

    /// One upsampling tick at `now`. Returns the extrapolated (or held)
    /// sample to deliver, if any.
    pub fn tick(&self, now: Instant) -> Option<PoseSample> {
        if self.config.regulated {
            let sample = self.regulated_output(now)?;
            self.gate(sample, false, now)
        } else {
            let interval = match self.config.upsample_to_hz {
                Some(hz) if hz > 0.0 => 1.0 / hz,
                _ => return None,
            };
            // A real pose was forwarded within this output interval; no gap
            // to fill
            let last_real: Option<Instant> = *lock(&self.last_real_emit);
            let since_real =
                last_real.map(|ts| now.saturating_duration_since(ts).as_secs_f64());
            if since_real.is_some_and(|s| s < interval) {
                return None;
            }
            let sample = self.extrapolate(now)?;
            self.gate(sample, false, now)
        }
    }

    /// Non-regulated extrapolation with the 1x staleness cutoff.
    fn extrapolate(&self, now: Instant) -> Option<PoseSample> {
        let buffer = lock(&self.buffer);
        let (older, older_ts) = buffer.older?;
        let (newest, newest_ts) = buffer.newest?;

        let time_since_last = now.saturating_duration_since(newest_ts).as_secs_f64();
        if time_since_last > buffer.expected_input_interval() {
            // Past when the next real pose should have arrived; a stale
            // prediction must not keep driving the robot
            return None;
        }

        predict(&older, older_ts, &newest, newest_ts, now).map(PoseSample::from)
    }

    /// Regulated-mode output: newest real pose if not yet emitted, else an
    /// extrapolation, else (past the 2x staleness window) the last real pose
    /// unchanged so the robot holds position.
    fn regulated_output(&self, now: Instant) -> Option<PoseSample> {
        let buffer = lock(&self.buffer);
        let (newest, newest_ts) = buffer.newest?;

        let mut emitted_ts = lock(&self.regulated_emitted_ts);
        let fresh = match *emitted_ts {
            Some(ts) => newest_ts > ts,
            None => true,
        };
        if fresh {
            *emitted_ts = Some(newest_ts);
            return Some(PoseSample::from(newest));
        }

        let hold = Pose {
            movement_start: false,
            ..newest
        };

        let Some((older, older_ts)) = buffer.older else {
            return Some(PoseSample::from(hold));
        };

        let time_since_last = now.saturating_duration_since(newest_ts).as_secs_f64();
        if time_since_last > buffer.expected_input_interval() * 2.0 {
            debug!(time_since_last, "extrapolation cutoff, holding last pose");
            return Some(PoseSample::from(hold));
        }

        match predict(&older, older_ts, &newest, newest_ts, now) {
            Some(predicted) => Some(PoseSample::from(predicted)),
            None => Some(PoseSample::from(hold)),
        }
    }

    /// Rate gate composed after extrapolation: keep the latest pose, only
    /// forward when the minimum emission interval has elapsed.
    fn gate(&self, sample: PoseSample, is_real: bool, now: Instant) -> Option<PoseSample> {
        if is_real {
            *lock(&self.last_real_emit) = Some(now);
        }

        let Some(hz) = self.config.rate_limit_hz.filter(|hz| *hz > 0.0) else {
            return Some(sample);
        };
        let min_interval = 1.0 / hz;

        let mut rate = lock(&self.rate);
        rate.latest = Some(sample);
        if let Some(last_emit) = rate.last_emit {
            if now.saturating_duration_since(last_emit).as_secs_f64() < min_interval {
                return None;
            }
        }
        rate.last_emit = Some(now);
        rate.latest
    }
}

/// Forward-extrapolate from the two most recent real poses to `now`.
fn predict(
    older: &Pose,
    older_ts: Instant,
    newest: &Pose,
    newest_ts: Instant,
    now: Instant,
) -> Option<Pose> {
    let dt_samples = newest_ts.saturating_duration_since(older_ts).as_secs_f64();
    if dt_samples <= 0.0 {
        return None;
    }
    let time_since_last = now.saturating_duration_since(newest_ts).as_secs_f64();

    let v = Vector3::new(
        (newest.x - older.x) / dt_samples,
        (newest.y - older.y) / dt_samples,
        (newest.z - older.z) / dt_samples,
    );

    let q0 = quat::from_xyzw(older.qx, older.qy, older.qz, older.qw);
    let q1 = quat::from_xyzw(newest.qx, newest.qy, newest.qz, newest.qw);
    let omega = quat::to_rotvec(quat::delta(q0, q1, Frame::Base));
    let scaled = omega * (time_since_last / dt_samples);
    let predicted_q = quat::normalize(quat::multiply(quat::from_rotvec(scaled), q1));
    let [qx, qy, qz, qw] = quat::to_xyzw(predicted_q);

    Some(Pose {
        // Extrapolated poses are never movement starts
        movement_start: false,
        x: newest.x + v.x * time_since_last,
        y: newest.y + v.y * time_since_last,
        z: newest.z + v.z * time_since_last,
        qx,
        qy,
        qz,
        qw,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Spawn the upsampling loop.
///
/// Fixed-period, drift-free schedule; when the loop falls more than one
/// interval behind, the schedule resets instead of firing a catch-up burst.
pub fn spawn_upsampler<F>(
    resampler: Arc<Resampler>,
    emit: F,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: Fn(PoseSample) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let Some(hz) = resampler.config().upsample_to_hz.filter(|hz| *hz > 0.0) else {
            return;
        };
        let period = Duration::from_secs_f64(1.0 / hz);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(sample) = resampler.tick(Instant::now()) {
                        emit(sample);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
