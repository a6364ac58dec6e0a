//! The processing chain: raw events -> motion limiter -> resampler -> user
//! callback.
//!
//! The limiter and the resampler's feed path run synchronously on the task
//! that delivered the event; only the upsampling tick runs elsewhere. The
//! callback is always invoked with no internal lock held.

use crate::Callback;
use pipeline::{MotionLimiter, Resampler};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::warn;
use types::{Event, PoseSample};

pub(crate) struct EventChain {
    limiter: Option<Mutex<MotionLimiter>>,
    resampler: Option<Arc<Resampler>>,
    callback: Callback,
    quiet: bool,
}

impl EventChain {
    pub(crate) fn new(
        limiter: Option<MotionLimiter>,
        resampler: Option<Arc<Resampler>>,
        callback: Callback,
        quiet: bool,
    ) -> Self {
        Self {
            limiter: limiter.map(Mutex::new),
            resampler,
            callback,
            quiet,
        }
    }

    pub(crate) fn resampler(&self) -> Option<Arc<Resampler>> {
        self.resampler.clone()
    }

    /// Deliver an event to the user callback. Callback errors are logged
    /// and never break the pipeline.
    pub(crate) fn deliver(&self, event: Event) {
        if let Err(e) = (self.callback)(event) {
            warn!(error = %e, "event callback failed");
        }
    }

    /// Feed a raw event from a transport through the chain.
    pub(crate) fn feed(&self, event: Event) {
        let Some(sample) = event.pose_sample().copied() else {
            // Non-pose events bypass the pipeline
            self.deliver(event);
            return;
        };

        let now = Instant::now();
        let mut sample = sample;
        let mut warning = None;

        if let Some(limiter) = &self.limiter {
            let outcome = match limiter.lock() {
                Ok(mut guard) => guard.apply(sample, now),
                Err(poisoned) => poisoned.into_inner().apply(sample, now),
            };
            sample = outcome.sample;
            if outcome.limited && !self.quiet {
                warning = Some(Event::MotionLimitWarning {
                    message: format!("Motion limited: {}", outcome.reasons.join(", ")),
                    reasons: outcome.reasons,
                });
            }
        }
        if let Some(warning) = warning {
            self.deliver(warning);
        }

        match &self.resampler {
            Some(resampler) => {
                if let Some(out) = resampler.feed(sample, now) {
                    self.deliver(Event::pose(out));
                }
            }
            None => self.deliver(Event::pose(sample)),
        }
    }

    /// Deliver a sample produced by the upsampling tick.
    pub(crate) fn emit_upsampled(&self, sample: PoseSample) {
        self.deliver(Event::pose(sample));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::ResamplerConfig;
    use std::sync::mpsc;
    use types::Pose;

    fn collecting_callback() -> (Callback, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let callback: Callback = Arc::new(move |event| {
            tx.send(event).map_err(|e| e.to_string())?;
            Ok(())
        });
        (callback, rx)
    }

    fn pose_event(movement_start: bool, x: f64) -> Event {
        Event::pose(
            Pose {
                movement_start,
                x,
                ..Pose::default()
            }
            .into(),
        )
    }

    #[test]
    fn test_plain_chain_passes_events_through() {
        let (callback, rx) = collecting_callback();
        let chain = EventChain::new(None, None, callback, false);

        chain.feed(pose_event(true, 1.0));
        chain.feed(Event::ServerStopped);

        assert!(matches!(rx.try_recv().unwrap(), Event::Pose { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Event::ServerStopped));
    }

    #[test]
    fn test_limited_pose_carries_flag_and_warning() {
        let (callback, rx) = collecting_callback();
        let limiter = MotionLimiter::new(Some(0.0001), None);
        let chain = EventChain::new(Some(limiter), None, callback, false);

        chain.feed(pose_event(true, 0.0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        chain.feed(pose_event(false, 100.0));

        // First pose unchanged
        let first = rx.try_recv().unwrap();
        assert!(first.pose_sample().unwrap().limited.is_none());

        // Warning precedes the clamped pose
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::MotionLimitWarning { .. }
        ));
        let clamped = rx.try_recv().unwrap();
        let sample = clamped.pose_sample().unwrap();
        assert_eq!(sample.limited, Some(true));
        assert!(sample.pose.x < 100.0);
    }

    #[test]
    fn test_quiet_suppresses_warning() {
        let (callback, rx) = collecting_callback();
        let limiter = MotionLimiter::new(Some(0.0001), None);
        let chain = EventChain::new(Some(limiter), None, callback, true);

        chain.feed(pose_event(true, 0.0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        chain.feed(pose_event(false, 100.0));

        let _first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        // No warning event in between, but the sample is still marked
        assert_eq!(second.pose_sample().unwrap().limited, Some(true));
    }

    #[test]
    fn test_regulated_resampler_defers_output() {
        let (callback, rx) = collecting_callback();
        let resampler = Arc::new(Resampler::new(ResamplerConfig {
            upsample_to_hz: Some(200.0),
            rate_limit_hz: None,
            regulated: true,
        }));
        let chain = EventChain::new(None, Some(resampler.clone()), callback, false);

        chain.feed(pose_event(true, 1.0));
        // Regulated mode: nothing emitted synchronously
        assert!(rx.try_recv().is_err());

        // The tick path flushes the buffered pose
        if let Some(sample) = resampler.tick(Instant::now()) {
            chain.emit_upsampled(sample);
        }
        assert!(matches!(rx.try_recv().unwrap(), Event::Pose { .. }));
    }

    #[test]
    fn test_callback_error_does_not_break_chain() {
        let callback: Callback = Arc::new(|_| Err("consumer failed".into()));
        let chain = EventChain::new(None, None, callback, false);
        chain.feed(pose_event(false, 1.0));
        chain.feed(Event::ServerStopped);
    }
}
