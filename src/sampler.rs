//! Sample-rate control for acquisition.
//!
//! The device streams at its native rate; the consumer often wants less.
//! A naive "minimum interval since last accepted sample" filter measures
//! only accepted-to-accepted gaps and systematically under-samples when
//! arrivals jitter. The token accumulator below instead integrates the true
//! elapsed time across every arrival, so the long-run accepted rate matches
//! the target even with irregular spacing.

use std::time::Instant;

/// Upper bound on banked tokens. Bounds the burst after a long stall
/// (paused or reconnecting link) instead of accepting the whole backlog.
const TOKEN_CAP: f64 = 10.0;

/// Token-accumulator subsampler. All decisions are reactive; it never sleeps.
#[derive(Debug)]
pub struct RateController {
    target_rate: f64,
    max_device_rate: f64,
    tokens: f64,
    last_arrival: Option<Instant>,
    first_arrival: Option<Instant>,
    accepted: u64,
}

impl RateController {
    /// `target_rate` in Hz; 0 disables subsampling entirely.
    pub fn new(target_rate: u32, max_device_rate: u32) -> Self {
        Self {
            target_rate: f64::from(target_rate),
            max_device_rate: f64::from(max_device_rate),
            tokens: 0.0,
            last_arrival: None,
            first_arrival: None,
            accepted: 0,
        }
    }

    /// Decide whether the sample arriving now should be kept.
    pub fn should_accept_sample(&mut self) -> bool {
        self.on_arrival(Instant::now())
    }

    /// Clock-injected decision core, exercised directly by tests.
    pub fn on_arrival(&mut self, now: Instant) -> bool {
        if self.first_arrival.is_none() {
            self.first_arrival = Some(now);
        }
        let previous = self.last_arrival.replace(now);
        if self.target_rate <= 0.0 {
            self.accepted += 1;
            return true;
        }
        let Some(previous) = previous else {
            // First arrival bootstraps the timing baseline.
            self.accepted += 1;
            return true;
        };
        let interval = now.duration_since(previous).as_secs_f64();
        self.tokens = (self.tokens + interval * self.target_rate).min(TOKEN_CAP);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.accepted += 1;
            true
        } else {
            false
        }
    }

    /// Change the target rate and discard accumulated timing state.
    pub fn update_target(&mut self, target_rate: u32) {
        self.target_rate = f64::from(target_rate);
        self.tokens = 0.0;
        self.last_arrival = None;
        self.first_arrival = None;
        self.accepted = 0;
    }

    /// The rate the consumer will actually observe, in Hz.
    pub fn effective_rate(&self) -> f64 {
        if self.target_rate <= 0.0 {
            self.max_device_rate
        } else {
            self.target_rate.min(self.max_device_rate)
        }
    }

    pub fn is_subsampling(&self) -> bool {
        self.target_rate > 0.0 && self.target_rate < self.max_device_rate
    }

    /// Accepted rate achieved so far, in Hz. 0 until two arrivals have
    /// been observed.
    pub fn actual_rate(&self) -> f64 {
        let (Some(first), Some(last)) = (self.first_arrival, self.last_arrival) else {
            return 0.0;
        };
        let elapsed = last.duration_since(first).as_secs_f64();
        if self.accepted < 2 || elapsed <= 0.0 {
            return 0.0;
        }
        self.accepted as f64 / elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Evenly spaced arrivals at `device_hz`, returning the accepted count.
    fn feed_uniform(controller: &mut RateController, count: usize, device_hz: f64) -> usize {
        let start = Instant::now();
        let step = Duration::from_secs_f64(1.0 / device_hz);
        (0..count)
            .filter(|&i| controller.on_arrival(start + step * i as u32))
            .count()
    }

    #[test]
    fn halving_the_rate_accepts_half_the_samples() {
        let mut controller = RateController::new(50, 100);
        let accepted = feed_uniform(&mut controller, 1000, 100.0);
        assert!(
            (accepted as i64 - 500).abs() <= 2,
            "accepted {accepted}, expected 500 +/- 2"
        );
    }

    #[test]
    fn unlimited_target_passes_everything_through() {
        let mut controller = RateController::new(0, 400);
        let accepted = feed_uniform(&mut controller, 100, 400.0);
        assert_eq!(accepted, 100);
        assert!(!controller.is_subsampling());
        assert_eq!(controller.effective_rate(), 400.0);
    }

    #[test]
    fn jittered_arrivals_still_average_to_target() {
        // Alternating 5 ms / 15 ms gaps: 100 Hz average with heavy jitter.
        let mut controller = RateController::new(50, 100);
        let mut now = Instant::now();
        let mut accepted = 0;
        for i in 0..1000 {
            if controller.on_arrival(now) {
                accepted += 1;
            }
            let gap_ms = if i % 2 == 0 { 5 } else { 15 };
            now += Duration::from_millis(gap_ms);
        }
        assert!(
            (accepted as i64 - 500).abs() <= 3,
            "accepted {accepted}, expected about 500"
        );
    }

    #[test]
    fn burst_after_stall_is_capped() {
        let mut controller = RateController::new(50, 100);
        let start = Instant::now();
        assert!(controller.on_arrival(start));
        // A 60 s stall banks far more than TOKEN_CAP worth of time.
        let resumed = start + Duration::from_secs(60);
        let step = Duration::from_millis(1);
        let accepted = (0..100)
            .filter(|&i| controller.on_arrival(resumed + step * i))
            .count();
        // TOKEN_CAP banked tokens plus the ~5 earned during the 100 ms burst,
        // never the hundreds a naive backlog drain would admit.
        assert!(accepted >= TOKEN_CAP as usize, "accepted {accepted}");
        assert!(accepted <= TOKEN_CAP as usize + 7, "accepted {accepted}");
    }

    #[test]
    fn first_arrival_is_always_accepted() {
        let mut controller = RateController::new(1, 400);
        assert!(controller.on_arrival(Instant::now()));
    }

    #[test]
    fn update_target_resets_state() {
        let mut controller = RateController::new(50, 100);
        feed_uniform(&mut controller, 100, 100.0);
        controller.update_target(10);
        assert_eq!(controller.actual_rate(), 0.0);
        assert!(controller.on_arrival(Instant::now()));
        assert_eq!(controller.effective_rate(), 10.0);
    }

    #[test]
    fn effective_rate_is_clamped_to_device_maximum() {
        let controller = RateController::new(1000, 400);
        assert_eq!(controller.effective_rate(), 400.0);
        assert!(!controller.is_subsampling());
    }

    #[test]
    fn actual_rate_reflects_accepted_throughput() {
        let mut controller = RateController::new(0, 400);
        feed_uniform(&mut controller, 101, 100.0);
        let rate = controller.actual_rate();
        assert!((rate - 101.0).abs() < 2.0, "actual rate {rate}");
    }
}
