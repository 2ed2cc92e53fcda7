//! Dual-timescale EWMA throughput estimator.
//!
//! Two moving averages of the drain rate, one slow and one fast, are kept and
//! a fraction of the smaller one is reported. Drops pull the fast average
//! down first, so the estimate falls quickly and recovers slowly.
//!
//! 双时间尺度EWMA吞吐量估计器。维护排空速率的慢、快两个移动平均，报告较小者的一定比例。
//! 速率下降时快平均先被拉低，因此估计值下降快、恢复慢。

use super::RateAdaptation;
use super::observation::{OccupancyMeasure, Signal, SignalTracker, TransmissionObservation};
use crate::config::AdaptationConfig;
use crate::rate::DataRate;
use tracing::debug;

#[derive(Debug)]
pub struct EwmaEstimator {
    tracker: SignalTracker,
    default_rate: DataRate,
    slow_alpha: f64,
    fast_alpha: f64,
    safety_factor: f64,
    slow: f64,
    fast: f64,
}

impl EwmaEstimator {
    pub fn new(config: &AdaptationConfig) -> Self {
        let initial = config.ewma_initial_estimate.as_bps_f64();
        Self {
            tracker: SignalTracker::new(OccupancyMeasure::Transport),
            default_rate: config.default_rate,
            slow_alpha: config.ewma_slow_alpha,
            fast_alpha: config.ewma_fast_alpha,
            safety_factor: config.ewma_safety_factor,
            slow: initial,
            fast: initial,
        }
    }

    /// Current (slow, fast) estimates.
    pub fn estimates(&self) -> (DataRate, DataRate) {
        (
            DataRate::from_bps_f64(self.slow),
            DataRate::from_bps_f64(self.fast),
        )
    }
}

impl RateAdaptation for EwmaEstimator {
    fn observe_transmission(&mut self, observation: &TransmissionObservation) -> DataRate {
        let signal = match self.tracker.observe(observation) {
            Signal::First | Signal::Idle => return self.default_rate,
            Signal::Ready(signal) => signal,
        };

        let sample = signal.last_rate.as_bps_f64();
        self.slow = self.slow_alpha * self.slow + (1.0 - self.slow_alpha) * sample;
        self.fast = self.fast_alpha * self.fast + (1.0 - self.fast_alpha) * sample;
        let rate = DataRate::from_bps_f64(self.safety_factor * self.slow.min(self.fast));
        debug!(
            sample = %signal.last_rate,
            slow = self.slow,
            fast = self.fast,
            next = %rate,
            "EWMA rate decision"
        );
        rate
    }

    fn name(&self) -> &'static str {
        "google"
    }
}
