//! Model-predictive controller in the style of RobustMPC.
//!
//! Bandwidth is predicted as the harmonic mean of recent drain rates,
//! discounted by the largest recent relative prediction error. Every
//! sequence of ladder choices over the horizon is then simulated against the
//! buffered media, and the first choice of the best-scoring sequence wins.
//!
//! The search is exhaustive: a decision costs `O(levels^horizon)` sequence
//! simulations of `horizon` steps each. With the default 8-step ladder and a
//! horizon of 5 that is 32 768 sequences per decision. The configuration
//! rejects ladders and horizons whose product would exceed
//! [`MAX_COMBINATIONS`].
//!
//! 类RobustMPC的模型预测控制器。带宽预测为近期排空速率的调和平均，再以近期最大
//! 相对预测误差折减。随后针对已缓冲媒体模拟预测窗口内每一种码率选择序列，
//! 得分最高序列的第一个选择胜出。
//!
//! 搜索是穷举的：每次决策需要模拟 `O(levels^horizon)` 个序列，每个序列 `horizon` 步。
//! 默认8档码率、窗口为5时每次决策为32 768个序列。配置会拒绝组合数超过
//! [`MAX_COMBINATIONS`] 的码率阶梯与窗口长度。

use super::RateAdaptation;
use super::observation::{
    OccupancyMeasure, Signal, SignalTracker, TransferHistory, TransmissionObservation,
    buffer_level_secs,
};
use crate::config::AdaptationConfig;
use crate::rate::DataRate;
use std::collections::VecDeque;
use tracing::debug;

/// Upper bound on `levels^horizon` accepted by the configuration.
pub const MAX_COMBINATIONS: u64 = 1 << 20;

#[derive(Debug)]
pub struct MpcController {
    tracker: SignalTracker,
    history: TransferHistory,
    errors: VecDeque<f64>,
    last_estimate: Option<f64>,
    default_rate: DataRate,
    ladder: Vec<DataRate>,
    horizon: usize,
    segment_secs: f64,
    rebuffer_penalty: f64,
    smoothness_penalty: f64,
    error_window: usize,
    last_quality: usize,
}

impl MpcController {
    pub fn new(config: &AdaptationConfig) -> Self {
        let chunks = config.chunks_per_segment.max(1) as f64;
        Self {
            tracker: SignalTracker::new(OccupancyMeasure::TransportAndQueue),
            history: TransferHistory::new(config.mpc_throughput_window),
            errors: VecDeque::with_capacity(config.mpc_error_window),
            last_estimate: None,
            default_rate: config.default_rate,
            ladder: config.bitrate_ladder.clone(),
            horizon: config.mpc_horizon,
            segment_secs: config.segment_duration.as_secs_f64() * chunks,
            rebuffer_penalty: config.mpc_rebuffer_penalty,
            smoothness_penalty: config.mpc_smoothness_penalty,
            error_window: config.mpc_error_window.max(1),
            last_quality: 0,
        }
    }

    /// Harmonic mean of the recent non-empty transfers, in bit/s.
    fn harmonic_bandwidth(&self) -> Option<f64> {
        let rates: Vec<f64> = self
            .history
            .iter()
            .filter(|sample| sample.bytes > 0)
            .map(|sample| sample.rate_bps())
            .collect();
        if rates.is_empty() {
            return None;
        }
        let denominator: f64 = rates.iter().map(|rate| 1.0 / rate).sum();
        Some(rates.len() as f64 / denominator)
    }

    /// Records how far the previous estimate was from the newest transfer.
    fn record_error(&mut self) {
        let error = match (self.last_estimate, self.history.latest()) {
            (Some(estimate), Some(latest)) if latest.bytes > 0 => {
                let actual = latest.rate_bps();
                ((estimate - actual) / actual).abs()
            }
            _ => 0.0,
        };
        self.errors.push_front(error);
        self.errors.truncate(self.error_window);
    }

    fn max_error(&self) -> f64 {
        self.errors.iter().copied().fold(0.0, f64::max)
    }

    /// Scores one sequence of ladder choices.
    fn reward(&self, sequence: &[usize], start_buffer: f64, future_bandwidth: f64) -> f64 {
        let segment = self.segment_secs;
        let mut buffer = start_buffer - segment;
        let mut rebuffer = 0.0;
        let mut bitrate_sum = 0.0;
        let mut smoothness = 0.0;
        let mut previous = self.ladder[self.last_quality].as_bps_f64() / 1000.0;

        for &quality in sequence {
            let bitrate = self.ladder[quality].as_bps_f64();
            let download = bitrate * segment / future_bandwidth;
            if buffer < download {
                rebuffer += download - buffer;
                buffer = 0.0;
            } else {
                buffer -= download;
            }
            buffer += segment;

            let kbps = bitrate / 1000.0;
            bitrate_sum += kbps;
            smoothness += (kbps - previous).abs();
            previous = kbps;
        }

        bitrate_sum / 1000.0
            - self.rebuffer_penalty * rebuffer
            - self.smoothness_penalty * smoothness / 1000.0
    }

    /// Enumerates all `levels^horizon` sequences in lexicographic order and
    /// returns the first step of the best one. Later sequences win ties.
    ///
    /// 按字典序枚举全部 `levels^horizon` 个序列，返回最优序列的第一步。得分相同时后出现的序列胜出。
    fn select_level(&self, start_buffer: f64, future_bandwidth: f64) -> usize {
        let levels = self.ladder.len();
        let mut sequence = vec![0usize; self.horizon];
        let mut best = f64::NEG_INFINITY;
        let mut choice = self.last_quality;
        loop {
            let reward = self.reward(&sequence, start_buffer, future_bandwidth);
            if reward >= best {
                best = reward;
                choice = sequence[0];
            }

            // Advance the odometer, least significant step last.
            let mut position = self.horizon;
            loop {
                if position == 0 {
                    return choice;
                }
                position -= 1;
                sequence[position] += 1;
                if sequence[position] < levels {
                    break;
                }
                sequence[position] = 0;
            }
        }
    }
}

impl RateAdaptation for MpcController {
    fn observe_transmission(&mut self, observation: &TransmissionObservation) -> DataRate {
        self.history.record(observation);
        let signal = match self.tracker.observe(observation) {
            Signal::First | Signal::Idle => return self.default_rate,
            Signal::Ready(signal) => signal,
        };

        self.record_error();
        let Some(harmonic) = self.harmonic_bandwidth() else {
            return self.ladder[self.last_quality];
        };
        let future_bandwidth = harmonic / (1.0 + self.max_error());
        self.last_estimate = Some(harmonic);

        let start_buffer = buffer_level_secs(signal.occupancy, signal.last_rate);
        let quality = self.select_level(start_buffer, future_bandwidth);
        debug!(
            harmonic,
            future_bandwidth,
            max_error = self.max_error(),
            start_buffer,
            quality,
            "MPC rate decision"
        );
        self.last_quality = quality;
        self.ladder[quality]
    }

    fn name(&self) -> &'static str {
        "mpc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    fn observation(now: Instant, rate: DataRate, buffer_secs: f64) -> TransmissionObservation {
        let bytes = rate.bytes_in(Duration::from_secs(1));
        TransmissionObservation {
            now,
            bytes_added: bytes,
            transmit_time: Duration::from_secs(1),
            transport_occupancy: (buffer_secs * bytes as f64) as u64,
            queued_bytes: 0,
        }
    }

    #[test]
    fn test_ample_bandwidth_and_buffer_selects_top_level() {
        let mut mpc = MpcController::new(&AdaptationConfig::default());
        let now = Instant::now();
        let obs = observation(now, DataRate::from_mbps(40), 10.0);
        assert_eq!(mpc.observe_transmission(&obs), DataRate::from_mbps(10));
        assert_eq!(mpc.observe_transmission(&obs), DataRate::from_bps(35_018_000));
    }

    #[test]
    fn test_flat_history_picks_highest_level_without_rebuffering() {
        let mpc = MpcController::new(&AdaptationConfig::default());
        assert_eq!(mpc.last_quality, 0);
        // 10 Mbit/s and six seconds buffered: level 5 (10.938 Mbit/s) keeps
        // the buffer above each download, level 6 would stall.
        let quality = mpc.select_level(6.0, 10e6);
        assert_eq!(quality, 5);

        let segment = mpc.segment_secs;
        let download = |q: usize| mpc.ladder[q].as_bps_f64() * segment / 10e6;
        let mut buffer = 6.0 - segment;
        for _ in 0..mpc.horizon {
            assert!(buffer >= download(quality));
            buffer = buffer - download(quality) + segment;
        }
        assert!(6.0 - segment - download(quality + 1) + segment < download(quality + 1));
    }

    #[test]
    fn test_zero_error_on_flat_history() {
        let mut mpc = MpcController::new(&AdaptationConfig::default());
        let now = Instant::now();
        let obs = observation(now, DataRate::from_mbps(8), 4.0);
        for _ in 0..4 {
            mpc.observe_transmission(&obs);
        }
        assert!(mpc.max_error() < 1e-9);
        assert!((mpc.harmonic_bandwidth().unwrap() - 8e6).abs() < 1.0);
    }

    #[test]
    fn test_prediction_error_discounts_bandwidth() {
        let mut mpc = MpcController::new(&AdaptationConfig::default());
        let now = Instant::now();
        mpc.observe_transmission(&observation(now, DataRate::from_mbps(20), 4.0));
        mpc.observe_transmission(&observation(now, DataRate::from_mbps(20), 4.0));
        mpc.observe_transmission(&observation(now, DataRate::from_mbps(10), 4.0));
        // Estimate 20 Mbit/s against 10 Mbit/s actual.
        assert!((mpc.max_error() - 1.0).abs() < 1e-9);
    }
}
