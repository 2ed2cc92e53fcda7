//! Receiver-side delay controller.
//!
//! Keeps a sliding window of fragment arrivals with their one-way delays.
//! The window yields the average delay, the delay trend (least-squares slope
//! scaled to the window length) and the average throughput. A fuzzy rule
//! base over delay {slow, ok, fast} and trend {falling, steady, rising}
//! scales that throughput into the rate reported back to the sender.
//!
//! 接收端时延控制器。维护分片到达及其单向时延的滑动窗口，从中得到平均时延、
//! 时延趋势（最小二乘斜率乘以窗口长度）和平均吞吐量。基于时延 {慢, 正常, 快}
//! 与趋势 {下降, 平稳, 上升} 的模糊规则库对该吞吐量进行缩放，作为反馈给发送端的速率。

use super::fuzzy::{Membership, infer};
use crate::config::FeedbackConfig;
use crate::rate::DataRate;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Arrival {
    at: Instant,
    bytes: u64,
    delay: Duration,
}

/// Window statistics feeding the rule base.
///
/// 输入规则库的窗口统计量。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayStats {
    pub average_delay: Duration,
    /// Delay change over one window, negative when delay is falling.
    /// 一个窗口内的时延变化，时延下降时为负。
    pub delay_trend_secs: f64,
    pub average_throughput: DataRate,
}

#[derive(Debug)]
pub struct DelayController {
    window: Duration,
    target: Duration,
    arrivals: VecDeque<Arrival>,
    started_at: Option<Instant>,
}

impl DelayController {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            window: config.window,
            target: config.target_delay,
            arrivals: VecDeque::new(),
            started_at: None,
        }
    }

    /// Records a fragment of `bytes` on-wire bytes that took `delay` to arrive
    /// and returns the rate to report. Zero means no estimate yet.
    ///
    /// 记录一个线上大小为 `bytes`、传输耗时 `delay` 的分片，返回要报告的速率。
    /// 零表示尚无估计。
    pub fn on_fragment(&mut self, now: Instant, bytes: u64, delay: Duration) -> DataRate {
        let started_at = *self.started_at.get_or_insert(now);
        self.arrivals.push_back(Arrival {
            at: now,
            bytes,
            delay,
        });
        while let Some(oldest) = self.arrivals.front() {
            if oldest.at + self.window < now {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }

        let Some(stats) = self.stats(now, started_at) else {
            return DataRate::ZERO;
        };
        let rate = self.decide(&stats);
        debug!(
            average_delay = ?stats.average_delay,
            trend = stats.delay_trend_secs,
            throughput = %stats.average_throughput,
            next = %rate,
            "Delay rate decision"
        );
        rate
    }

    fn stats(&self, now: Instant, started_at: Instant) -> Option<DelayStats> {
        let n = self.arrivals.len() as f64;
        let first = self.arrivals.front()?.at;
        let (mut bytes, mut delay_sum) = (0u64, 0.0);
        let (mut xsum, mut ysum, mut x2sum, mut xysum) = (0.0, 0.0, 0.0, 0.0);
        for arrival in &self.arrivals {
            let x = arrival.at.duration_since(first).as_secs_f64();
            let y = arrival.delay.as_secs_f64();
            bytes += arrival.bytes;
            delay_sum += y;
            xsum += x;
            ysum += y;
            x2sum += x * x;
            xysum += x * y;
        }

        let denominator = n * x2sum - xsum * xsum;
        let slope = if denominator.abs() > f64::EPSILON {
            (n * xysum - xsum * ysum) / denominator
        } else {
            0.0
        };

        let span = now.saturating_duration_since(started_at).min(self.window);
        let average_throughput = DataRate::from_transfer(bytes, span)?;
        Some(DelayStats {
            average_delay: Duration::from_secs_f64(delay_sum / n),
            delay_trend_secs: self.window.as_secs_f64() * slope,
            average_throughput,
        })
    }

    fn decide(&self, stats: &DelayStats) -> DataRate {
        let t = self.target.as_secs_f64();
        let delay = Membership::partition(
            stats.average_delay.as_secs_f64(),
            2.0 * t / 3.0,
            t,
            4.0 * t,
        );
        let trend = Membership::partition(stats.delay_trend_secs, -2.0 * t / 3.0, 0.0, 4.0 * t);
        match infer(delay, trend) {
            Some(factor) => stats.average_throughput.scale(factor),
            None => stats.average_throughput,
        }
    }
}
