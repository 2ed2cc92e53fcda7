//! The per-connection rate loop.
//!
//! Runs once per burst timer: it closes the pacer's observation window, asks
//! the adaptation algorithm for a rate, clamps it between the floor and the
//! rate the connection started with, and reopens the busy window if the
//! sender still has work outstanding.
//!
//! 每连接速率环路。每个突发定时器运行一次：结束发送节奏器的观测窗口，向自适应算法
//! 索取速率，将其限制在下限与连接初始速率之间，若发送端仍有未完成的工作则重新打开
//! 忙碌窗口。

use super::pacer::SendPacer;
use crate::adaptation::{RateAdaptation, TransmissionObservation};
use crate::rate::DataRate;
use crate::transport::Transport;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLoop {
    floor: DataRate,
    initial_rate: DataRate,
    decisions: u64,
}

impl RateLoop {
    /// `initial_rate` is the generator's target when the connection was
    /// set up; no decision ever exceeds it.
    ///
    /// `initial_rate` 是连接建立时生成器的目标速率，任何决策都不会超过它。
    pub fn new(floor: DataRate, initial_rate: DataRate) -> Self {
        Self {
            floor,
            initial_rate,
            decisions: 0,
        }
    }

    pub fn floor(&self) -> DataRate {
        self.floor
    }

    pub fn initial_rate(&self) -> DataRate {
        self.initial_rate
    }

    /// Rate decisions made so far.
    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Raises `rate` to the floor, then caps it at the initial rate. The cap
    /// wins when the initial rate is below the floor.
    ///
    /// 先将 `rate` 提升到下限，再以初始速率封顶。初始速率低于下限时以封顶为准。
    pub fn clamp(&self, rate: DataRate) -> DataRate {
        rate.max(self.floor).min(self.initial_rate)
    }

    /// Runs one iteration and returns the rate the generator should target.
    ///
    /// 运行一次迭代，返回生成器应采用的目标速率。
    pub fn observe(
        &mut self,
        algorithm: &mut dyn RateAdaptation,
        pacer: &mut SendPacer,
        transport: &dyn Transport,
        now: Instant,
    ) -> DataRate {
        let sample = pacer.take_sample(now);
        let observation = TransmissionObservation::new(
            now,
            sample.bytes_added,
            sample.busy_time,
            transport,
            pacer.queued_bytes(),
        );
        let proposed = algorithm.observe_transmission(&observation);
        let next = self.clamp(proposed);

        if !(pacer.is_empty() && transport.is_idle()) {
            pacer.resume_busy(now);
        }
        self.decisions += 1;
        debug!(
            algorithm = algorithm.name(),
            bytes_added = sample.bytes_added,
            busy_time = ?sample.busy_time,
            occupancy = observation.transport_occupancy,
            queued = observation.queued_bytes,
            proposed = %proposed,
            next = %next,
            "Rate loop iteration"
        );
        next
    }

    /// The rate to apply for a receiver-reported target, or `None` when the
    /// receiver had no opinion. Reports are capped at the initial rate but
    /// not raised to the floor.
    ///
    /// 对接收端报告的目标速率，返回应采用的速率；接收端无意见时返回 `None`。
    /// 报告值以初始速率封顶，但不会被提升到下限。
    pub fn apply_feedback(&self, reported: DataRate) -> Option<DataRate> {
        (reported > DataRate::ZERO).then(|| reported.min(self.initial_rate))
    }
}
