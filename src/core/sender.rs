//! One sender instance per connected peer.
//!
//! On every burst timer the instance runs the rate loop, asks the generator
//! for a burst, pads it to the minimum burst size, fragments it and pushes
//! the fragments through the pacer. The host owns the timer and the
//! transport and hands both in on each call.
//!
//! 每个已连接对端对应一个发送实例。每次突发定时器触发时，实例运行速率环路，
//! 向生成器索取一个突发，将其填充到最小突发大小，分片后经发送节奏器推送。
//! 定时器和传输由宿主持有，每次调用时传入。

use super::fragmenter::Fragmenter;
use super::pacer::SendPacer;
use super::rate_loop::RateLoop;
use crate::adaptation::{self, RateAdaptation};
use crate::clock::Epoch;
use crate::config::Config;
use crate::error::Result;
use crate::generator::BurstGenerator;
use crate::packet::feedback::FeedbackHeader;
use crate::rate::DataRate;
use crate::transport::Transport;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// What the host should do after a burst timer fired.
///
/// 突发定时器触发后宿主应执行的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstOutcome {
    /// Arm the burst timer again after this delay.
    /// 在此延迟后再次设置突发定时器。
    Scheduled(Duration),
    /// The session is over; close the peer.
    /// 会话结束，关闭该对端。
    Finished,
}

/// Counters of one sender. Fragments and bytes count at hand-off to the transport.
///
/// 单个发送端的计数器。分片数和字节数在移交给传输时计数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SenderStats {
    pub bursts: u64,
    pub padded_bursts: u64,
    pub fragments: u64,
    pub bytes: u64,
}

impl std::ops::AddAssign for SenderStats {
    fn add_assign(&mut self, other: Self) {
        self.bursts += other.bursts;
        self.padded_bursts += other.padded_bursts;
        self.fragments += other.fragments;
        self.bytes += other.bytes;
    }
}

#[derive(Debug)]
pub struct SenderInstance {
    peer: SocketAddr,
    fragmenter: Fragmenter,
    pacer: SendPacer,
    generator: Box<dyn BurstGenerator>,
    algorithm: Option<Box<dyn RateAdaptation>>,
    rate_loop: RateLoop,
    epoch: Epoch,
    min_burst_size: u64,
    default_period: Duration,
    finishing: bool,
    bursts: u64,
    padded_bursts: u64,
}

impl SenderInstance {
    /// Sets up the sender for `peer`. The generator's current target becomes
    /// the connection's initial rate. With feedback enabled, the generator
    /// then restarts from the configured startup rate.
    ///
    /// 为 `peer` 建立发送端。生成器当前的目标速率成为连接的初始速率。
    /// 启用反馈时，生成器随后从配置的起始速率开始。
    pub fn new(
        peer: SocketAddr,
        config: &Config,
        mut generator: Box<dyn BurstGenerator>,
        epoch: Epoch,
    ) -> Result<Self> {
        let fragmenter = Fragmenter::new(config.fragmentation.fragment_size)?;
        let initial_rate = generator.target_rate();
        if config.feedback.enabled {
            generator.set_target_rate(config.feedback.startup_rate);
        }
        let algorithm = adaptation::build(&config.adaptation);
        info!(
            %peer,
            algorithm = algorithm.as_ref().map_or("none", |a| a.name()),
            feedback = config.feedback.enabled,
            initial_rate = %initial_rate,
            "Sender instance created"
        );

        Ok(Self {
            peer,
            fragmenter,
            pacer: SendPacer::new(config.pacer.queue_capacity),
            generator,
            algorithm,
            rate_loop: RateLoop::new(config.adaptation.floor_rate, initial_rate),
            epoch,
            min_burst_size: config.fragmentation.min_burst_size,
            default_period: config.session.default_period,
            finishing: false,
            bursts: 0,
            padded_bursts: 0,
        })
    }

    /// Handles the burst timer.
    ///
    /// 处理突发定时器。
    pub fn on_burst_timer(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
    ) -> Result<BurstOutcome> {
        if self.finishing {
            debug!(peer = %self.peer, "Session finishing, no further bursts");
            return Ok(BurstOutcome::Finished);
        }

        if let Some(algorithm) = self.algorithm.as_deref_mut() {
            let rate = self
                .rate_loop
                .observe(algorithm, &mut self.pacer, transport, now);
            self.generator.set_target_rate(rate);
        }

        self.pacer.drain(transport, now)?;
        if !self.generator.has_next_burst() {
            info!(peer = %self.peer, bursts = self.bursts, "Generator exhausted");
            return Ok(BurstOutcome::Finished);
        }

        let request = self.generator.generate_burst();
        let size = request.size.max(self.min_burst_size);
        if size != request.size {
            self.padded_bursts += 1;
            debug!(
                peer = %self.peer,
                requested = request.size,
                padded = size,
                "Burst padded to minimum size"
            );
        }

        let fragments = self
            .fragmenter
            .fragment_zeroed(size, self.epoch.timestamp(now))?;
        for fragment in fragments {
            self.pacer.enqueue(fragment)?;
            self.pacer.drain(transport, now)?;
        }
        self.bursts += 1;

        let period = if request.period.is_zero() {
            self.default_period
        } else {
            request.period
        };
        debug!(
            peer = %self.peer,
            size,
            target_rate = %self.generator.target_rate(),
            queued = self.pacer.len(),
            ?period,
            "Burst sent"
        );
        Ok(BurstOutcome::Scheduled(period))
    }

    /// The transport reported free write capacity.
    ///
    /// 传输报告有空闲写容量。
    pub fn on_send_ready(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
    ) -> Result<usize> {
        self.pacer.drain(transport, now)
    }

    /// Applies a receiver-reported target. Returns the rate applied, if any.
    ///
    /// 应用接收端报告的目标速率。返回实际采用的速率（如有）。
    pub fn on_feedback(&mut self, feedback: &FeedbackHeader) -> Option<DataRate> {
        let rate = self.rate_loop.apply_feedback(feedback.target_rate)?;
        self.generator.set_target_rate(rate);
        debug!(
            peer = %self.peer,
            reported = %feedback.target_rate,
            applied = %rate,
            seq = feedback.seq,
            "Feedback applied"
        );
        Some(rate)
    }

    /// Marks the session as over. The next burst timer reports
    /// [`BurstOutcome::Finished`] instead of sending.
    ///
    /// 将会话标记为结束。下一次突发定时器将报告 [`BurstOutcome::Finished`] 而不再发送。
    pub fn finish(&mut self) {
        self.finishing = true;
    }

    pub fn is_finishing(&self) -> bool {
        self.finishing
    }

    /// Drops everything still queued. Returns the number of fragments dropped.
    pub fn close(&mut self) -> usize {
        let dropped = self.pacer.clear();
        info!(
            peer = %self.peer,
            dropped,
            bursts = self.bursts,
            bytes = self.pacer.bytes_sent(),
            "Sender instance closed"
        );
        dropped
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn target_rate(&self) -> DataRate {
        self.generator.target_rate()
    }

    pub fn initial_rate(&self) -> DataRate {
        self.rate_loop.initial_rate()
    }

    pub fn algorithm_name(&self) -> Option<&'static str> {
        self.algorithm.as_ref().map(|a| a.name())
    }

    pub fn queued_fragments(&self) -> usize {
        self.pacer.len()
    }

    pub fn stats(&self) -> SenderStats {
        SenderStats {
            bursts: self.bursts,
            padded_bursts: self.padded_bursts,
            fragments: self.pacer.fragments_sent(),
            bytes: self.pacer.bytes_sent(),
        }
    }
}
