//! The burst generator boundary and a frame-rate reference policy.
//! 突发生成器边界以及一个按帧率生成的参考策略。

use crate::rate::DataRate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;
use std::time::Duration;

/// One burst the generator asks the sender to transmit.
///
/// 生成器要求发送端传输的一个突发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstRequest {
    /// Burst size in bytes, fragment headers included.
    /// 突发大小（字节），包含分片头。
    pub size: u64,
    /// Time until the next burst should be generated.
    /// 距离生成下一个突发的时间。
    pub period: Duration,
}

/// Decides what bursts a sender produces. The rate loop steers it through
/// [`set_target_rate`](Self::set_target_rate).
///
/// 决定发送端产生哪些突发。速率环路通过 `set_target_rate` 对其进行调节。
pub trait BurstGenerator: Send + Debug {
    fn has_next_burst(&self) -> bool;

    fn generate_burst(&mut self) -> BurstRequest;

    fn set_target_rate(&mut self, rate: DataRate);

    fn target_rate(&self) -> DataRate;
}

/// Produces one burst per frame at a fixed frame rate, sized so the bursts
/// add up to the target rate. Optional jitter perturbs each size by up to the
/// given fraction.
///
/// 以固定帧率每帧产生一个突发，突发大小使其总和等于目标速率。
/// 可选抖动会将每个突发大小扰动至多给定比例。
#[derive(Debug)]
pub struct FrameRateGenerator {
    period: Duration,
    target_rate: DataRate,
    jitter: f64,
    rng: StdRng,
    limit: Option<u64>,
    generated: u64,
}

impl FrameRateGenerator {
    pub fn new(frames_per_second: u32, target_rate: DataRate) -> Self {
        let fps = frames_per_second.max(1);
        Self {
            period: Duration::from_secs(1) / fps,
            target_rate,
            jitter: 0.0,
            rng: StdRng::seed_from_u64(0),
            limit: None,
            generated: 0,
        }
    }

    /// Perturbs each burst size by a uniform factor in `[1 - fraction, 1 + fraction]`.
    ///
    /// 以 `[1 - fraction, 1 + fraction]` 内的均匀因子扰动每个突发大小。
    pub fn with_jitter(mut self, fraction: f64, seed: u64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Stops after `bursts` bursts.
    pub fn with_limit(mut self, bursts: u64) -> Self {
        self.limit = Some(bursts);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }
}

impl BurstGenerator for FrameRateGenerator {
    fn has_next_burst(&self) -> bool {
        self.limit.is_none_or(|limit| self.generated < limit)
    }

    fn generate_burst(&mut self) -> BurstRequest {
        let mut size = self.target_rate.bytes_in(self.period);
        if self.jitter > 0.0 {
            let factor = 1.0 + self.rng.random_range(-self.jitter..=self.jitter);
            size = (size as f64 * factor) as u64;
        }
        self.generated += 1;
        BurstRequest {
            size,
            period: self.period,
        }
    }

    fn set_target_rate(&mut self, rate: DataRate) {
        self.target_rate = rate;
    }

    fn target_rate(&self) -> DataRate {
        self.target_rate
    }
}
