//! Conversion between instants and the timestamps carried on the wire.
//! 时刻与线上时间戳之间的转换。

use std::time::Duration;
use tokio::time::Instant;

/// The shared time origin of a sender/receiver pair.
///
/// Timestamps on the wire are microseconds since this origin. Both ends of a
/// connection must use the same origin for one-way delays to be meaningful,
/// which holds under a shared virtual clock.
///
/// 发送端/接收端共享的时间原点。线上时间戳是自该原点起的微秒数。
/// 两端必须使用相同原点，单向时延才有意义；共享虚拟时钟下自然满足。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    origin: Instant,
}

impl Epoch {
    pub fn new(origin: Instant) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Wire timestamp of `now`. Instants before the origin map to zero.
    ///
    /// `now` 的线上时间戳。早于原点的时刻映射为零。
    pub fn timestamp(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_micros() as u64
    }

    /// The instant a wire timestamp refers to.
    pub fn instant_of(&self, timestamp: u64) -> Instant {
        self.origin + Duration::from_micros(timestamp)
    }

    /// Time elapsed between a wire timestamp and `now`, zero if it lies in the future.
    ///
    /// 线上时间戳到 `now` 之间经过的时间，时间戳在未来时为零。
    pub fn elapsed_since(&self, timestamp: u64, now: Instant) -> Duration {
        now.saturating_duration_since(self.instant_of(timestamp))
    }
}
