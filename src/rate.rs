//! A bit-rate value type.
//! 比特率值类型。

use std::fmt;
use std::time::Duration;

/// A data rate in bits per second.
///
/// 以比特每秒表示的数据速率。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRate(u64);

impl DataRate {
    pub const ZERO: DataRate = DataRate(0);

    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    pub const fn from_kbps(kbps: u64) -> Self {
        Self(kbps * 1_000)
    }

    pub const fn from_mbps(mbps: u64) -> Self {
        Self(mbps * 1_000_000)
    }

    /// Builds a rate from a floating point bit/s value, saturating at zero for
    /// negative or NaN inputs.
    ///
    /// 由浮点比特率构造，负数或NaN饱和为零。
    pub fn from_bps_f64(bps: f64) -> Self {
        if bps.is_nan() || bps <= 0.0 {
            Self(0)
        } else if bps >= u64::MAX as f64 {
            Self(u64::MAX)
        } else {
            Self(bps as u64)
        }
    }

    /// The rate implied by sending `bytes` over `elapsed`. `None` if no time elapsed.
    ///
    /// 在 `elapsed` 时间内发送 `bytes` 字节所隐含的速率。耗时为零时返回 `None`。
    pub fn from_transfer(bytes: u64, elapsed: Duration) -> Option<Self> {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            Some(Self::from_bps_f64(bytes as f64 * 8.0 / secs))
        } else {
            None
        }
    }

    pub const fn bps(self) -> u64 {
        self.0
    }

    pub fn as_bps_f64(self) -> f64 {
        self.0 as f64
    }

    pub fn as_mbps_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }

    /// Multiplies the rate by a non-negative factor.
    pub fn scale(self, factor: f64) -> Self {
        Self::from_bps_f64(self.0 as f64 * factor)
    }

    /// Number of bytes this rate carries over `period`.
    ///
    /// 该速率在 `period` 内承载的字节数。
    pub fn bytes_in(self, period: Duration) -> u64 {
        (self.0 as f64 * period.as_secs_f64() / 8.0) as u64
    }

    /// Time needed to transmit `bytes` at this rate. `None` for a zero rate.
    pub fn transmit_time(self, bytes: u64) -> Option<Duration> {
        if self.0 == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(bytes as f64 * 8.0 / self.0 as f64))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}Mbps", self.as_mbps_f64())
    }
}
