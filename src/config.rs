//! 定义了传输和速率自适应的可配置参数。
//! Defines configurable parameters for the transport and for rate adaptation.

use crate::adaptation::mpc::MAX_COMBINATIONS;
use crate::error::{Error, Result};
use crate::packet::header::HEADER_SIZE;
use crate::rate::DataRate;
use std::str::FromStr;
use std::time::Duration;

/// A structure containing all configurable parameters of a sender or receiver.
///
/// 包含发送端或接收端所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Fragmentation parameters.
    /// 分片相关参数。
    pub fragmentation: FragmentationConfig,

    /// Outbound queue parameters.
    /// 出站队列相关参数。
    pub pacer: PacerConfig,

    /// Rate adaptation parameters.
    /// 速率自适应相关参数。
    pub adaptation: AdaptationConfig,

    /// Receiver-reported feedback parameters.
    /// 接收端反馈相关参数。
    pub feedback: FeedbackConfig,

    /// Burst session parameters.
    /// 突发会话相关参数。
    pub session: SessionConfig,
}

/// Fragmentation parameters.
///
/// 分片相关参数。
#[derive(Debug, Clone)]
pub struct FragmentationConfig {
    /// The on-wire size of a full fragment, header included.
    /// 完整分片的线上大小（含分片头）。
    pub fragment_size: u32,
    /// Bursts smaller than this are padded up to it before fragmentation.
    /// 小于该值的突发在分片前被填充到该大小。
    pub min_burst_size: u64,
    /// The largest fragment a receiver accepts off a stream. A header
    /// declaring more is treated as corrupt.
    /// 接收端从流中接受的最大分片。声明更大长度的分片头被视为损坏。
    pub max_fragment_size: u64,
}

/// Outbound queue parameters.
///
/// 出站队列相关参数。
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// The maximum number of fragments waiting for transport capacity.
    /// 等待传输容量的最大分片数。
    pub queue_capacity: usize,
}

/// The rate adaptation algorithm used by a sender.
///
/// 发送端使用的速率自适应算法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlgorithmKind {
    /// No adaptation: the generator keeps its configured rate.
    /// 不做自适应：生成器保持其配置的速率。
    #[default]
    None,
    /// Buffer-occupancy fuzzy controller.
    /// 基于缓冲区占用的模糊控制器。
    Fuzzy,
    /// Dual-timescale EWMA throughput estimator.
    /// 双时间尺度EWMA吞吐量估计器。
    Google,
    /// Buffer-utility controller.
    /// 缓冲区效用控制器。
    Bola,
    /// Model-predictive controller.
    /// 模型预测控制器。
    Mpc,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::None => "",
            AlgorithmKind::Fuzzy => "fuzzy",
            AlgorithmKind::Google => "google",
            AlgorithmKind::Bola => "bola",
            AlgorithmKind::Mpc => "mpc",
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(AlgorithmKind::None),
            "fuzzy" => Ok(AlgorithmKind::Fuzzy),
            "google" => Ok(AlgorithmKind::Google),
            "bola" => Ok(AlgorithmKind::Bola),
            "mpc" => Ok(AlgorithmKind::Mpc),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Rate adaptation parameters.
///
/// 速率自适应相关参数。
#[derive(Debug, Clone)]
pub struct AdaptationConfig {
    /// Which algorithm drives the rate loop.
    /// 驱动速率环路的算法。
    pub algorithm: AlgorithmKind,
    /// The lowest rate the rate loop will ever set.
    /// 速率环路设置的最低速率。
    pub floor_rate: DataRate,
    /// Returned on the first observation and whenever no transmit time elapsed.
    /// 首次观测以及没有发送耗时时返回的速率。
    pub default_rate: DataRate,
    /// The representation ladder used by BOLA, MPC and fuzzy quantization, ascending.
    /// BOLA、MPC和模糊量化使用的码率阶梯，升序排列。
    pub bitrate_ladder: Vec<DataRate>,
    /// Occupancy (bytes) at which the fuzzy controller considers the buffer "ok".
    /// 模糊控制器认为缓冲区“正常”的占用字节数。
    pub fuzzy_target_occupancy: f64,
    /// Snap the fuzzy output down to `bitrate_ladder`.
    /// 将模糊控制器输出向下对齐到码率阶梯。
    pub fuzzy_quantize: bool,
    pub ewma_slow_alpha: f64,
    pub ewma_fast_alpha: f64,
    /// Starting value of both EWMA estimates.
    /// 两个EWMA估计的初始值。
    pub ewma_initial_estimate: DataRate,
    /// Fraction of the smaller EWMA reported as the next rate.
    /// 以较小EWMA的该比例作为下一速率。
    pub ewma_safety_factor: f64,
    /// Duration of one media segment, the unit of buffered time for BOLA and MPC.
    /// 单个媒体分段的时长，BOLA和MPC的缓冲时间单位。
    pub segment_duration: Duration,
    /// Chunks per segment for chunked transfer, zero when not chunked.
    /// 分块传输时每个分段的块数，不分块时为零。
    pub chunks_per_segment: u32,
    pub bola_minimum_buffer: Duration,
    pub bola_minimum_buffer_per_level: Duration,
    pub bola_stable_buffer: Duration,
    pub mpc_horizon: usize,
    pub mpc_rebuffer_penalty: f64,
    pub mpc_smoothness_penalty: f64,
    /// Number of recent samples in the MPC harmonic mean.
    /// MPC调和平均所用的近期样本数。
    pub mpc_throughput_window: usize,
    /// Number of recent prediction errors MPC takes the maximum over.
    /// MPC取最大值的近期预测误差个数。
    pub mpc_error_window: usize,
}

/// Receiver-reported feedback parameters.
///
/// 接收端反馈相关参数。
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Whether the receiver answers fragments with a target rate.
    /// 接收端是否以目标速率回应分片。
    pub enabled: bool,
    /// Delay at which the delay controller considers the path "ok".
    /// 时延控制器认为路径“正常”的时延。
    pub target_delay: Duration,
    /// Sliding window over which delay and throughput are averaged.
    /// 时延与吞吐量取平均的滑动窗口。
    pub window: Duration,
    /// Rate a feedback-driven sender starts with after connecting.
    /// 基于反馈的发送端连接后的起始速率。
    pub startup_rate: DataRate,
}

/// Burst session parameters.
///
/// 突发会话相关参数。
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Burst period used before the generator reports one.
    /// 生成器给出周期之前使用的突发周期。
    pub default_period: Duration,
    /// How long each accepted peer receives bursts.
    /// 每个接入的对端接收突发的时长。
    pub duration: Duration,
}

impl Default for FragmentationConfig {
    fn default() -> Self {
        Self {
            fragment_size: 1200,
            min_burst_size: 3000,
            max_fragment_size: 64 * 1024,
        }
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
        }
    }
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::None,
            floor_rate: DataRate::from_bps(3_128_000),
            default_rate: DataRate::from_mbps(10),
            bitrate_ladder: [
                3_128_000, 3_254_000, 3_974_000, 4_496_000, 6_408_000, 10_938_000, 17_156_000,
                35_018_000,
            ]
            .into_iter()
            .map(DataRate::from_bps)
            .collect(),
            fuzzy_target_occupancy: 2000.0,
            fuzzy_quantize: false,
            ewma_slow_alpha: 0.99,
            ewma_fast_alpha: 0.98,
            ewma_initial_estimate: DataRate::from_kbps(100),
            ewma_safety_factor: 0.95,
            segment_duration: Duration::from_secs(2),
            chunks_per_segment: 0,
            bola_minimum_buffer: Duration::from_secs(1),
            bola_minimum_buffer_per_level: Duration::from_secs(1),
            bola_stable_buffer: Duration::from_secs(2),
            mpc_horizon: 5,
            mpc_rebuffer_penalty: 7.0,
            mpc_smoothness_penalty: 1.0,
            mpc_throughput_window: 5,
            mpc_error_window: 5,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_delay: Duration::from_millis(10),
            window: Duration::from_millis(140),
            startup_rate: DataRate::from_mbps(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_period: Duration::from_millis(16),
            duration: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Rejects configurations that would make the run meaningless.
    ///
    /// 拒绝会使运行失去意义的配置。
    pub fn validate(&self) -> Result<()> {
        if (self.fragmentation.fragment_size as usize) < HEADER_SIZE {
            return Err(Error::FragmentSizeTooSmall {
                fragment_size: self.fragmentation.fragment_size,
                header_size: HEADER_SIZE,
            });
        }
        // A short tail merged into the second-to-last fragment stays below
        // fragment_size + HEADER_SIZE.
        if self.fragmentation.fragment_size as u64 + HEADER_SIZE as u64
            > self.fragmentation.max_fragment_size
        {
            return Err(Error::InvalidConfig(
                "max fragment size must leave room for a merged fragment tail",
            ));
        }
        if self.fragmentation.min_burst_size < HEADER_SIZE as u64 {
            return Err(Error::BurstTooSmall {
                burst_size: self.fragmentation.min_burst_size,
                header_size: HEADER_SIZE,
            });
        }
        if self.pacer.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue capacity must be positive"));
        }
        self.adaptation.validate()
    }
}

impl AdaptationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bitrate_ladder.is_empty() {
            return Err(Error::InvalidConfig("bitrate ladder is empty"));
        }
        if self.bitrate_ladder.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidConfig("bitrate ladder must be strictly ascending"));
        }
        if self.bitrate_ladder[0] == DataRate::ZERO {
            return Err(Error::InvalidConfig("bitrate ladder contains a zero rate"));
        }
        if self.fuzzy_target_occupancy <= 0.0 {
            return Err(Error::InvalidConfig("fuzzy target occupancy must be positive"));
        }
        if self.segment_duration.is_zero() {
            return Err(Error::InvalidConfig("segment duration must be positive"));
        }
        if self.mpc_horizon == 0 {
            return Err(Error::InvalidConfig("MPC horizon must be positive"));
        }
        let combinations = u32::try_from(self.mpc_horizon)
            .ok()
            .and_then(|horizon| (self.bitrate_ladder.len() as u64).checked_pow(horizon));
        if combinations.is_none_or(|c| c > MAX_COMBINATIONS) {
            return Err(Error::InvalidConfig(
                "MPC search space (ladder levels ^ horizon) is too large",
            ));
        }
        if self.bola_minimum_buffer.is_zero() {
            return Err(Error::InvalidConfig("BOLA minimum buffer must be positive"));
        }
        Ok(())
    }
}
