//! Buffer-occupancy fuzzy controller.
//!
//! Occupancy is partitioned into {empty, ok, full} over `[0, target, 2·target]`
//! and its change into {falling, steady, rising} over `[-target, 0, target]`.
//! Nine min-rules fire into five output levels, which are combined by
//! root-sum-square and defuzzified as a weighted average of the level factors.
//! The result multiplies the rate the transport drained at.
//!
//! 基于缓冲区占用的模糊控制器。占用在 `[0, target, 2·target]` 上划分为
//! {空, 正常, 满}，其变化在 `[-target, 0, target]` 上划分为 {下降, 平稳, 上升}。
//! 九条取小规则作用到五个输出等级，以平方和开方合并，再以各等级因子的加权平均
//! 去模糊化。结果乘以传输的排空速率。

use super::RateAdaptation;
use super::observation::{OccupancyMeasure, Signal, SignalTracker, TransmissionObservation};
use crate::config::AdaptationConfig;
use crate::rate::DataRate;
use tracing::debug;

/// Factors of the five output levels, from strong decrease to strong increase.
///
/// 五个输出等级的因子，从大幅降低到大幅提高。
pub const OUTPUT_FACTORS: [f64; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

/// Membership degrees of a three-set partition.
///
/// 三集合划分的隶属度。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Membership {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl Membership {
    /// Triangular partition with shoulders: `low` is 1 at or below `lo`,
    /// `mid` peaks at `center`, `high` is 1 at or above `hi`.
    ///
    /// 带肩部的三角划分：`low` 在 `lo` 及以下为1，`mid` 在 `center` 处达到峰值，
    /// `high` 在 `hi` 及以上为1。
    pub fn partition(x: f64, lo: f64, center: f64, hi: f64) -> Self {
        if x <= lo {
            Self {
                low: 1.0,
                ..Default::default()
            }
        } else if x < center {
            let mid = (x - lo) / (center - lo);
            Self {
                low: 1.0 - mid,
                mid,
                high: 0.0,
            }
        } else if x < hi {
            let high = (x - center) / (hi - center);
            Self {
                low: 0.0,
                mid: 1.0 - high,
                high,
            }
        } else {
            Self {
                high: 1.0,
                ..Default::default()
            }
        }
    }
}

/// Combines rule activations per output level by root-sum-square.
pub(crate) fn combine(activations: &[f64]) -> f64 {
    activations.iter().map(|a| a * a).sum::<f64>().sqrt()
}

/// Weighted average of [`OUTPUT_FACTORS`]. `None` when nothing fired.
///
/// [`OUTPUT_FACTORS`] 的加权平均。没有规则被激活时返回 `None`。
pub fn defuzzify(levels: [f64; 5]) -> Option<f64> {
    let total: f64 = levels.iter().sum();
    if total.is_nan() || total <= 0.0 {
        return None;
    }
    let weighted: f64 = levels
        .iter()
        .zip(OUTPUT_FACTORS)
        .map(|(level, factor)| level * factor)
        .sum();
    Some(weighted / total)
}

/// Runs the rule base over a level partition and a trend partition.
///
/// A low level with a falling trend asks for the strongest increase, a high
/// level with a rising trend for the strongest decrease, and the diagonals in
/// between map to the intermediate output levels.
///
/// 在水平划分和趋势划分上运行规则库。低水平且趋势下降时要求最大幅度提高，
/// 高水平且趋势上升时要求最大幅度降低，中间的对角线映射到中间的输出等级。
pub fn infer(level: Membership, trend: Membership) -> Option<f64> {
    let r1 = level.high.min(trend.high);
    let r2 = level.mid.min(trend.high);
    let r3 = level.low.min(trend.high);
    let r4 = level.high.min(trend.mid);
    let r5 = level.mid.min(trend.mid);
    let r6 = level.low.min(trend.mid);
    let r7 = level.high.min(trend.low);
    let r8 = level.mid.min(trend.low);
    let r9 = level.low.min(trend.low);

    defuzzify([
        combine(&[r1]),
        combine(&[r2, r4]),
        combine(&[r3, r5, r7]),
        combine(&[r6, r8]),
        combine(&[r9]),
    ])
}

/// The multiplicative factor the controller applies for a given occupancy
/// and occupancy change, both in bytes.
///
/// 对给定的占用及占用变化（均以字节计），控制器采用的乘法因子。
pub fn output_factor(occupancy: f64, delta: f64, target: f64) -> Option<f64> {
    infer(
        Membership::partition(occupancy, 0.0, target, 2.0 * target),
        Membership::partition(delta, -target, 0.0, target),
    )
}

/// Snaps `rate` down to the highest ladder step not above it. Rates below
/// the first step map to the first step.
///
/// 将 `rate` 向下对齐到不高于它的最高阶梯档位。低于第一档的速率映射到第一档。
pub fn quantize_down(ladder: &[DataRate], rate: DataRate) -> DataRate {
    ladder
        .iter()
        .rev()
        .find(|&&step| step <= rate)
        .or(ladder.first())
        .copied()
        .unwrap_or(rate)
}

#[derive(Debug)]
pub struct FuzzyController {
    tracker: SignalTracker,
    target: f64,
    default_rate: DataRate,
    ladder: Option<Vec<DataRate>>,
    previous: DataRate,
}

impl FuzzyController {
    pub fn new(config: &AdaptationConfig) -> Self {
        Self {
            tracker: SignalTracker::new(OccupancyMeasure::Transport),
            target: config.fuzzy_target_occupancy,
            default_rate: config.default_rate,
            ladder: config
                .fuzzy_quantize
                .then(|| config.bitrate_ladder.clone()),
            previous: config.default_rate,
        }
    }
}

impl RateAdaptation for FuzzyController {
    fn observe_transmission(&mut self, observation: &TransmissionObservation) -> DataRate {
        let signal = match self.tracker.observe(observation) {
            Signal::First | Signal::Idle => {
                self.previous = self.default_rate;
                return self.default_rate;
            }
            Signal::Ready(signal) => signal,
        };

        let Some(factor) = output_factor(signal.occupancy, signal.delta, self.target) else {
            debug!(
                occupancy = signal.occupancy,
                delta = signal.delta,
                "No fuzzy rule fired, keeping the previous rate"
            );
            return self.previous;
        };

        let mut rate = signal.last_rate.scale(factor);
        if let Some(ladder) = &self.ladder {
            rate = quantize_down(ladder, rate);
        }
        debug!(
            occupancy = signal.occupancy,
            delta = signal.delta,
            factor,
            last_rate = %signal.last_rate,
            next = %rate,
            "Fuzzy rate decision"
        );
        self.previous = rate;
        rate
    }

    fn name(&self) -> &'static str {
        "fuzzy"
    }
}
