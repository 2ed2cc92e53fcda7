//! Rate adaptation.
//!
//! An algorithm is selected once from configuration and then fed one
//! [`TransmissionObservation`] per burst by the rate loop. Each returns the
//! rate the burst generator should target next.
//!
//! 速率自适应。算法在配置阶段选定一次，之后由速率环路在每个突发时喂入一个
//! [`TransmissionObservation`]，算法返回突发生成器接下来应采用的目标速率。

pub mod bola;
pub mod delay;
pub mod ewma;
pub mod fuzzy;
pub mod mpc;
pub mod observation;

#[cfg(test)]
mod tests;

pub use observation::TransmissionObservation;

use crate::config::{AdaptationConfig, AlgorithmKind};
use crate::rate::DataRate;
use std::fmt::Debug;

/// A sender-side rate adaptation algorithm.
///
/// Implementations are deterministic over the sequence of observations they
/// receive, and answer the first observation with the configured default rate.
///
/// 发送端速率自适应算法。实现对所接收的观测序列是确定性的，
/// 并以配置的默认速率应答首次观测。
pub trait RateAdaptation: Send + Debug {
    /// Consumes one observation and returns the next target rate.
    ///
    /// 消费一次观测并返回下一目标速率。
    fn observe_transmission(&mut self, observation: &TransmissionObservation) -> DataRate;

    /// The configuration name of the algorithm.
    fn name(&self) -> &'static str;
}

/// Builds the configured algorithm, or `None` when adaptation is disabled.
///
/// 构建所配置的算法；禁用自适应时返回 `None`。
pub fn build(config: &AdaptationConfig) -> Option<Box<dyn RateAdaptation>> {
    match config.algorithm {
        AlgorithmKind::None => None,
        AlgorithmKind::Fuzzy => Some(Box::new(fuzzy::FuzzyController::new(config))),
        AlgorithmKind::Google => Some(Box::new(ewma::EwmaEstimator::new(config))),
        AlgorithmKind::Bola => Some(Box::new(bola::BolaController::new(config))),
        AlgorithmKind::Mpc => Some(Box::new(mpc::MpcController::new(config))),
    }
}
