//! Buffer-utility controller in the style of BOLA.
//!
//! Each ladder step gets a logarithmic utility, shifted so the lowest step
//! has utility 1. The controller treats the bytes waiting in the sender as
//! buffered media: `8 · occupancy / drain_rate` seconds of it. During startup
//! it follows measured throughput; once a segment's worth of media is
//! buffered it switches to the utility score
//! `(Vp · (utility + gp) - buffer) / bitrate`.
//!
//! 类BOLA的缓冲区效用控制器。每个码率档位具有对数效用，平移后最低档位效用为1。
//! 控制器将发送端待发的字节视为已缓冲媒体，共 `8 · occupancy / drain_rate` 秒。
//! 启动阶段跟随测得的吞吐量；缓冲达到一个分段后切换到效用评分
//! `(Vp · (utility + gp) - buffer) / bitrate`。

use super::RateAdaptation;
use super::observation::{
    OccupancyMeasure, Signal, SignalTracker, TransferHistory, TransmissionObservation,
    buffer_level_secs,
};
use crate::config::AdaptationConfig;
use crate::rate::DataRate;
use std::time::Duration;
use tracing::debug;

/// Transfers averaged for the throughput estimate, per segment chunk.
const THROUGHPUT_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BolaState {
    Startup,
    Steady,
}

#[derive(Debug)]
pub struct BolaController {
    tracker: SignalTracker,
    history: TransferHistory,
    default_rate: DataRate,
    ladder: Vec<DataRate>,
    bitrates_kbps: Vec<f64>,
    utilities: Vec<f64>,
    gp: f64,
    vp: f64,
    segment_secs: f64,
    state: BolaState,
    last_quality: usize,
    last_delay: Duration,
}

impl BolaController {
    pub fn new(config: &AdaptationConfig) -> Self {
        let ladder = config.bitrate_ladder.clone();
        let bitrates_kbps: Vec<f64> = ladder.iter().map(|r| r.as_bps_f64() / 1000.0).collect();
        let base = bitrates_kbps.first().copied().unwrap_or(1.0).ln();
        let utilities: Vec<f64> = bitrates_kbps.iter().map(|b| b.ln() - base + 1.0).collect();

        let minimum_buffer = config.bola_minimum_buffer.as_secs_f64();
        let buffer_time = config.bola_stable_buffer.as_secs_f64().max(
            minimum_buffer
                + config.bola_minimum_buffer_per_level.as_secs_f64() * ladder.len() as f64,
        );
        let highest_utility = utilities.iter().copied().fold(1.0, f64::max);
        let gp = (highest_utility - 1.0) / (buffer_time / minimum_buffer - 1.0);
        let vp = minimum_buffer / gp;

        let chunks = config.chunks_per_segment as usize;
        let window = if chunks > 0 {
            THROUGHPUT_SAMPLES * chunks
        } else {
            THROUGHPUT_SAMPLES
        };

        Self {
            tracker: SignalTracker::new(OccupancyMeasure::TransportAndQueue),
            history: TransferHistory::new(window),
            default_rate: config.default_rate,
            ladder,
            bitrates_kbps,
            utilities,
            gp,
            vp,
            segment_secs: config.segment_duration.as_secs_f64() * chunks.max(1) as f64,
            state: BolaState::Startup,
            last_quality: 0,
            last_delay: Duration::ZERO,
        }
    }

    pub fn state(&self) -> BolaState {
        self.state
    }

    pub fn utilities(&self) -> &[f64] {
        &self.utilities
    }

    /// The extra wait before the next download the last steady decision asked for.
    ///
    /// 上一次稳态决策要求的下次下载前额外等待时间。
    pub fn download_delay(&self) -> Duration {
        self.last_delay
    }

    /// Average throughput over the recent transfers, in kbit/s.
    fn throughput_kbps(&self) -> f64 {
        let (bytes, secs) = self.history.iter().fold((0u64, 0.0), |(b, s), sample| {
            (b + sample.bytes, s + sample.duration.as_secs_f64())
        });
        bytes as f64 * 8.0 / secs / 1000.0
    }

    /// The level just below the first one whose bitrate reaches `kbps`, or the
    /// top level when none does.
    ///
    /// 第一个码率达到 `kbps` 的档位的下一档；若没有档位达到，则为最高档。
    fn quality_for_bitrate(&self, kbps: f64) -> usize {
        if kbps.is_nan() {
            return 0;
        }
        self.bitrates_kbps
            .iter()
            .position(|&bitrate| kbps <= bitrate)
            .map_or(self.ladder.len() - 1, |i| i.saturating_sub(1))
    }

    fn quality_from_buffer_level(&self, buffer_secs: f64) -> usize {
        let mut quality = 0;
        let mut best = f64::NEG_INFINITY;
        for (i, (utility, bitrate)) in self.utilities.iter().zip(&self.bitrates_kbps).enumerate() {
            let score = (self.vp * (utility + self.gp) - buffer_secs) / bitrate;
            if score >= best {
                best = score;
                quality = i;
            }
        }
        quality
    }

    fn max_buffer_level_for_quality(&self, quality: usize) -> f64 {
        self.vp * (self.utilities[quality] + self.gp)
    }

    fn decide(&mut self, buffer_secs: f64) -> usize {
        let quality_for_throughput = self.quality_for_bitrate(self.throughput_kbps());
        if self.ladder.len() == 1 {
            return 0;
        }
        match self.state {
            BolaState::Startup => {
                if buffer_secs >= self.segment_secs {
                    debug!(buffer_secs, "BOLA leaving startup");
                    self.state = BolaState::Steady;
                }
                quality_for_throughput
            }
            BolaState::Steady => {
                let mut quality = self.quality_from_buffer_level(buffer_secs);
                if quality > self.last_quality && quality > quality_for_throughput {
                    quality = quality_for_throughput.max(self.last_quality);
                }
                let delay = (buffer_secs - self.max_buffer_level_for_quality(quality)).max(0.0);
                self.last_delay = Duration::from_secs_f64(delay);
                quality
            }
        }
    }
}

impl RateAdaptation for BolaController {
    fn observe_transmission(&mut self, observation: &TransmissionObservation) -> DataRate {
        self.history.record(observation);
        let signal = match self.tracker.observe(observation) {
            Signal::First | Signal::Idle => return self.default_rate,
            Signal::Ready(signal) => signal,
        };

        let buffer_secs = buffer_level_secs(signal.occupancy, signal.last_rate);
        let quality = self.decide(buffer_secs);
        self.last_quality = quality;
        debug!(
            buffer_secs,
            state = ?self.state,
            quality,
            delay = ?self.last_delay,
            "BOLA rate decision"
        );
        self.ladder[quality]
    }

    fn name(&self) -> &'static str {
        "bola"
    }
}
