//! What the rate loop hands to an adaptation algorithm, and the buffer
//! signal every algorithm derives from it.
//!
//! 速率环路交给自适应算法的观测数据，以及每个算法由此导出的缓冲区信号。

use crate::rate::DataRate;
use crate::transport::CapacityProbe;
use std::time::Duration;
use tokio::time::Instant;

/// One observation of the sender, taken on the burst cadence.
///
/// 在突发节拍上对发送端的一次观测。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionObservation {
    pub now: Instant,
    /// Bytes handed to the transport since the previous observation.
    /// 自上次观测以来交给传输的字节数。
    pub bytes_added: u64,
    /// Time the sender was busy since the previous observation.
    /// 自上次观测以来发送端忙碌的时间。
    pub transmit_time: Duration,
    /// Bytes sitting in the transport's send buffer.
    /// 传输发送缓冲区中的字节数。
    pub transport_occupancy: u64,
    /// Bytes still in the sender's own queue.
    /// 仍在发送端自身队列中的字节数。
    pub queued_bytes: u64,
}

impl TransmissionObservation {
    pub fn new(
        now: Instant,
        bytes_added: u64,
        transmit_time: Duration,
        probe: &(impl CapacityProbe + ?Sized),
        queued_bytes: u64,
    ) -> Self {
        Self {
            now,
            bytes_added,
            transmit_time,
            transport_occupancy: probe.buffer_occupancy(),
            queued_bytes,
        }
    }

    /// Occupancy counting the transport buffer and the sender queue.
    pub fn total_occupancy(&self) -> u64 {
        self.transport_occupancy + self.queued_bytes
    }

    /// The rate the transport drained at while busy. `None` when no busy time
    /// was observed.
    ///
    /// 传输在忙碌期间的排空速率。未观测到忙碌时间时为 `None`。
    pub fn last_rate(&self) -> Option<DataRate> {
        DataRate::from_transfer(self.bytes_added, self.transmit_time)
    }
}

/// Which bytes count as buffered for an algorithm.
///
/// 对某个算法而言哪些字节计为已缓冲。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyMeasure {
    /// Only the transport's send buffer.
    /// 仅传输的发送缓冲区。
    Transport,
    /// The transport's send buffer plus the sender queue.
    /// 传输发送缓冲区加上发送端队列。
    TransportAndQueue,
}

impl OccupancyMeasure {
    pub fn measure(self, observation: &TransmissionObservation) -> u64 {
        match self {
            OccupancyMeasure::Transport => observation.transport_occupancy,
            OccupancyMeasure::TransportAndQueue => observation.total_occupancy(),
        }
    }
}

/// The inputs shared by the buffer-driven algorithms.
///
/// 缓冲区驱动算法共用的输入。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSignal {
    pub occupancy: f64,
    /// Change in occupancy since the previous observation.
    /// 自上次观测以来占用的变化。
    pub delta: f64,
    pub last_rate: DataRate,
}

/// What an algorithm should do with an observation.
///
/// 算法应如何处理一次观测。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// The first observation for this peer: answer with the default rate.
    /// 该对端的首次观测：以默认速率应答。
    First,
    /// No busy time was observed, so no rate can be derived: answer with the fallback rate.
    /// 未观测到忙碌时间，无法推导速率：以回退速率应答。
    Idle,
    Ready(BufferSignal),
}

/// Tracks occupancy across observations.
///
/// 跨观测跟踪缓冲区占用。
#[derive(Debug, Clone)]
pub struct SignalTracker {
    measure: OccupancyMeasure,
    previous_occupancy: Option<u64>,
}

impl SignalTracker {
    pub fn new(measure: OccupancyMeasure) -> Self {
        Self {
            measure,
            previous_occupancy: None,
        }
    }

    pub fn measure(&self) -> OccupancyMeasure {
        self.measure
    }

    /// Records the observation's occupancy and classifies it. Occupancy is
    /// recorded even when the observation is the first or idle, so the next
    /// delta is always relative to the latest reading.
    ///
    /// 记录观测的占用并对其分类。即使是首次或空闲观测也会记录占用，
    /// 因此下一次的变化量总是相对于最新读数。
    pub fn observe(&mut self, observation: &TransmissionObservation) -> Signal {
        let occupancy = self.measure.measure(observation);
        let Some(previous) = self.previous_occupancy.replace(occupancy) else {
            return Signal::First;
        };
        match observation.last_rate() {
            Some(last_rate) => Signal::Ready(BufferSignal {
                occupancy: occupancy as f64,
                delta: occupancy as f64 - previous as f64,
                last_rate,
            }),
            None => Signal::Idle,
        }
    }
}

/// Seconds of media the buffered bytes represent at `rate`.
///
/// 在 `rate` 下已缓冲字节所代表的媒体秒数。
pub fn buffer_level_secs(occupancy: f64, rate: DataRate) -> f64 {
    if rate == DataRate::ZERO {
        return 0.0;
    }
    8.0 * occupancy / rate.as_bps_f64()
}

/// One transfer the sender completed: bytes moved over busy time.
///
/// 发送端完成的一次传输：在忙碌时间内移动的字节数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSample {
    pub bytes: u64,
    pub duration: Duration,
}

impl TransferSample {
    pub fn rate_bps(&self) -> f64 {
        self.bytes as f64 * 8.0 / self.duration.as_secs_f64()
    }
}

/// The most recent transfers, newest first, bounded in length.
///
/// 最近的传输记录，最新的在前，长度有界。
#[derive(Debug, Clone)]
pub struct TransferHistory {
    samples: std::collections::VecDeque<TransferSample>,
    limit: usize,
}

impl TransferHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    /// Records the observation's transfer. Observations without busy time
    /// carry no rate information and are skipped.
    ///
    /// 记录观测中的传输。没有忙碌时间的观测不含速率信息，予以跳过。
    pub fn record(&mut self, observation: &TransmissionObservation) {
        if observation.transmit_time.is_zero() {
            return;
        }
        self.samples.push_front(TransferSample {
            bytes: observation.bytes_added,
            duration: observation.transmit_time,
        });
        self.samples.truncate(self.limit);
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &TransferSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&TransferSample> {
        self.samples.front()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
