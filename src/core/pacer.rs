//! Outbound fragment queue drained against transport backpressure.
//!
//! Besides moving fragments into the transport, the pacer keeps the two
//! numbers the rate loop observes: the bytes handed to the transport since the
//! last observation, and the time the sender spent busy (data queued or in
//! flight) over that period.
//!
//! 依据传输背压排空的出站分片队列。除了把分片移交给传输外，发送节奏器还记录速率环路
//! 观测的两个量：自上次观测以来交给传输的字节数，以及期间发送端处于忙碌状态
//! （有数据排队或在途）的时间。

use super::fragmenter::OutboundFragment;
use crate::error::{Error, Result};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Accumulates the time during which the sender had data queued or in flight.
///
/// 累计发送端有数据排队或在途的时间。
#[derive(Debug, Default, Clone, Copy)]
pub struct BusyTimer {
    started: Option<Instant>,
    accumulated: Duration,
}

impl BusyTimer {
    /// Opens a busy period at `now` unless one is already open.
    pub fn start(&mut self, now: Instant) {
        self.started.get_or_insert(now);
    }

    /// Closes the open busy period, if any, adding its length.
    pub fn stop(&mut self, now: Instant) {
        if let Some(started) = self.started.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Busy time accumulated up to `now` and not yet taken.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .started
                .map_or(Duration::ZERO, |started| now.saturating_duration_since(started))
    }

    /// Closes the running period at `now`, returns all accumulated busy time
    /// and resets the accumulator. The timer is left stopped.
    ///
    /// 在 `now` 结束当前忙碌区间，返回累计的全部忙碌时间并清零累加器。计时器保持停止状态。
    pub fn take(&mut self, now: Instant) -> Duration {
        self.stop(now);
        std::mem::take(&mut self.accumulated)
    }
}

/// What the pacer measured since the last observation.
///
/// 发送节奏器自上次观测以来的测量结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacerSample {
    pub bytes_added: u64,
    pub busy_time: Duration,
}

/// Bounded FIFO of fragments waiting for transport capacity.
///
/// 等待传输容量的有界分片先进先出队列。
#[derive(Debug)]
pub struct SendPacer {
    queue: VecDeque<OutboundFragment>,
    capacity: usize,
    queued_bytes: u64,
    busy: BusyTimer,
    bytes_added: u64,
    fragments_sent: u64,
    bytes_sent: u64,
}

impl SendPacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            queued_bytes: 0,
            busy: BusyTimer::default(),
            bytes_added: 0,
            fragments_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Appends a fragment. A full queue means the rate loop let production run
    /// away from the transport, which is reported as a fatal error.
    ///
    /// 追加一个分片。队列已满意味着速率环路让生产速度远超传输能力，作为致命错误报告。
    pub fn enqueue(&mut self, fragment: OutboundFragment) -> Result<()> {
        if self.queue.len() >= self.capacity {
            return Err(Error::QueueOverflow {
                capacity: self.capacity,
            });
        }
        self.queued_bytes += fragment.len() as u64;
        self.queue.push_back(fragment);
        Ok(())
    }

    /// Moves fragments into the transport while its write capacity covers the
    /// fragment at the head of the queue. Returns the number of fragments sent
    /// in full.
    ///
    /// Stopping leaves the head fragment queued; the next call after the
    /// transport frees space picks up from there. A partially accepted
    /// fragment keeps its unsent tail at the head. Calling it with an empty
    /// queue only updates the busy timer.
    ///
    /// 当传输的写容量足以容纳队首分片时，将分片移交给传输。返回完整发送的分片数。
    /// 停止时队首分片保留在队列中，传输腾出空间后的下一次调用将从此处继续。
    /// 只被部分接受的分片，其未发送的尾部保留在队首。队列为空时调用只会更新忙碌计时器。
    pub fn drain(&mut self, transport: &mut dyn Transport, now: Instant) -> Result<usize> {
        let mut sent = 0;
        while let Some(head) = self.queue.front() {
            self.busy.start(now);
            let size = head.len();
            let available = transport.available_write_capacity();
            if available < size as u64 {
                trace!(
                    available,
                    size,
                    queued = self.queue.len(),
                    "Transport full, leaving fragment queued"
                );
                return Ok(sent);
            }

            let Some(fragment) = self.queue.pop_front() else {
                break;
            };
            self.queued_bytes -= size as u64;
            let accepted = transport.send(fragment.bytes.clone())?.min(size);
            self.bytes_added += accepted as u64;
            self.bytes_sent += accepted as u64;
            if accepted < size {
                // The unsent tail goes out first next time, keeping the stream intact.
                debug!(
                    accepted,
                    size,
                    burst_seq = fragment.header.burst_seq,
                    frag_seq = fragment.header.frag_seq,
                    "Transport accepted a partial fragment, keeping the rest queued"
                );
                self.queued_bytes += (size - accepted) as u64;
                self.queue.push_front(OutboundFragment {
                    header: fragment.header,
                    bytes: fragment.bytes.slice(accepted..),
                });
                return Ok(sent);
            }
            trace!(
                burst_seq = fragment.header.burst_seq,
                frag_seq = fragment.header.frag_seq,
                accepted,
                "Fragment handed to transport"
            );
            self.fragments_sent += 1;
            sent += 1;
        }

        if transport.is_idle() {
            self.busy.stop(now);
        }
        Ok(sent)
    }

    /// Ends the current observation window: returns what was measured and
    /// clears the counters. The busy timer is left stopped; the rate loop
    /// restarts it if the sender is still busy.
    ///
    /// 结束当前观测窗口：返回测量结果并清零计数器。忙碌计时器保持停止状态，
    /// 若发送端仍然忙碌，由速率环路重新启动它。
    pub fn take_sample(&mut self, now: Instant) -> PacerSample {
        PacerSample {
            bytes_added: std::mem::take(&mut self.bytes_added),
            busy_time: self.busy.take(now),
        }
    }

    /// Opens a new busy period at `now`.
    pub fn resume_busy(&mut self, now: Instant) {
        self.busy.start(now);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_running()
    }

    pub fn busy_time(&self, now: Instant) -> Duration {
        self.busy.elapsed(now)
    }

    pub fn bytes_added(&self) -> u64 {
        self.bytes_added
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes waiting in the queue, not yet handed to the transport.
    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes
    }

    pub fn fragments_sent(&self) -> u64 {
        self.fragments_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Drops everything still queued, returning the number of fragments dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.queued_bytes = 0;
        dropped
    }
}
