//! 测试辅助工具模块
//! Test utilities module

#![cfg(test)]

use crate::error::{Error, Result};
use crate::generator::{BurstGenerator, BurstRequest};
use crate::rate::DataRate;
use crate::transport::{CapacityProbe, Transport, TransportKind};
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const TEST_CLIENT_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345);
pub const TEST_OTHER_CLIENT_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12346);

/// A transport whose capacity the test sets by hand.
///
/// Stream mocks shrink their available capacity by every write, like a
/// kernel send buffer that is never drained until the test says so. Datagram
/// mocks always report full capacity.
#[derive(Debug)]
pub struct MockTransport {
    kind: TransportKind,
    capacity: u64,
    available: u64,
    sent: Vec<Bytes>,
    fail_sends: bool,
    accept_limit: usize,
}

impl MockTransport {
    pub fn stream(capacity: u64) -> Self {
        Self {
            kind: TransportKind::Stream,
            capacity,
            available: capacity,
            sent: Vec::new(),
            fail_sends: false,
            accept_limit: usize::MAX,
        }
    }

    pub fn datagram(capacity: u64) -> Self {
        Self {
            kind: TransportKind::Datagram,
            ..Self::stream(capacity)
        }
    }

    pub fn set_available(&mut self, available: u64) {
        self.available = available.min(self.capacity);
    }

    /// Frees the whole send buffer, as if every byte reached the peer.
    pub fn flush(&mut self) {
        self.available = self.capacity;
    }

    /// Accepts at most `limit` bytes per send, like a short stream write.
    pub fn limit_accepted(&mut self, limit: usize) {
        self.accept_limit = limit;
    }

    pub fn fail_sends(&mut self) {
        self.fail_sends = true;
    }

    pub fn sent(&self) -> &[Bytes] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.sent)
    }
}

impl CapacityProbe for MockTransport {
    fn available_write_capacity(&self) -> u64 {
        self.available
    }

    fn send_buffer_capacity(&self) -> u64 {
        self.capacity
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn send(&mut self, data: Bytes) -> Result<usize> {
        if self.fail_sends {
            return Err(Error::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        let len = data.len().min(self.accept_limit);
        if self.kind == TransportKind::Stream {
            self.available = self.available.saturating_sub(len as u64);
        }
        self.sent.push(data.slice(..len));
        Ok(len)
    }
}

/// A generator replaying a fixed list of bursts.
#[derive(Debug)]
pub struct ScriptedGenerator {
    bursts: VecDeque<BurstRequest>,
    target_rate: DataRate,
    pub rate_history: Vec<DataRate>,
}

impl ScriptedGenerator {
    pub fn new(sizes: &[u64], period: Duration, target_rate: DataRate) -> Self {
        Self {
            bursts: sizes
                .iter()
                .map(|&size| BurstRequest { size, period })
                .collect(),
            target_rate,
            rate_history: Vec::new(),
        }
    }
}

impl BurstGenerator for ScriptedGenerator {
    fn has_next_burst(&self) -> bool {
        !self.bursts.is_empty()
    }

    fn generate_burst(&mut self) -> BurstRequest {
        self.bursts.pop_front().unwrap_or(BurstRequest {
            size: 0,
            period: Duration::ZERO,
        })
    }

    fn set_target_rate(&mut self, rate: DataRate) {
        self.rate_history.push(rate);
        self.target_rate = rate;
    }

    fn target_rate(&self) -> DataRate {
        self.target_rate
    }
}
