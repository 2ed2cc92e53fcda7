//! The receiving side: per-peer reassembly and optional rate feedback.
//!
//! The host pushes whatever it reads into the receiver, one call per
//! datagram or per stream read. Each peer keeps its own reassembler, stream
//! decoder and, when feedback is enabled, delay controller. Every fragment
//! decoded from a feedback-enabled peer is answered with a
//! [`FeedbackHeader`] the host writes back to that peer.
//!
//! 接收端：每对端重组及可选的速率反馈。宿主把读到的数据推送给接收端，每个数据报或
//! 每次流读取调用一次。每个对端拥有自己的重组器、流解码器，以及启用反馈时的时延
//! 控制器。启用反馈时，解码出的每个分片都会以一个 [`FeedbackHeader`] 应答，由宿主
//! 写回该对端。

use super::reassembly::{Reassembler, ReassemblyEvent};
use crate::adaptation::delay::DelayController;
use crate::clock::Epoch;
use crate::config::{Config, FeedbackConfig};
use crate::error::{Error, Result};
use crate::packet::feedback::FeedbackHeader;
use crate::packet::fragment::Fragment;
use crate::packet::stream::StreamDecoder;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::time::Instant;
use tracing::{info, trace, warn};

/// Counters of received traffic. Bytes are on-wire fragment bytes.
///
/// 接收流量的计数器。字节数为线上分片字节数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    pub fragments: u64,
    pub bytes: u64,
    pub bursts: u64,
    /// Stale, duplicate or malformed fragments and undecodable datagrams.
    /// 过期、重复、格式错误的分片以及无法解码的数据报。
    pub discarded: u64,
}

/// What one read produced.
///
/// 一次读取产生的结果。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Received {
    pub events: Vec<ReassemblyEvent>,
    pub feedback: Vec<FeedbackHeader>,
}

impl Received {
    /// Completed bursts, in completion order.
    pub fn bursts(&self) -> impl Iterator<Item = &Bytes> {
        self.events.iter().filter_map(|event| match event {
            ReassemblyEvent::BurstReceived { burst, .. } => Some(burst),
            ReassemblyEvent::FragmentReceived { .. } => None,
        })
    }
}

#[derive(Debug)]
struct PeerState {
    reassembler: Reassembler,
    decoder: StreamDecoder,
    delay: Option<DelayController>,
    stats: ReceiverStats,
}

#[derive(Debug)]
pub struct BurstReceiver {
    epoch: Epoch,
    feedback: FeedbackConfig,
    max_fragment_bytes: u64,
    peers: HashMap<SocketAddr, PeerState>,
    closed: ReceiverStats,
}

impl BurstReceiver {
    pub fn new(config: &Config, epoch: Epoch) -> Self {
        Self {
            epoch,
            feedback: config.feedback.clone(),
            max_fragment_bytes: config.fragmentation.max_fragment_size,
            peers: HashMap::new(),
            closed: ReceiverStats::default(),
        }
    }

    /// Starts tracking `peer`. Connecting an already known peer keeps its state.
    ///
    /// 开始跟踪 `peer`。重复连接已知对端时保留其状态。
    pub fn connect(&mut self, peer: SocketAddr) {
        let feedback = &self.feedback;
        let max_fragment_bytes = self.max_fragment_bytes;
        self.peers.entry(peer).or_insert_with(|| {
            info!(%peer, feedback = feedback.enabled, "Receiver connected to peer");
            PeerState {
                reassembler: Reassembler::new(),
                decoder: StreamDecoder::new(max_fragment_bytes),
                delay: feedback.enabled.then(|| DelayController::new(feedback)),
                stats: ReceiverStats::default(),
            }
        });
    }

    /// Handles one datagram. Datagrams that do not hold a whole fragment are
    /// counted as discarded.
    ///
    /// 处理一个数据报。未包含完整分片的数据报计为丢弃。
    pub fn on_datagram(
        &mut self,
        peer: SocketAddr,
        datagram: Bytes,
        now: Instant,
    ) -> Result<Received> {
        let epoch = self.epoch;
        let state = self.peers.get_mut(&peer).ok_or(Error::UnknownPeer(peer))?;
        let mut received = Received::default();
        match Fragment::decode_datagram(datagram) {
            Ok(fragment) => state.process(fragment, epoch, now, &mut received),
            Err(error) => {
                warn!(%peer, ?error, "Undecodable datagram dropped");
                state.stats.discarded += 1;
            }
        }
        Ok(received)
    }

    /// Handles one read from a stream transport.
    ///
    /// 处理来自流式传输的一次读取。
    pub fn on_stream_data(
        &mut self,
        peer: SocketAddr,
        data: &[u8],
        now: Instant,
    ) -> Result<Received> {
        let epoch = self.epoch;
        let state = self.peers.get_mut(&peer).ok_or(Error::UnknownPeer(peer))?;
        state.decoder.extend(data);
        let mut received = Received::default();
        while let Some(fragment) = state.decoder.next_fragment() {
            state.process(fragment, epoch, now, &mut received);
        }
        Ok(received)
    }

    /// Forgets `peer`. Its counters stay in the totals.
    ///
    /// 忘记 `peer`。其计数器保留在总计中。
    pub fn on_peer_close(&mut self, peer: SocketAddr) -> Result<()> {
        let state = self.peers.remove(&peer).ok_or(Error::UnknownPeer(peer))?;
        info!(
            %peer,
            bursts = state.stats.bursts,
            bytes = state.stats.bytes,
            pending = state.reassembler.fragments_merged(),
            "Receiver peer closed"
        );
        self.closed += state.stats;
        Ok(())
    }

    pub fn is_connected(&self, peer: &SocketAddr) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_stats(&self, peer: &SocketAddr) -> Option<ReceiverStats> {
        self.peers.get(peer).map(|state| state.stats)
    }

    /// Totals over every peer, closed ones included.
    ///
    /// 所有对端（包括已关闭的）的总计。
    pub fn stats(&self) -> ReceiverStats {
        self.peers
            .values()
            .fold(self.closed, |mut total, state| {
                total += state.stats;
                total
            })
    }
}

impl PeerState {
    fn process(&mut self, fragment: Fragment, epoch: Epoch, now: Instant, out: &mut Received) {
        let header = fragment.header;
        self.stats.fragments += 1;
        self.stats.bytes += header.fragment_bytes;

        if let Some(delay) = self.delay.as_mut() {
            let one_way = epoch.elapsed_since(header.timestamp, now);
            let target_rate = delay.on_fragment(now, header.fragment_bytes, one_way);
            out.feedback.push(FeedbackHeader {
                target_rate,
                seq: header.burst_seq,
                timestamp: header.timestamp,
            });
        }

        match self.reassembler.on_fragment(header, fragment.payload) {
            Ok(events) => {
                for event in events {
                    if let ReassemblyEvent::BurstReceived { header, .. } = &event {
                        self.stats.bursts += 1;
                        trace!(burst_seq = header.burst_seq, "Burst complete");
                    }
                    out.events.push(event);
                }
            }
            Err(reason) => {
                trace!(
                    burst_seq = header.burst_seq,
                    frag_seq = header.frag_seq,
                    ?reason,
                    "Fragment not merged"
                );
                self.stats.discarded += 1;
            }
        }
    }
}

impl std::ops::AddAssign for ReceiverStats {
    fn add_assign(&mut self, other: Self) {
        self.fragments += other.fragments;
        self.bytes += other.bytes;
        self.bursts += other.bursts;
        self.discarded += other.discarded;
    }
}
