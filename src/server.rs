//! The multi-peer burst server.
//!
//! Every accepted peer gets its own sender instance, transport and two
//! timers: the burst timer that paces the session, and the stop timer that
//! ends it after the configured session duration. The accept table is the
//! only structure shared across peers; a failing peer is torn down alone.
//!
//! 多对端突发服务器。每个接入的对端拥有独立的发送实例、传输以及两个定时器：
//! 控制会话节奏的突发定时器，以及在配置的会话时长后结束会话的停止定时器。
//! 接入表是唯一跨对端共享的结构；出错的对端被单独拆除。

use crate::clock::Epoch;
use crate::config::Config;
use crate::core::sender::{BurstOutcome, SenderInstance, SenderStats};
use crate::error::{Error, Result};
use crate::generator::BurstGenerator;
use crate::packet::feedback::FeedbackHeader;
use crate::rate::DataRate;
use crate::timer::{EventQueue, TimerEntry, TimerSlot};
use crate::transport::Transport;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timer events the server schedules for its peers.
///
/// 服务器为其对端调度的定时器事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    Burst(SocketAddr),
    Stop(SocketAddr),
}

#[derive(Debug)]
struct PeerEntry {
    sender: SenderInstance,
    transport: Box<dyn Transport>,
    burst_timer: TimerSlot,
    stop_timer: TimerSlot,
}

#[derive(Debug)]
pub struct BurstServer {
    config: Config,
    epoch: Epoch,
    peers: HashMap<SocketAddr, PeerEntry>,
    timers: EventQueue<ServerEvent>,
    closed: SenderStats,
    stopped: bool,
}

impl BurstServer {
    /// Creates a server after validating `config`.
    ///
    /// 校验 `config` 后创建服务器。
    pub fn new(config: Config, epoch: Epoch) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            epoch,
            peers: HashMap::new(),
            timers: EventQueue::new(),
            closed: SenderStats::default(),
            stopped: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accepts `peer`: the first burst goes out at `now`, and the session
    /// stops after the configured duration. A peer that is still connected
    /// is replaced.
    ///
    /// 接入 `peer`：第一个突发在 `now` 发出，会话在配置的时长后停止。
    /// 仍处于连接状态的同一对端会被替换。
    pub fn accept(
        &mut self,
        peer: SocketAddr,
        transport: Box<dyn Transport>,
        generator: Box<dyn BurstGenerator>,
        now: Instant,
    ) -> Result<()> {
        if self.stopped {
            return Err(Error::ConnectionClosed);
        }
        if self.peers.contains_key(&peer) {
            info!(%peer, "Peer reconnected with a lingering session, replacing it");
            self.close_peer(peer);
        }

        let sender = SenderInstance::new(peer, &self.config, generator, self.epoch)?;
        let mut entry = PeerEntry {
            sender,
            transport,
            burst_timer: TimerSlot::default(),
            stop_timer: TimerSlot::default(),
        };
        entry
            .burst_timer
            .set(self.timers.add_timer(now, ServerEvent::Burst(peer)));
        entry.stop_timer.set(self.timers.add_timer(
            now + self.config.session.duration,
            ServerEvent::Stop(peer),
        ));
        info!(
            %peer,
            kind = ?entry.transport.kind(),
            duration = ?self.config.session.duration,
            "Peer accepted"
        );
        self.peers.insert(peer, entry);
        Ok(())
    }

    /// Handles one expired timer at `now`. The next burst is due one period
    /// after this one was due, so late dispatch does not stretch the cadence.
    /// Only fatal errors are returned; peer-level failures close that peer.
    ///
    /// 在 `now` 处理一个到期的定时器。下一个突发在本次应到期时刻之后一个周期到期，
    /// 因此延迟分发不会拉长节奏。只返回致命错误，对端级失败会关闭该对端。
    pub fn handle_event(&mut self, entry: TimerEntry<ServerEvent>, now: Instant) -> Result<()> {
        let due = entry.expiry_time;
        match entry.event {
            ServerEvent::Burst(peer) => {
                let Some(peer_entry) = self.peers.get_mut(&peer) else {
                    debug!(%peer, "Burst timer for a closed peer ignored");
                    return Ok(());
                };
                peer_entry.burst_timer.clear();
                match peer_entry
                    .sender
                    .on_burst_timer(peer_entry.transport.as_mut(), now)
                {
                    Ok(BurstOutcome::Scheduled(period)) => {
                        let id = self.timers.add_timer(due + period, ServerEvent::Burst(peer));
                        peer_entry.burst_timer.set(id);
                    }
                    Ok(BurstOutcome::Finished) => self.close_peer(peer),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(%peer, error = %e, "Peer failed, closing it");
                        self.close_peer(peer);
                    }
                }
            }
            ServerEvent::Stop(peer) => {
                if let Some(peer_entry) = self.peers.get_mut(&peer) {
                    peer_entry.stop_timer.clear();
                    peer_entry.sender.finish();
                    info!(%peer, "Session duration elapsed, finishing");
                }
            }
        }
        Ok(())
    }

    /// Fires every timer due at or before `now`. Returns the number handled.
    ///
    /// 触发所有不晚于 `now` 到期的定时器，返回处理的数量。
    pub fn poll_timers(&mut self, now: Instant) -> Result<usize> {
        let mut handled = 0;
        while let Some(entry) = self.timers.pop_expired(now) {
            self.handle_event(entry, now)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// When the next timer is due, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_expiry_time()
    }

    /// Sleeps from timer to timer until `deadline` or until no timer is left.
    ///
    /// 在定时器之间休眠推进，直到 `deadline` 或没有剩余定时器。
    pub async fn run_until(&mut self, deadline: Instant) -> Result<()> {
        while let Some(next) = self.next_deadline() {
            if next > deadline {
                break;
            }
            tokio::time::sleep_until(next).await;
            self.poll_timers(next)?;
        }
        Ok(())
    }

    /// The transport of `peer` can take more data.
    ///
    /// `peer` 的传输可以接收更多数据。
    pub fn handle_send_ready(&mut self, peer: SocketAddr, now: Instant) -> Result<usize> {
        let entry = self.peers.get_mut(&peer).ok_or(Error::UnknownPeer(peer))?;
        match entry.sender.on_send_ready(entry.transport.as_mut(), now) {
            Ok(sent) => Ok(sent),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(%peer, error = %e, "Peer failed while draining, closing it");
                self.close_peer(peer);
                Err(e)
            }
        }
    }

    /// Applies feedback bytes read from `peer`. Returns the rate applied, if any.
    ///
    /// 应用从 `peer` 读取的反馈字节。返回实际采用的速率（如有）。
    pub fn handle_feedback(
        &mut self,
        peer: SocketAddr,
        mut data: &[u8],
    ) -> Result<Option<DataRate>> {
        let entry = self.peers.get_mut(&peer).ok_or(Error::UnknownPeer(peer))?;
        let mut applied = None;
        while let Some(feedback) = FeedbackHeader::decode(&mut data) {
            applied = entry.sender.on_feedback(&feedback).or(applied);
        }
        if !data.is_empty() {
            warn!(%peer, trailing = data.len(), "Truncated feedback dropped");
        }
        Ok(applied)
    }

    /// The peer closed its side or its transport failed.
    ///
    /// 对端关闭了连接或其传输失败。
    pub fn handle_peer_close(&mut self, peer: SocketAddr) -> Result<()> {
        if !self.peers.contains_key(&peer) {
            return Err(Error::UnknownPeer(peer));
        }
        self.close_peer(peer);
        Ok(())
    }

    /// Closes every peer. Later accepts are refused.
    ///
    /// 关闭所有对端。之后的接入请求将被拒绝。
    pub fn stop(&mut self) {
        let peers: Vec<_> = self.peers.keys().copied().collect();
        for peer in peers {
            self.close_peer(peer);
        }
        self.stopped = true;
        info!(totals = ?self.closed, "Server stopped");
    }

    fn close_peer(&mut self, peer: SocketAddr) {
        let Some(mut entry) = self.peers.remove(&peer) else {
            return;
        };
        entry.burst_timer.cancel(&mut self.timers);
        entry.stop_timer.cancel(&mut self.timers);
        entry.sender.close();
        self.closed += entry.sender.stats();
    }

    pub fn is_connected(&self, peer: &SocketAddr) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.timer_count()
    }

    pub fn target_rate(&self, peer: &SocketAddr) -> Option<DataRate> {
        self.peers.get(peer).map(|entry| entry.sender.target_rate())
    }

    pub fn peer_stats(&self, peer: &SocketAddr) -> Option<SenderStats> {
        self.peers.get(peer).map(|entry| entry.sender.stats())
    }

    /// Totals over every peer, closed ones included.
    ///
    /// 所有对端（包括已关闭的）的总计。
    pub fn totals(&self) -> SenderStats {
        self.peers.values().fold(self.closed, |mut total, entry| {
            total += entry.sender.stats();
            total
        })
    }
}
