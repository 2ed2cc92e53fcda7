//! tests/common/harness.rs
#![allow(dead_code)]

use bursty_transport::clock::Epoch;
use bursty_transport::config::Config;
use bursty_transport::core::receiver::BurstReceiver;
use bursty_transport::core::reassembly::ReassemblyEvent;
use bursty_transport::generator::BurstGenerator;
use bursty_transport::packet::header::FragmentHeader;
use bursty_transport::rate::DataRate;
use bursty_transport::server::BurstServer;
use bursty_transport::transport::{CapacityProbe, Transport, TransportKind};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::time::Instant;

/// Step of the simulated clock.
pub const TICK: Duration = Duration::from_millis(1);

/// Largest read a simulated stream hands to the receiver at once.
const STREAM_READ: usize = 700;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "bursty_transport=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

pub fn client_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[derive(Debug)]
struct LinkState {
    kind: TransportKind,
    rate: DataRate,
    capacity: u64,
    propagation: Duration,
    busy_until: Option<Instant>,
    /// Lengths of writes still in the send buffer and when they leave it.
    buffer: VecDeque<(u64, Instant)>,
    /// Writes on their way to the receiver and when they arrive.
    arrivals: VecDeque<(Bytes, Instant)>,
}

impl LinkState {
    fn occupancy(&mut self, now: Instant) -> u64 {
        while self.buffer.front().is_some_and(|&(_, done)| done <= now) {
            self.buffer.pop_front();
        }
        self.buffer.iter().map(|&(len, _)| len).sum()
    }
}

/// The sending end of a simulated bottleneck: a send buffer of fixed size
/// drained at a fixed rate, followed by a fixed propagation delay.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    state: Arc<Mutex<LinkState>>,
}

impl SimulatedLink {
    pub fn new(
        kind: TransportKind,
        rate: DataRate,
        capacity: u64,
        propagation: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState {
                kind,
                rate,
                capacity,
                propagation,
                busy_until: None,
                buffer: VecDeque::new(),
                arrivals: VecDeque::new(),
            })),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.state.lock().unwrap().kind
    }

    /// Takes every write that reached the far end by `now`.
    pub fn take_arrived(&self, now: Instant) -> Vec<Bytes> {
        let mut state = self.state.lock().unwrap();
        let mut arrived = Vec::new();
        while state.arrivals.front().is_some_and(|(_, at)| *at <= now) {
            if let Some((data, _)) = state.arrivals.pop_front() {
                arrived.push(data);
            }
        }
        arrived
    }
}

impl CapacityProbe for SimulatedLink {
    fn available_write_capacity(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let occupancy = state.occupancy(Instant::now());
        state.capacity.saturating_sub(occupancy)
    }

    fn send_buffer_capacity(&self) -> u64 {
        self.state.lock().unwrap().capacity
    }
}

impl Transport for SimulatedLink {
    fn kind(&self) -> TransportKind {
        self.state.lock().unwrap().kind
    }

    fn send(&mut self, data: Bytes) -> bursty_transport::Result<usize> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let len = data.len() as u64;
        let start = state.busy_until.map_or(now, |busy| busy.max(now));
        let done = start + state.rate.transmit_time(len).unwrap_or_default();
        state.busy_until = Some(done);
        state.buffer.push_back((len, done));
        let arrival = done + state.propagation;
        state.arrivals.push_back((data, arrival));
        Ok(len as usize)
    }
}

/// One link configuration for a peer.
#[derive(Debug, Clone, Copy)]
pub struct LinkSpec {
    pub kind: TransportKind,
    pub rate: DataRate,
    pub capacity: u64,
    pub propagation: Duration,
}

impl LinkSpec {
    pub fn datagram(rate: DataRate) -> Self {
        Self {
            kind: TransportKind::Datagram,
            rate,
            capacity: 64 * 1024,
            propagation: Duration::from_millis(5),
        }
    }

    pub fn stream(rate: DataRate) -> Self {
        Self {
            kind: TransportKind::Stream,
            ..Self::datagram(rate)
        }
    }
}

/// A burst as the receiver delivered it.
#[derive(Debug, Clone)]
pub struct DeliveredBurst {
    pub header: FragmentHeader,
    pub burst: Bytes,
}

/// A server and a receiver joined by simulated links, stepped on a paused clock.
pub struct Session {
    pub server: BurstServer,
    pub receiver: BurstReceiver,
    links: HashMap<SocketAddr, SimulatedLink>,
    pub delivered: HashMap<SocketAddr, Vec<DeliveredBurst>>,
    pub rates: HashMap<SocketAddr, Vec<DataRate>>,
    pub feedback_reports: usize,
}

impl Session {
    pub fn new(config: Config) -> Self {
        init_tracing();
        let epoch = Epoch::new(Instant::now());
        let receiver = BurstReceiver::new(&config, epoch);
        let server = BurstServer::new(config, epoch).unwrap();
        Self {
            server,
            receiver,
            links: HashMap::new(),
            delivered: HashMap::new(),
            rates: HashMap::new(),
            feedback_reports: 0,
        }
    }

    pub fn connect(
        &mut self,
        peer: SocketAddr,
        link: LinkSpec,
        generator: Box<dyn BurstGenerator>,
    ) {
        let sim = SimulatedLink::new(link.kind, link.rate, link.capacity, link.propagation);
        self.receiver.connect(peer);
        self.server
            .accept(peer, Box::new(sim.clone()), generator, Instant::now())
            .unwrap();
        self.links.insert(peer, sim);
    }

    /// Closes `peer` on both ends.
    pub fn close(&mut self, peer: SocketAddr) {
        self.server.handle_peer_close(peer).unwrap();
        self.receiver.on_peer_close(peer).unwrap();
    }

    /// Steps the clock for `duration`, at most one tick at a time and exactly
    /// onto every server timer.
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            self.server.poll_timers(now).unwrap();
            self.deliver(now);
            self.drain(now);
            self.sample_rates();
            if now >= deadline {
                break;
            }
            // Wake on the next tick, or earlier for a server timer.
            let wake = self
                .server
                .next_deadline()
                .map_or(now + TICK, |timer| timer.min(now + TICK))
                .min(deadline);
            tokio::time::sleep_until(wake).await;
        }
    }

    fn deliver(&mut self, now: Instant) {
        for (&peer, link) in &self.links {
            let arrived = link.take_arrived(now);
            if arrived.is_empty() || !self.receiver.is_connected(&peer) {
                continue;
            }
            let results = match link.kind() {
                TransportKind::Datagram => arrived
                    .into_iter()
                    .map(|datagram| self.receiver.on_datagram(peer, datagram, now).unwrap())
                    .collect::<Vec<_>>(),
                TransportKind::Stream => {
                    let stream: BytesMut =
                        arrived.iter().flat_map(|b| b.iter().copied()).collect();
                    stream
                        .chunks(STREAM_READ)
                        .map(|chunk| self.receiver.on_stream_data(peer, chunk, now).unwrap())
                        .collect()
                }
            };

            for received in results {
                for event in received.events {
                    if let ReassemblyEvent::BurstReceived { header, burst } = event {
                        self.delivered
                            .entry(peer)
                            .or_default()
                            .push(DeliveredBurst { header, burst });
                    }
                }
                if received.feedback.is_empty() || !self.server.is_connected(&peer) {
                    continue;
                }
                let mut wire = BytesMut::new();
                for feedback in &received.feedback {
                    feedback.encode(&mut wire);
                }
                self.feedback_reports += received.feedback.len();
                self.server.handle_feedback(peer, &wire).unwrap();
            }
        }
    }

    fn drain(&mut self, now: Instant) {
        let peers: Vec<_> = self.links.keys().copied().collect();
        for peer in peers {
            if self.server.is_connected(&peer) {
                self.server.handle_send_ready(peer, now).unwrap();
            }
        }
    }

    fn sample_rates(&mut self) {
        for peer in self.links.keys() {
            if let Some(rate) = self.server.target_rate(peer) {
                self.rates.entry(*peer).or_default().push(rate);
            }
        }
    }

    pub fn delivered(&self, peer: &SocketAddr) -> &[DeliveredBurst] {
        self.delivered.get(peer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rates(&self, peer: &SocketAddr) -> &[DataRate] {
        self.rates.get(peer).map(Vec::as_slice).unwrap_or(&[])
    }
}
