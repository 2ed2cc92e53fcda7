//! The per-connection machinery: fragmentation, pacing, the rate loop and
//! reassembly, plus the sender and receiver built from them.
//!
//! 每连接的核心机制：分片、发送节奏控制、速率环路与重组，以及由它们组成的发送端和接收端。

pub mod fragmenter;
pub mod pacer;
pub mod rate_loop;
pub mod reassembly;
pub mod receiver;
pub mod sender;
