#![deny(clippy::expect_used, clippy::unwrap_used)]

//! A transport for bursty application traffic.
//!
//! A sender turns each burst its generator asks for into fragments, paces
//! them into a transport as its write capacity allows, and steers the
//! generator's target rate from what it observes of the transport's buffer.
//! A receiver reassembles the fragments into bursts and can report a target
//! rate of its own back to the sender.
//!
//! 面向突发应用流量的传输库。发送端把生成器请求的每个突发切分为分片，按传输的写容量
//! 节奏送入传输，并根据观测到的传输缓冲区状态调节生成器的目标速率。接收端将分片重组
//! 为突发，并可以把自己计算的目标速率反馈给发送端。

pub mod adaptation;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod generator;
pub mod packet;
pub mod rate;
pub mod server;
pub mod timer;
pub mod transport;

mod testing;

pub use error::{Error, Result};
