//! Transport boundary consumed by the burst sender.
//!
//! The sender never special-cases a transport type. Everything it needs to
//! pace fragments and to measure buffer occupancy goes through
//! [`CapacityProbe`], and fragments leave through [`Transport::send`].
//! Reads flow the other way: the host pushes what it reads into
//! [`crate::core::receiver::BurstReceiver`].
//!
//! 突发发送端使用的传输边界。发送端从不针对具体传输类型做特殊处理：
//! 分片节奏控制和缓冲区占用测量都通过 [`CapacityProbe`] 完成，分片经由
//! [`Transport::send`] 发出。读取方向相反：宿主把读到的数据推送给
//! [`crate::core::receiver::BurstReceiver`]。

use crate::error::Result;
use bytes::Bytes;
use std::fmt::Debug;

/// How a transport treats write boundaries.
///
/// 传输如何对待写边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Every write arrives as one read, or not at all.
    /// 每次写入作为一次读取到达，或者根本不到达。
    Datagram,
    /// Writes arrive as an ordered byte stream with no boundaries.
    /// 写入作为无边界的有序字节流到达。
    Stream,
}

/// Reports how much the transport's send buffer can currently take.
///
/// 报告传输发送缓冲区当前还能容纳多少数据。
pub trait CapacityProbe {
    /// Bytes that can be written right now without blocking.
    ///
    /// 当前无需阻塞即可写入的字节数。
    fn available_write_capacity(&self) -> u64;

    /// Total size of the send buffer. When the buffer is idle this equals
    /// [`available_write_capacity`](Self::available_write_capacity).
    ///
    /// 发送缓冲区的总大小。缓冲区空闲时等于可用写容量。
    fn send_buffer_capacity(&self) -> u64;

    /// Bytes handed to the transport that it has not finished sending.
    fn buffer_occupancy(&self) -> u64 {
        self.send_buffer_capacity()
            .saturating_sub(self.available_write_capacity())
    }

    /// Whether the send buffer is back to its baseline.
    fn is_idle(&self) -> bool {
        self.available_write_capacity() >= self.send_buffer_capacity()
    }
}

/// A connected transport a sender writes fragments into.
///
/// 发送端写入分片的已连接传输。
pub trait Transport: CapacityProbe + Send + Debug {
    fn kind(&self) -> TransportKind;

    /// Hands one encoded fragment to the transport and returns the number of
    /// bytes it accepted. Callers only send when
    /// [`CapacityProbe::available_write_capacity`] covers the whole fragment,
    /// and hand the unaccepted rest over again on a later send.
    ///
    /// 将一个已编码的分片交给传输，返回其接受的字节数。调用方只在可用写容量
    /// 足以容纳整个分片时发送，未被接受的剩余部分会在之后的发送中再次交出。
    fn send(&mut self, data: Bytes) -> Result<usize>;
}
