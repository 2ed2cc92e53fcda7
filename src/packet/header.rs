//! 定义分片头。
//! Defines the fragment header.

use bytes::{Buf, BufMut};

/// Serialized size of a [`FragmentHeader`].
pub const HEADER_SIZE: usize = 32;

/// The header carried in front of every fragment of a burst.
/// 每个突发分片前携带的头部。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentHeader {
    /// The sequence number of the burst this fragment belongs to.
    /// 分片所属突发的序号。
    pub burst_seq: u32,
    /// The position of this fragment within its burst, starting at zero.
    /// 分片在突发内的位置，从零开始。
    pub frag_seq: u16,
    /// The number of fragments the burst was split into.
    /// 突发被拆分成的分片数。
    pub total_frags: u16,
    /// The logical burst size: the sum of all fragment payloads, headers excluded.
    /// 突发的逻辑大小：所有分片载荷之和，不含分片头。
    pub burst_size: u64,
    /// The on-wire size of this fragment, header included.
    /// 该分片的线上大小，含分片头。
    pub fragment_bytes: u64,
    /// Send time in microseconds since the connection epoch.
    /// 发送时间，自连接纪元起的微秒数。
    pub timestamp: u64,
}

impl FragmentHeader {
    /// 将分片头编码到缓冲区。
    /// Encodes the fragment header into a buffer.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.burst_seq);
        buf.put_u16(self.frag_seq);
        buf.put_u16(self.total_frags);
        buf.put_u64(self.burst_size);
        buf.put_u64(self.fragment_bytes);
        buf.put_u64(self.timestamp);
    }

    /// 从缓冲区解码分片头。
    /// Decodes a fragment header from a buffer.
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < HEADER_SIZE {
            return None;
        }
        Some(FragmentHeader {
            burst_seq: buf.get_u32(),
            frag_seq: buf.get_u16(),
            total_frags: buf.get_u16(),
            burst_size: buf.get_u64(),
            fragment_bytes: buf.get_u64(),
            timestamp: buf.get_u64(),
        })
    }

    /// Reads the header at the front of `bytes` without consuming anything.
    ///
    /// 读取 `bytes` 开头的分片头，不消费任何字节。
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        let mut cursor = bytes;
        Self::decode(&mut cursor)
    }

    /// The number of payload bytes this fragment carries.
    pub fn payload_len(&self) -> u64 {
        self.fragment_bytes.saturating_sub(HEADER_SIZE as u64)
    }

    /// Whether this is the last fragment of its burst.
    pub fn is_last(&self) -> bool {
        self.frag_seq as u32 + 1 == self.total_frags as u32
    }
}
