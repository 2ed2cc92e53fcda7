//! 定义接收端发回发送端的反馈头。
//! Defines the feedback header a receiver sends back to its sender.

use crate::rate::DataRate;
use bytes::{Buf, BufMut};

/// Serialized size of a [`FeedbackHeader`].
pub const FEEDBACK_HEADER_SIZE: usize = 20;

/// A target rate computed by the receiver, echoed with the sequence and
/// timestamp of the fragment that triggered it.
///
/// 接收端计算出的目标速率，附带触发它的分片的序号和时间戳。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedbackHeader {
    /// The rate the receiver wants the sender to produce at. Zero means "no opinion".
    /// 接收端期望发送端采用的速率。零表示“无意见”。
    pub target_rate: DataRate,
    /// The burst sequence of the fragment being answered.
    /// 被应答分片的突发序号。
    pub seq: u32,
    /// The timestamp of the fragment being answered.
    /// 被应答分片的时间戳。
    pub timestamp: u64,
}

impl FeedbackHeader {
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(self.target_rate.bps());
        buf.put_u32(self.seq);
        buf.put_u64(self.timestamp);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < FEEDBACK_HEADER_SIZE {
            return None;
        }
        Some(FeedbackHeader {
            target_rate: DataRate::from_bps(buf.get_u64()),
            seq: buf.get_u32(),
            timestamp: buf.get_u64(),
        })
    }
}
