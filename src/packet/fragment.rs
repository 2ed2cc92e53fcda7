//! 定义了在网络上传输的完整分片。
//! Defines a complete fragment as transmitted on the network.

use super::header::{FragmentHeader, HEADER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// Why an inbound buffer could not be turned into a fragment.
///
/// 入站缓冲区无法转换为分片的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than a header.
    /// 字节数少于一个分片头。
    Truncated { len: usize },
    /// The header declares a fragment smaller than the header itself, or
    /// larger than the receiver accepts.
    /// 分片头声明的分片小于分片头本身，或大于接收端可接受的大小。
    InvalidLength { fragment_bytes: u64 },
    /// The header declares more bytes than are available.
    /// 分片头声明的字节数多于可用字节数。
    Incomplete { fragment_bytes: u64, len: usize },
}

/// A fragment: its header and the slice of burst payload it carries.
/// 一个分片：分片头以及它携带的突发载荷切片。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub payload: Bytes,
}

impl Fragment {
    /// 将分片编码到缓冲区。
    /// Encodes the fragment into a buffer.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.encode(buf);
        buf.put_slice(&self.payload);
    }

    /// Encodes the fragment into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Validates the header at the front of `bytes` against the bytes available.
    ///
    /// 根据可用字节校验 `bytes` 开头的分片头。
    pub fn check(bytes: &[u8]) -> Result<FragmentHeader, DecodeError> {
        Self::check_bounded(bytes, u64::MAX)
    }

    /// Like [`Fragment::check`], also rejecting fragments declared larger
    /// than `max_fragment_bytes`.
    ///
    /// 与 [`Fragment::check`] 相同，但同时拒绝声明长度超过 `max_fragment_bytes` 的分片。
    pub fn check_bounded(
        bytes: &[u8],
        max_fragment_bytes: u64,
    ) -> Result<FragmentHeader, DecodeError> {
        let header =
            FragmentHeader::peek(bytes).ok_or(DecodeError::Truncated { len: bytes.len() })?;
        if header.fragment_bytes < HEADER_SIZE as u64 || header.fragment_bytes > max_fragment_bytes
        {
            return Err(DecodeError::InvalidLength {
                fragment_bytes: header.fragment_bytes,
            });
        }
        if header.fragment_bytes > bytes.len() as u64 {
            return Err(DecodeError::Incomplete {
                fragment_bytes: header.fragment_bytes,
                len: bytes.len(),
            });
        }
        Ok(header)
    }

    /// Decodes the fragment a datagram carries. Bytes after the declared
    /// fragment length are ignored.
    ///
    /// 解码数据报携带的分片。声明的分片长度之后的字节被忽略。
    pub fn decode_datagram(datagram: Bytes) -> Result<Self, DecodeError> {
        let header = Self::check(&datagram)?;
        let payload = datagram.slice(HEADER_SIZE..header.fragment_bytes as usize);
        Ok(Fragment { header, payload })
    }

    /// Splits one complete fragment off the front of a stream buffer.
    /// Leaves the buffer untouched if the fragment is not complete yet.
    ///
    /// 从流缓冲区前部切出一个完整分片。分片尚不完整时不改动缓冲区。
    pub fn split_from(buf: &mut BytesMut, max_fragment_bytes: u64) -> Result<Self, DecodeError> {
        let header = Self::check_bounded(buf, max_fragment_bytes)?;
        let mut frame = buf.split_to(header.fragment_bytes as usize);
        let payload = frame.split_off(HEADER_SIZE).freeze();
        Ok(Fragment { header, payload })
    }
}
