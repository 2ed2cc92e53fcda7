//! Splits a byte stream back into fragments.
//!
//! Stream transports do not preserve write boundaries. Reads are appended to
//! an internal buffer and complete fragments are cut off its front using the
//! `fragment_bytes` field of the header found there. A short read, whether it
//! cuts a header or a payload in half, simply waits for more bytes.
//!
//! 将字节流还原为分片。流式传输不保留写边界：读取的数据追加到内部缓冲区，
//! 再依据缓冲区前部分片头的 `fragment_bytes` 字段切出完整分片。
//! 不完整的读取（无论截断的是分片头还是载荷）只需等待更多字节。
//!
//! A declared length outside `HEADER_SIZE..=max_fragment_bytes` means the
//! stream is corrupt; waiting for it would stall the stream forever.
//!
//! 声明长度超出 `HEADER_SIZE..=max_fragment_bytes` 意味着流已损坏，等待它会让流永远停滞。

use super::fragment::{DecodeError, Fragment};
use bytes::BytesMut;
use tracing::{trace, warn};

#[derive(Debug)]
pub struct StreamDecoder {
    buffer: BytesMut,
    max_fragment_bytes: u64,
}

impl StreamDecoder {
    pub fn new(max_fragment_bytes: u64) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_fragment_bytes,
        }
    }

    /// Appends bytes read from the stream.
    ///
    /// 追加从流中读取的字节。
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for the rest of their fragment.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete fragment, or `None` if more bytes are needed.
    ///
    /// A header declaring a fragment shorter than the header itself or longer
    /// than the limit leaves no way to find the next boundary, so everything
    /// buffered is discarded.
    ///
    /// 返回下一个完整分片，需要更多字节时返回 `None`。
    /// 若分片头声明的长度小于分片头本身或超过上限，将无法找到下一个边界，缓冲的数据全部丢弃。
    pub fn next_fragment(&mut self) -> Option<Fragment> {
        match Fragment::split_from(&mut self.buffer, self.max_fragment_bytes) {
            Ok(fragment) => Some(fragment),
            Err(DecodeError::Truncated { len }) => {
                trace!(buffered = len, "Waiting for the rest of a fragment header");
                None
            }
            Err(DecodeError::Incomplete {
                fragment_bytes,
                len,
            }) => {
                trace!(
                    buffered = len,
                    fragment_bytes, "Waiting for the rest of a fragment"
                );
                None
            }
            Err(DecodeError::InvalidLength { fragment_bytes }) => {
                warn!(
                    fragment_bytes,
                    discarded = self.buffer.len(),
                    "Corrupt fragment length on stream, discarding buffered bytes"
                );
                self.buffer.clear();
                None
            }
        }
    }

    /// Drains every complete fragment currently buffered.
    pub fn drain_fragments(&mut self) -> Vec<Fragment> {
        std::iter::from_fn(|| self.next_fragment()).collect()
    }
}
