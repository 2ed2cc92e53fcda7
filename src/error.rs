//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use std::net::SocketAddr;
use thiserror::Error;

/// The primary error type for the bursty transport library.
/// 突发传输库的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O error occurred in the transport binding.
    /// 传输绑定中发生了底层的I/O错误。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured fragment size cannot even hold a fragment header.
    /// 配置的分片大小连一个分片头都放不下。
    #[error("fragment size {fragment_size} is smaller than the header size {header_size}")]
    FragmentSizeTooSmall { fragment_size: u32, header_size: usize },

    /// A burst was requested that is smaller than a single fragment header.
    /// 请求的突发小于单个分片头。
    #[error("burst size {burst_size} is smaller than the header size {header_size}")]
    BurstTooSmall { burst_size: u64, header_size: usize },

    /// The burst would need more fragments than the header can number.
    /// 突发需要的分片数超出了分片头可编号的范围。
    #[error("burst of {burst_size} bytes needs {fragments} fragments, more than u16::MAX")]
    TooManyFragments { burst_size: u64, fragments: u64 },

    /// The payload handed to the fragmenter does not match the planned payload length.
    /// 交给分片器的载荷长度与规划的载荷长度不一致。
    #[error("payload of {actual} bytes does not match the planned {expected} bytes")]
    PayloadLengthMismatch { expected: u64, actual: usize },

    /// The outbound fragment queue is full. The rate loop let the queue grow
    /// without bound, which is a control bug rather than a transient condition.
    ///
    /// 出站分片队列已满。速率环路让队列无限增长，这是控制逻辑缺陷而非瞬时状况。
    #[error("outbound fragment queue exceeded its bound of {capacity} fragments")]
    QueueOverflow { capacity: usize },

    /// The adaptation algorithm name is not one of the supported selections.
    /// 自适应算法名称不是受支持的选项之一。
    #[error("unknown adaptation algorithm: {0:?}")]
    UnknownAlgorithm(String),

    /// A configuration value is outside its valid range.
    /// 配置值超出有效范围。
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// An operation referred to a peer that has no state on this endpoint.
    /// 操作引用了本端没有状态的对端。
    #[error("no state for peer {0}")]
    UnknownPeer(SocketAddr),

    /// The connection was closed by the peer.
    /// 连接被对端关闭。
    #[error("Connection closed by peer")]
    ConnectionClosed,
}

impl Error {
    /// Whether this error must abort the run.
    ///
    /// Configuration errors and queue overflow are fatal. Peer-level errors only
    /// tear down the affected peer.
    ///
    /// 该错误是否必须中止运行。配置错误和队列溢出是致命的，对端级错误只拆除受影响的对端。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::UnknownPeer(_) | Error::ConnectionClosed | Error::Io(_)
        )
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::Io(e) => e,
            Error::ConnectionClosed => ErrorKind::ConnectionReset.into(),
            Error::UnknownPeer(_) => ErrorKind::NotConnected.into(),
            Error::QueueOverflow { .. } => ErrorKind::OutOfMemory.into(),
            Error::FragmentSizeTooSmall { .. }
            | Error::BurstTooSmall { .. }
            | Error::TooManyFragments { .. }
            | Error::PayloadLengthMismatch { .. }
            | Error::UnknownAlgorithm(_)
            | Error::InvalidConfig(_) => std::io::Error::new(ErrorKind::InvalidInput, err),
        }
    }
}
