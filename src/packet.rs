//! The packet module, containing the wire formats exchanged between a burst
//! sender and a burst receiver.
//! packet 模块，包含突发发送端与接收端之间交换的线上格式。

pub mod feedback;
pub mod fragment;
pub mod header;
pub mod stream;

#[cfg(test)]
mod tests;
