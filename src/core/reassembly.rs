//! Rebuilds bursts from fragments that may arrive out of order.
//!
//! Only one burst is assembled at a time. A fragment of a newer burst
//! abandons whatever is left of the current one; fragments of older bursts
//! are dropped on arrival.
//!
//! 从可能乱序到达的分片重建突发。同一时间只组装一个突发：较新突发的分片会放弃
//! 当前突发的剩余部分，较旧突发的分片在到达时即被丢弃。

use crate::packet::header::FragmentHeader;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, btree_map::Entry};
use tracing::{debug, trace, warn};

/// What merging a fragment produced.
///
/// 合并分片产生的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyEvent {
    /// A fragment was merged into the burst, in order or from the
    /// out-of-order buffer.
    /// 一个分片被合并进突发（按序到达或从乱序缓冲区取出）。
    FragmentReceived { header: FragmentHeader },
    /// Every fragment of a burst has been merged.
    /// 突发的所有分片均已合并。
    BurstReceived { header: FragmentHeader, burst: Bytes },
}

/// Why a fragment was not merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Belongs to a burst older than the one being assembled.
    Stale,
    /// Already merged or already buffered.
    Duplicate,
    /// Fragment sequence outside the declared fragment count.
    Malformed,
}

/// Per-peer reassembly state.
///
/// 每个对端的重组状态。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reassembler {
    current_burst_seq: u32,
    fragments_merged: u16,
    merged: BytesMut,
    /// Fragments ahead of `fragments_merged`, all from `current_burst_seq`.
    out_of_order: BTreeMap<u16, (FragmentHeader, Bytes)>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_burst_seq(&self) -> u32 {
        self.current_burst_seq
    }

    pub fn fragments_merged(&self) -> u16 {
        self.fragments_merged
    }

    /// Bytes merged so far for the current burst.
    pub fn merged_len(&self) -> usize {
        self.merged.len()
    }

    /// Fragments waiting for a gap to be filled.
    pub fn buffered_fragments(&self) -> usize {
        self.out_of_order.len()
    }

    /// Feeds one fragment. Returns the events it produced, or why it was dropped.
    ///
    /// 输入一个分片。返回其产生的事件，或其被丢弃的原因。
    pub fn on_fragment(
        &mut self,
        header: FragmentHeader,
        payload: Bytes,
    ) -> Result<Vec<ReassemblyEvent>, Discard> {
        if header.total_frags == 0 || header.frag_seq >= header.total_frags {
            warn!(
                burst_seq = header.burst_seq,
                frag_seq = header.frag_seq,
                total_frags = header.total_frags,
                "Fragment sequence outside its burst, dropping"
            );
            return Err(Discard::Malformed);
        }

        if header.burst_seq < self.current_burst_seq {
            trace!(
                burst_seq = header.burst_seq,
                current = self.current_burst_seq,
                "Stale fragment dropped"
            );
            return Err(Discard::Stale);
        }
        if header.burst_seq > self.current_burst_seq {
            if self.fragments_merged > 0 || !self.out_of_order.is_empty() {
                debug!(
                    abandoned = self.current_burst_seq,
                    merged = self.fragments_merged,
                    buffered = self.out_of_order.len(),
                    next = header.burst_seq,
                    "Newer burst started, abandoning the current one"
                );
            }
            self.reset(header.burst_seq);
        }

        let mut events = Vec::new();
        if header.frag_seq == self.fragments_merged {
            self.merge(header, payload, &mut events);
            while let Some((header, payload)) = self.try_pop_next_contiguous() {
                self.merge(header, payload, &mut events);
            }
        } else if header.frag_seq > self.fragments_merged {
            match self.out_of_order.entry(header.frag_seq) {
                Entry::Vacant(entry) => {
                    trace!(
                        burst_seq = header.burst_seq,
                        frag_seq = header.frag_seq,
                        expected = self.fragments_merged,
                        "Buffering out-of-order fragment"
                    );
                    entry.insert((header, payload));
                }
                Entry::Occupied(_) => {
                    warn!(
                        burst_seq = header.burst_seq,
                        frag_seq = header.frag_seq,
                        "Duplicate out-of-order fragment ignored"
                    );
                    return Err(Discard::Duplicate);
                }
            }
        } else {
            trace!(
                burst_seq = header.burst_seq,
                frag_seq = header.frag_seq,
                "Fragment already merged, ignoring"
            );
            return Err(Discard::Duplicate);
        }

        if self.fragments_merged == header.total_frags && !events.is_empty() {
            self.complete(header, &mut events);
        }
        Ok(events)
    }

    fn reset(&mut self, burst_seq: u32) {
        self.current_burst_seq = burst_seq;
        self.fragments_merged = 0;
        self.merged.clear();
        self.out_of_order.clear();
    }

    fn merge(
        &mut self,
        header: FragmentHeader,
        payload: Bytes,
        events: &mut Vec<ReassemblyEvent>,
    ) {
        self.merged.extend_from_slice(&payload);
        self.fragments_merged += 1;
        trace!(
            burst_seq = header.burst_seq,
            frag_seq = header.frag_seq,
            merged = self.fragments_merged,
            total_frags = header.total_frags,
            "Fragment merged"
        );
        events.push(ReassemblyEvent::FragmentReceived { header });
    }

    /// Removes the buffered fragment that continues the merged run, if present.
    fn try_pop_next_contiguous(&mut self) -> Option<(FragmentHeader, Bytes)> {
        if let Some((&seq, _)) = self.out_of_order.first_key_value() {
            if seq == self.fragments_merged {
                return self.out_of_order.pop_first().map(|(_, entry)| entry);
            }
        }
        None
    }

    fn complete(&mut self, header: FragmentHeader, events: &mut Vec<ReassemblyEvent>) {
        if self.merged.len() as u64 != header.burst_size {
            warn!(
                burst_seq = header.burst_seq,
                merged = self.merged.len(),
                declared = header.burst_size,
                "Reassembled burst size differs from the declared size, dropping burst"
            );
            self.merged.clear();
            return;
        }
        let burst = self.merged.split().freeze();
        debug!(
            burst_seq = header.burst_seq,
            size = burst.len(),
            total_frags = header.total_frags,
            "Burst received"
        );
        events.push(ReassemblyEvent::BurstReceived { header, burst });
    }
}
