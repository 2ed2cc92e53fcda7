//! Splits bursts into fragments.
//!
//! The burst size handed in is the number of bytes the burst occupies on the
//! wire, headers included. Every fragment is at least [`HEADER_SIZE`] bytes,
//! so a small remainder borrows bytes from the fragment before it.
//!
//! 将突发拆分为分片。传入的突发大小是突发在线上占用的字节数（含分片头）。
//! 每个分片至少 [`HEADER_SIZE`] 字节，因此较小的余数会向前一个分片借字节。

use crate::error::{Error, Result};
use crate::packet::fragment::Fragment;
use crate::packet::header::{FragmentHeader, HEADER_SIZE};
use bytes::Bytes;
use tracing::{debug, trace};

const HEADER_BYTES: u64 = HEADER_SIZE as u64;

/// A fragment ready to be queued: its header and its encoded bytes.
///
/// 一个准备入队的分片：分片头及其编码后的字节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFragment {
    pub header: FragmentHeader,
    pub bytes: Bytes,
}

impl OutboundFragment {
    /// On-wire size of the fragment.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The fragment boundaries computed for one burst.
///
/// 为一个突发计算出的分片边界。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPlan {
    /// Requested on-wire burst size.
    pub burst_size: u64,
    /// On-wire size of every fragment, in order.
    pub fragment_sizes: Vec<u64>,
}

impl FragmentPlan {
    /// Computes fragment boundaries for a burst of `burst_size` on-wire bytes.
    ///
    /// 1. Cut as many full fragments as fit, keeping the remainder as the last fragment.
    /// 2. Hold back one full fragment as the second-to-last.
    /// 3. If the last fragment is non-empty but smaller than a header, it takes
    ///    exactly a header's worth of bytes from the second-to-last. When the
    ///    second-to-last would then drop below a header itself (fragment sizes
    ///    under two headers), the two are merged into one fragment instead.
    ///
    /// 为线上大小为 `burst_size` 字节的突发计算分片边界：
    /// 1. 切出尽可能多的完整分片，余数作为最后一个分片。
    /// 2. 保留一个完整分片作为倒数第二个分片。
    /// 3. 若最后一个分片非空但小于分片头，则从倒数第二个分片借字节，使其恰好为分片头大小。
    ///    如果借出后倒数第二个分片本身小于分片头（分片大小不足两个分片头时），则将二者合并为一个分片。
    pub fn new(burst_size: u64, fragment_size: u32) -> Result<Self> {
        if (fragment_size as usize) < HEADER_SIZE {
            return Err(Error::FragmentSizeTooSmall {
                fragment_size,
                header_size: HEADER_SIZE,
            });
        }
        if burst_size < HEADER_BYTES {
            return Err(Error::BurstTooSmall {
                burst_size,
                header_size: HEADER_SIZE,
            });
        }

        let fragment_size = fragment_size as u64;
        let mut full_fragments = burst_size / fragment_size;
        let mut last = burst_size % fragment_size;
        let mut second_to_last = 0;
        if full_fragments > 0 {
            second_to_last = fragment_size;
            full_fragments -= 1;
        }
        if second_to_last > 0 && last > 0 && last < HEADER_BYTES {
            let stolen = HEADER_BYTES - last;
            if second_to_last - stolen >= HEADER_BYTES {
                second_to_last -= stolen;
                last = HEADER_BYTES;
            } else {
                second_to_last += last;
                last = 0;
            }
        }

        let total = full_fragments + u64::from(second_to_last > 0) + u64::from(last > 0);
        if total > u16::MAX as u64 {
            return Err(Error::TooManyFragments {
                burst_size,
                fragments: total,
            });
        }

        let mut fragment_sizes = Vec::with_capacity(total as usize);
        fragment_sizes.extend(std::iter::repeat_n(fragment_size, full_fragments as usize));
        if second_to_last > 0 {
            fragment_sizes.push(second_to_last);
        }
        if last > 0 {
            fragment_sizes.push(last);
        }

        Ok(Self {
            burst_size,
            fragment_sizes,
        })
    }

    pub fn total_frags(&self) -> u16 {
        self.fragment_sizes.len() as u16
    }

    /// The logical burst size: on-wire size minus one header per fragment.
    ///
    /// 逻辑突发大小：线上大小减去每个分片的分片头。
    pub fn payload_size(&self) -> u64 {
        self.burst_size - HEADER_BYTES * self.fragment_sizes.len() as u64
    }
}

/// Cuts bursts into fragments and numbers them.
///
/// 将突发切分为分片并为其编号。
#[derive(Debug)]
pub struct Fragmenter {
    fragment_size: u32,
    next_burst_seq: u32,
}

impl Fragmenter {
    pub fn new(fragment_size: u32) -> Result<Self> {
        if (fragment_size as usize) < HEADER_SIZE {
            return Err(Error::FragmentSizeTooSmall {
                fragment_size,
                header_size: HEADER_SIZE,
            });
        }
        Ok(Self {
            fragment_size,
            next_burst_seq: 0,
        })
    }

    pub fn fragment_size(&self) -> u32 {
        self.fragment_size
    }

    /// Number of bursts fragmented so far, which is also the sequence number
    /// of the next one.
    pub fn bursts_fragmented(&self) -> u32 {
        self.next_burst_seq
    }

    pub fn plan(&self, burst_size: u64) -> Result<FragmentPlan> {
        FragmentPlan::new(burst_size, self.fragment_size)
    }

    /// Fragments a burst of `burst_size` on-wire bytes whose payload is all zeros.
    ///
    /// 对线上大小为 `burst_size` 字节、载荷全为零的突发进行分片。
    pub fn fragment_zeroed(
        &mut self,
        burst_size: u64,
        timestamp: u64,
    ) -> Result<Vec<OutboundFragment>> {
        let plan = self.plan(burst_size)?;
        let payload = Bytes::from(vec![0u8; plan.payload_size() as usize]);
        self.fragment(&plan, payload, timestamp)
    }

    /// Slices `payload` along `plan` and emits the fragments in order. The
    /// payload must be exactly [`FragmentPlan::payload_size`] bytes long.
    ///
    /// The burst counter advances once per call, whatever the fragment count.
    ///
    /// 按 `plan` 切分 `payload` 并按序输出分片。载荷长度必须恰好等于
    /// [`FragmentPlan::payload_size`]。无论分片数多少，每次调用突发计数器只前进一次。
    pub fn fragment(
        &mut self,
        plan: &FragmentPlan,
        payload: Bytes,
        timestamp: u64,
    ) -> Result<Vec<OutboundFragment>> {
        let burst_size = plan.payload_size();
        if payload.len() as u64 != burst_size {
            return Err(Error::PayloadLengthMismatch {
                expected: burst_size,
                actual: payload.len(),
            });
        }

        let burst_seq = self.next_burst_seq;
        let total_frags = plan.total_frags();
        debug!(
            burst_seq,
            burst_size = plan.burst_size,
            payload = burst_size,
            total_frags,
            "Fragmenting burst"
        );

        let mut offset = 0usize;
        let mut fragments = Vec::with_capacity(plan.fragment_sizes.len());
        for (frag_seq, &fragment_bytes) in plan.fragment_sizes.iter().enumerate() {
            let len = (fragment_bytes - HEADER_BYTES) as usize;
            let header = FragmentHeader {
                burst_seq,
                frag_seq: frag_seq as u16,
                total_frags,
                burst_size,
                fragment_bytes,
                timestamp,
            };
            let fragment = Fragment {
                header,
                payload: payload.slice(offset..offset + len),
            };
            offset += len;
            trace!(burst_seq, frag_seq, fragment_bytes, "Fragment built");
            fragments.push(OutboundFragment {
                header,
                bytes: fragment.to_bytes(),
            });
        }

        self.next_burst_seq = self.next_burst_seq.wrapping_add(1);
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn payload_sum(plan: &FragmentPlan) -> u64 {
        plan.fragment_sizes.iter().map(|s| s - HEADER_BYTES).sum()
    }

    #[test]
    fn test_3700_bytes_in_1200_byte_fragments() {
        let plan = FragmentPlan::new(3700, 1200).unwrap();
        assert_eq!(plan.fragment_sizes, vec![1200, 1200, 1200, 100]);
        assert_eq!(plan.total_frags(), 4);
        assert_eq!(plan.payload_size(), 3700 - 4 * HEADER_BYTES);
        assert_eq!(payload_sum(&plan) + HEADER_BYTES * 4, 3700);
    }

    #[test]
    fn test_small_remainder_steals_from_second_to_last() {
        let plan = FragmentPlan::new(3610, 1200).unwrap();
        assert_eq!(plan.fragment_sizes, vec![1200, 1200, 1178, HEADER_BYTES]);
        assert_eq!(plan.fragment_sizes.iter().sum::<u64>(), 3610);
    }

    #[test]
    fn test_exact_multiple_has_no_last_fragment() {
        let plan = FragmentPlan::new(2400, 1200).unwrap();
        assert_eq!(plan.fragment_sizes, vec![1200, 1200]);
    }

    #[test]
    fn test_burst_smaller_than_fragment() {
        let plan = FragmentPlan::new(500, 1200).unwrap();
        assert_eq!(plan.fragment_sizes, vec![500]);
        let plan = FragmentPlan::new(HEADER_BYTES, 1200).unwrap();
        assert_eq!(plan.fragment_sizes, vec![HEADER_BYTES]);
        assert_eq!(plan.payload_size(), 0);
    }

    #[test]
    fn test_tiny_fragment_size_merges_instead_of_stealing() {
        let fragment_size = HEADER_SIZE as u32;
        let plan = FragmentPlan::new(3 * HEADER_BYTES + 5, fragment_size).unwrap();
        assert_eq!(
            plan.fragment_sizes,
            vec![HEADER_BYTES, HEADER_BYTES, HEADER_BYTES + 5]
        );
    }

    #[test]
    fn test_configuration_errors() {
        assert!(matches!(
            FragmentPlan::new(HEADER_BYTES - 1, 1200),
            Err(Error::BurstTooSmall { .. })
        ));
        assert!(matches!(
            FragmentPlan::new(3000, HEADER_SIZE as u32 - 1),
            Err(Error::FragmentSizeTooSmall { .. })
        ));
        assert!(matches!(
            FragmentPlan::new(u16::MAX as u64 * 100 + 1000, 100),
            Err(Error::TooManyFragments { .. })
        ));
        assert!(Fragmenter::new(8).is_err());
    }

    #[test]
    fn test_sizes_sum_and_respect_header_minimum() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..2000 {
            let fragment_size = rng.random_range(HEADER_SIZE as u32..=1500);
            let burst_size = rng.random_range(HEADER_BYTES..=60_000);
            let plan = FragmentPlan::new(burst_size, fragment_size).unwrap();
            assert_eq!(
                plan.fragment_sizes.iter().sum::<u64>(),
                burst_size,
                "burst {burst_size} fragment {fragment_size}"
            );
            assert_eq!(payload_sum(&plan), plan.payload_size());
            assert!(plan.fragment_sizes.iter().all(|&s| s >= HEADER_BYTES));
            if fragment_size as usize >= 2 * HEADER_SIZE {
                assert!(plan.fragment_sizes.iter().all(|&s| s <= fragment_size as u64));
            }
        }
    }

    #[test]
    fn test_fragment_headers_and_payload_slices() {
        let mut fragmenter = Fragmenter::new(1200).unwrap();
        let plan = fragmenter.plan(3700).unwrap();
        let payload: Bytes = (0..plan.payload_size()).map(|i| i as u8).collect::<Vec<_>>().into();
        let fragments = fragmenter.fragment(&plan, payload.clone(), 77).unwrap();

        assert_eq!(fragments.len(), 4);
        let mut rebuilt = Vec::new();
        for (i, fragment) in fragments.iter().enumerate() {
            assert_eq!(fragment.header.burst_seq, 0);
            assert_eq!(fragment.header.frag_seq, i as u16);
            assert_eq!(fragment.header.total_frags, 4);
            assert_eq!(fragment.header.burst_size, plan.payload_size());
            assert_eq!(fragment.header.timestamp, 77);
            assert_eq!(fragment.len() as u64, fragment.header.fragment_bytes);
            rebuilt.extend_from_slice(&fragment.bytes[HEADER_SIZE..]);
        }
        assert_eq!(rebuilt, payload.to_vec());
        assert!(fragments.last().unwrap().header.is_last());
    }

    #[test]
    fn test_burst_counter_advances_once_per_burst() {
        let mut fragmenter = Fragmenter::new(1200).unwrap();
        let first = fragmenter.fragment_zeroed(10_000, 0).unwrap();
        let second = fragmenter.fragment_zeroed(100, 0).unwrap();
        assert!(first.len() > 1);
        assert!(first.iter().all(|f| f.header.burst_seq == 0));
        assert_eq!(second[0].header.burst_seq, 1);
        assert_eq!(fragmenter.bursts_fragmented(), 2);
    }

    #[test]
    fn test_payload_length_mismatch() {
        let mut fragmenter = Fragmenter::new(1200).unwrap();
        let plan = fragmenter.plan(3700).unwrap();
        assert!(matches!(
            fragmenter.fragment(&plan, Bytes::from_static(b"short"), 0),
            Err(Error::PayloadLengthMismatch { .. })
        ));
        assert_eq!(fragmenter.bursts_fragmented(), 0);
    }
}
