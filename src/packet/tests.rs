//! Fragment codec and stream demultiplexing tests.
use super::feedback::{FEEDBACK_HEADER_SIZE, FeedbackHeader};
use super::fragment::{DecodeError, Fragment};
use super::header::{FragmentHeader, HEADER_SIZE};
use super::stream::StreamDecoder;
use crate::rate::DataRate;
use bytes::{Bytes, BytesMut};

const MAX_FRAGMENT: u64 = 64 * 1024;

fn fragment(burst_seq: u32, frag_seq: u16, payload: &'static [u8]) -> Fragment {
    Fragment {
        header: FragmentHeader {
            burst_seq,
            frag_seq,
            total_frags: 3,
            burst_size: 300,
            fragment_bytes: (HEADER_SIZE + payload.len()) as u64,
            timestamp: 1_234_567,
        },
        payload: Bytes::from_static(payload),
    }
}

#[test]
fn test_header_roundtrip() {
    let headers = [
        FragmentHeader::default(),
        FragmentHeader {
            burst_seq: u32::MAX,
            frag_seq: u16::MAX - 1,
            total_frags: u16::MAX,
            burst_size: u64::MAX,
            fragment_bytes: 1200,
            timestamp: u64::MAX,
        },
        FragmentHeader {
            burst_seq: 7,
            frag_seq: 2,
            total_frags: 4,
            burst_size: 3572,
            fragment_bytes: 100,
            timestamp: 16_000,
        },
    ];
    for header in headers {
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        let mut cursor = &buf[..];
        let decoded = FragmentHeader::decode(&mut cursor).expect("decode should succeed");
        assert!(cursor.is_empty(), "decode should consume the entire header");
        assert_eq!(header, decoded);
    }
}

#[test]
fn test_header_network_byte_order() {
    let header = FragmentHeader {
        burst_seq: 0x0102_0304,
        frag_seq: 0x0506,
        ..Default::default()
    };
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    assert_eq!(&buf[..6], &[1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_short_header_rejected() {
    let mut buf = BytesMut::new();
    FragmentHeader::default().encode(&mut buf);
    let mut cursor = &buf[..HEADER_SIZE - 1];
    assert!(FragmentHeader::decode(&mut cursor).is_none());
    assert!(FragmentHeader::peek(&buf[..3]).is_none());
}

#[test]
fn test_peek_does_not_consume() {
    let frag = fragment(1, 0, b"abc");
    let bytes = frag.to_bytes();
    assert_eq!(FragmentHeader::peek(&bytes), Some(frag.header));
    assert_eq!(bytes.len(), HEADER_SIZE + 3);
    assert_eq!(frag.header.payload_len(), 3);
}

#[test]
fn test_feedback_roundtrip() {
    let feedback = FeedbackHeader {
        target_rate: DataRate::from_bps(6_408_000),
        seq: 42,
        timestamp: 99_000,
    };
    let mut buf = BytesMut::new();
    feedback.encode(&mut buf);
    assert_eq!(buf.len(), FEEDBACK_HEADER_SIZE);
    let mut cursor = &buf[..];
    assert_eq!(FeedbackHeader::decode(&mut cursor), Some(feedback));
    let mut short = &buf[..FEEDBACK_HEADER_SIZE - 1];
    assert!(FeedbackHeader::decode(&mut short).is_none());
}

#[test]
fn test_datagram_decode() {
    let frag = fragment(3, 1, b"payload");
    assert_eq!(Fragment::decode_datagram(frag.to_bytes()), Ok(frag.clone()));

    let bytes = frag.to_bytes();
    assert_eq!(
        Fragment::decode_datagram(bytes.slice(..10)),
        Err(DecodeError::Truncated { len: 10 })
    );
    assert!(matches!(
        Fragment::decode_datagram(bytes.slice(..HEADER_SIZE + 2)),
        Err(DecodeError::Incomplete { .. })
    ));

    let mut corrupt = frag.clone();
    corrupt.header.fragment_bytes = 4;
    assert_eq!(
        Fragment::decode_datagram(corrupt.to_bytes()),
        Err(DecodeError::InvalidLength { fragment_bytes: 4 })
    );
}

#[test]
fn test_stream_decoder_reassembles_split_reads() {
    let frags = [
        fragment(1, 0, b"first fragment"),
        fragment(1, 1, b""),
        fragment(1, 2, b"third"),
    ];
    let mut wire = BytesMut::new();
    for f in &frags {
        f.encode(&mut wire);
    }

    // Feed in awkward chunk sizes that split both headers and payloads.
    let mut decoder = StreamDecoder::new(MAX_FRAGMENT);
    let mut decoded = Vec::new();
    for chunk in wire.chunks(7) {
        decoder.extend(chunk);
        decoded.extend(decoder.drain_fragments());
    }
    assert_eq!(decoded, frags.to_vec());
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_stream_decoder_waits_on_partial_fragment() {
    let frag = fragment(9, 0, b"0123456789");
    let bytes = frag.to_bytes();
    let mut decoder = StreamDecoder::new(MAX_FRAGMENT);
    decoder.extend(&bytes[..HEADER_SIZE + 4]);
    assert!(decoder.next_fragment().is_none());
    assert_eq!(decoder.buffered(), HEADER_SIZE + 4);
    decoder.extend(&bytes[HEADER_SIZE + 4..]);
    assert_eq!(decoder.next_fragment(), Some(frag));
}

#[test]
fn test_stream_decoder_discards_on_corrupt_length() {
    let mut corrupt = fragment(2, 0, b"xyz");
    corrupt.header.fragment_bytes = 1;
    let mut decoder = StreamDecoder::new(MAX_FRAGMENT);
    decoder.extend(&corrupt.to_bytes());
    assert!(decoder.next_fragment().is_none());
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_stream_decoder_recovers_from_oversized_length() {
    let mut corrupt = fragment(2, 0, b"");
    corrupt.header.fragment_bytes = 1 << 40;
    let mut decoder = StreamDecoder::new(MAX_FRAGMENT);
    decoder.extend(&corrupt.to_bytes());
    assert!(decoder.next_fragment().is_none());
    assert_eq!(decoder.buffered(), 0);

    // Fragments written after the corrupt header still come through.
    let frags: Vec<_> = (0..100).map(|seq| fragment(3, seq, b"after")).collect();
    for frag in &frags {
        decoder.extend(&frag.to_bytes());
    }
    assert_eq!(decoder.drain_fragments(), frags);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_check_bounded_rejects_oversized_fragment() {
    let frag = fragment(1, 0, b"payload");
    let bytes = frag.to_bytes();
    let declared = frag.header.fragment_bytes;
    assert_eq!(Fragment::check_bounded(&bytes, declared), Ok(frag.header));
    assert_eq!(
        Fragment::check_bounded(&bytes, declared - 1),
        Err(DecodeError::InvalidLength {
            fragment_bytes: declared
        })
    );
}
