// Unit tests for fragment reads

use crate::server::stream::{MemoryStreamProvider, StreamProvider, read_fragment};

use std::io::Cursor;

/// **VALUE**: Verifies a 10-byte stream reads as 4, 4, 2 with the end flag last.
#[tokio::test]
async fn given_ten_byte_stream_when_reading_fragments_of_four_then_end_on_last() {
    let data: Vec<u8> = (0u8..10).collect();
    let mut stream = Cursor::new(data.clone());

    let mut collected = Vec::new();
    let mut ends = Vec::new();
    for offset in [0u64, 4, 8] {
        let fragment = read_fragment(&mut stream, offset, 4)
            .await
            .expect("read should succeed");
        collected.extend_from_slice(&fragment.data);
        ends.push(fragment.is_end);
    }

    assert_eq!(ends, vec![false, false, true]);
    assert_eq!(collected, data);
}

/// **VALUE**: Verifies reading at or past the end yields an empty final fragment.
#[tokio::test]
async fn given_offset_past_end_when_reading_then_empty_and_end() {
    let mut stream = Cursor::new(vec![1u8, 2, 3]);

    let fragment = read_fragment(&mut stream, 10, 4)
        .await
        .expect("read should succeed");

    assert!(fragment.data.is_empty());
    assert!(fragment.is_end);
}

/// **VALUE**: Verifies an exact-fit fragment already reports the end.
#[tokio::test]
async fn given_fragment_reaching_end_exactly_when_reading_then_is_end() {
    let mut stream = Cursor::new(vec![0u8; 8]);

    let fragment = read_fragment(&mut stream, 4, 4)
        .await
        .expect("read should succeed");

    assert_eq!(fragment.data.len(), 4);
    assert!(fragment.is_end);
}

/// **VALUE**: Verifies the in-memory provider distinguishes known and unknown ids.
#[tokio::test]
async fn given_memory_provider_when_looking_up_ids_then_known_found_unknown_none() {
    let provider = MemoryStreamProvider::new().with_stream("report", b"abc".to_vec());

    assert!(
        provider
            .get_stream_by_id("report")
            .await
            .expect("lookup should succeed")
            .is_some()
    );
    assert!(
        provider
            .get_stream_by_id("missing")
            .await
            .expect("lookup should succeed")
            .is_none()
    );
}
