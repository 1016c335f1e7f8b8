use super::*;

#[test]
fn append_then_read_round_trips() {
    let client = MockStreamClient::new();
    let blocks = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
    let appended = client.append(&blocks, true).unwrap();
    assert_eq!(appended.offsets, vec![0, 3, 6]);
    assert_eq!(appended.end_offset, 11);

    let read = client.read(appended.extent_id, 0, 3).unwrap();
    assert_eq!(read.blocks, blocks);
    assert_eq!(read.end_offset, 11);
}

#[test]
fn successive_appends_share_the_open_extent() {
    let client = MockStreamClient::new();
    let first = client.append(&[b"a".to_vec()], true).unwrap();
    let second = client.append(&[b"bb".to_vec()], true).unwrap();
    assert_eq!(first.extent_id, second.extent_id);
    assert_eq!(second.offsets, vec![1]);
}

#[test]
fn sealing_rolls_over_to_a_new_extent() {
    let client = MockStreamClient::new();
    let first = client.append(&[b"a".to_vec()], true).unwrap();
    client.seal_current();
    let second = client.append(&[b"b".to_vec()], true).unwrap();
    assert_ne!(first.extent_id, second.extent_id);
    assert_eq!(client.extent_count(), 2);
}

#[test]
fn append_to_sealed_extent_via_direct_read_after_seal_fails_gracefully() {
    let client = MockStreamClient::new();
    client.append(&[b"a".to_vec()], true).unwrap();
    client.seal_current();
    // The sealed extent can still be read.
    let info = client.stream_info();
    let sealed_id = info.extent_ids[0];
    let read = client.read(sealed_id, 0, 1).unwrap();
    assert_eq!(read.blocks, vec![b"a".to_vec()]);
}

#[test]
fn read_unknown_extent_errors() {
    let client = MockStreamClient::new();
    assert!(matches!(
        client.read(999, 0, 1),
        Err(StreamError::UnknownExtent(999))
    ));
}

#[test]
fn read_past_end_errors() {
    let client = MockStreamClient::new();
    let appended = client.append(&[b"a".to_vec()], true).unwrap();
    assert!(matches!(
        client.read(appended.extent_id, 0, 5),
        Err(StreamError::OffsetOutOfRange { .. })
    ));
}

#[test]
fn stream_info_reflects_extents_in_order() {
    let client = MockStreamClient::new();
    let first = client.append(&[b"a".to_vec()], true).unwrap();
    client.seal_current();
    let second = client.append(&[b"b".to_vec()], true).unwrap();
    let info = client.stream_info();
    assert_eq!(info.extent_ids, vec![first.extent_id, second.extent_id]);
}

#[test]
fn release_extent_removes_it_from_stream_info() {
    let client = MockStreamClient::new();
    let first = client.append(&[b"a".to_vec()], true).unwrap();
    client.seal_current();
    client.append(&[b"b".to_vec()], true).unwrap();
    client.release_extent(first.extent_id);
    assert!(!client.stream_info().extent_ids.contains(&first.extent_id));
}

#[test]
fn cancel_token_reflects_across_clones() {
    let token = Cancel::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());
    token.cancel();
    assert!(clone.is_cancelled());
}
