//! Property tests for chunk signing and verification

use bytes::Bytes;
use crabkyc::transport::{chunk_payload, IntegritySigner, TransportError};
use proptest::prelude::*;

fn signer() -> IntegritySigner {
    IntegritySigner::new(b"property-secret").unwrap()
}

proptest! {
    #[test]
    fn chunks_reassemble_to_payload(data in prop::collection::vec(any::<u8>(), 0..4096), size in 1usize..700) {
        let chunks = chunk_payload(Bytes::from(data.clone()), size);
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        prop_assert_eq!(joined, data);
    }

    #[test]
    fn signed_chunks_verify(data in prop::collection::vec(any::<u8>(), 1..2048), size in 1usize..512) {
        let signer = signer();
        let records: Vec<_> = chunk_payload(Bytes::from(data), size)
            .into_iter()
            .enumerate()
            .map(|(i, c)| signer.process_chunk(i, c))
            .collect();
        prop_assert!(signer.verify_all(&records).is_ok());
    }

    #[test]
    fn any_flipped_byte_fails_both_digests(
        data in prop::collection::vec(any::<u8>(), 1..1024),
        pos in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let signer = signer();
        let mut record = signer.process_chunk(0, Bytes::from(data.clone()));

        let mut tampered = data;
        let i = pos.index(tampered.len());
        tampered[i] ^= 1 << bit;
        record.payload = Bytes::from(tampered);

        let check = signer.verify_chunk(&record);
        prop_assert!(!check.hmac_valid);
        prop_assert!(!check.sha256_valid);
        prop_assert!(!check.passed());
    }

    #[test]
    fn other_key_never_verifies(data in prop::collection::vec(any::<u8>(), 1..512)) {
        let record = signer().process_chunk(0, Bytes::from(data));
        let other = IntegritySigner::new(b"another-secret").unwrap();
        let check = other.verify_chunk(&record);
        prop_assert!(!check.hmac_valid);
        prop_assert!(check.sha256_valid);
    }
}

#[test]
fn test_one_bad_chunk_fails_the_batch() {
    let signer = signer();
    let mut records: Vec<_> = chunk_payload(Bytes::from(vec![7u8; 300]), 100)
        .into_iter()
        .enumerate()
        .map(|(i, c)| signer.process_chunk(i, c))
        .collect();
    records[2].sha256 = IntegritySigner::compute_sha256(b"something else");

    match signer.verify_all(&records) {
        Err(TransportError::IntegrityMismatch { unit }) => assert_eq!(unit, "chunk 2"),
        other => panic!("unexpected {:?}", other),
    }
}
