use crate::sparse::SparseStorage;

#[test]
fn empty_has_no_entries() {
    let sparse = SparseStorage::empty();
    assert_eq!(sparse.entries.len(), 0);
    assert_eq!(sparse.get(0), 0);
}

#[test]
fn set_if_greater_only_raises() {
    let mut sparse = SparseStorage::empty();
    assert!(sparse.set_if_greater(4, 3));
    assert_eq!(sparse.get(4), 3);

    assert!(!sparse.set_if_greater(4, 1));
    assert_eq!(sparse.get(4), 3);

    assert!(sparse.set_if_greater(4, 9));
    assert_eq!(sparse.get(4), 9);
}

#[test]
fn should_use_dense_follows_promotion_formula() {
    let mut sparse = SparseStorage::empty();
    let d = 2u8;
    let m = 20u32;

    // (n+1)(d+1)+1 >= m drives the decision; with d=2, m=20 that's
    // n >= 5 (6 entries including the candidate).
    for i in 0..5 {
        assert!(!sparse.should_use_dense(d, m, true));
        sparse.set_if_greater(i, 1);
    }
    assert!(sparse.should_use_dense(d, m, true));
}

#[test]
fn to_dense_preserves_values() {
    let mut sparse = SparseStorage::empty();
    sparse.set_if_greater(1, 5);
    sparse.set_if_greater(7, 9);

    let dense = sparse.to_dense(16).unwrap();
    assert_eq!(dense.get(1), 5);
    assert_eq!(dense.get(7), 9);
    assert_eq!(dense.get(0), 0);
}

#[test]
fn write_then_parse_round_trips() {
    let mut sparse = SparseStorage::empty();
    sparse.set_if_greater(1, 5);
    sparse.set_if_greater(300, 9);
    sparse.set_if_greater(1000, 2);

    let k = 13u8;
    let d = 2u8;
    let mut buf = vec![0u8; sparse.byte_len(d)];
    sparse.write_bytes(k, d, &mut buf);

    let parsed = SparseStorage::parse(k, d, &buf).unwrap();
    assert_eq!(parsed, sparse);
}

#[test]
fn parse_rejects_wrong_id_byte() {
    let buf = [0x81u8, 1, 0, 0];
    let err = SparseStorage::parse(13, 2, &buf).unwrap_err();
    assert_eq!(
        err,
        crate::Error::InvalidArg("sparse id byte does not match precision")
    );
}

#[test]
fn parse_rejects_zero_value() {
    let buf = [0x80u8 | 13, 0, 5, 0];
    let err = SparseStorage::parse(13, 2, &buf).unwrap_err();
    assert_eq!(
        err,
        crate::Error::InvalidArg("sparse entry value must be nonzero")
    );
}

#[test]
fn parse_rejects_non_ascending_entries() {
    let mut buf = vec![0x80u8 | 13];
    buf.extend_from_slice(&[9, 5, 0]); // idx=5
    buf.extend_from_slice(&[9, 3, 0]); // idx=3, out of order
    let err = SparseStorage::parse(13, 2, &buf).unwrap_err();
    assert_eq!(
        err,
        crate::Error::InvalidArg("sparse entries are not strictly ascending")
    );
}

#[test]
fn parse_rejects_partial_record() {
    let buf = [0x80u8 | 13, 9, 5];
    let err = SparseStorage::parse(13, 2, &buf).unwrap_err();
    assert_eq!(
        err,
        crate::Error::InvalidArg("sparse body length is not a whole number of records")
    );
}

#[test]
fn test_random_values_sparse() {
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    let seed = 1; // makes for reproducible tests
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..100 {
        let mut sparse = SparseStorage::empty();
        let mut expected: BTreeMap<u32, u8> = BTreeMap::new();

        for _ in 0..100 {
            let idx = rng.random_range(0..8192u32);
            let value: u8 = rng.random_range(1..=255);
            sparse.set_if_greater(idx, value);

            expected
                .entry(idx)
                .and_modify(|e| *e = (*e).max(value))
                .or_insert(value);
        }

        assert_eq!(sparse.entries, expected);
    }
}
