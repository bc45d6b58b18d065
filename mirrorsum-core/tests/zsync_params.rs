use mirrorsum_core::config::normalize_block_override;
use mirrorsum_core::zsync::{rsum, select, ZsyncParameters};
use proptest::prelude::*;

#[test]
fn normalize_block_override_cases() {
    for (n, want) in [
        (0u64, None),
        (1023, None),
        (1024, Some(1024)),
        (1025, Some(1024)),
        (3072, Some(2048)),
        (4096, Some(4096)),
        (4097, Some(4096)),
        (1_073_741_825, Some(1_073_741_824)),
    ] {
        assert_eq!(normalize_block_override(n), want, "input {n}");
    }
}

fn params(block_size: u64, seq_matches: u32, rsum_len: usize, checksum_len: usize) -> ZsyncParameters {
    ZsyncParameters { block_size, seq_matches, rsum_len, checksum_len }
}

#[test]
fn known_sizes() {
    assert_eq!(select(0, None), params(2048, 1, 2, 4));
    assert_eq!(select(2048, None), params(2048, 1, 2, 4));
    assert_eq!(select(2049, None), params(2048, 2, 2, 4));
    assert_eq!(select(1_000_000, None), params(2048, 2, 2, 5));
    assert_eq!(select(99_999_999, None), params(2048, 2, 2, 6));
    assert_eq!(select(100_000_000, None), params(4096, 2, 2, 6));
    assert_eq!(select(1 << 30, None), params(4096, 2, 3, 6));
    assert_eq!(select(5 << 30, None), params(4096, 2, 3, 7));
}

#[test]
fn override_only_applies_above_one_gib() {
    assert_eq!(select(1 << 30, Some(65536)).block_size, 4096);
    assert_eq!(select((1 << 30) + 1, Some(65536)), params(65536, 2, 3, 6));
    assert_eq!(select(5 << 30, Some(65536)), params(65536, 2, 3, 6));
    assert_eq!(select(1_000_000, Some(65536)).block_size, 2048);
}

#[test]
fn rsum_known_values() {
    assert_eq!(rsum(b"1"), [0x00, 0x31, 0x00, 0x31]);
    assert_eq!(rsum(b"hello world"), [0x04, 0x5c, 0x1a, 0x00]);
    assert_eq!(rsum(&[0u8; 2048]), [0; 4]);
}

proptest! {
    #[test]
    fn select_is_pure_and_bounded(size in any::<u64>(), shift in proptest::option::of(10u32..=24)) {
        let ov = shift.map(|s| 1u64 << s);
        let a = select(size, ov);
        let b = select(size, ov);
        prop_assert_eq!(a, b);
        prop_assert!(a.block_size.is_power_of_two());
        prop_assert!(a.block_size >= 1024);
        prop_assert!((2..=4).contains(&a.rsum_len));
        prop_assert!((1..=16).contains(&a.checksum_len));
        prop_assert_eq!(a.seq_matches, if size > a.block_size { 2 } else { 1 });
    }

    #[test]
    fn normalized_override_is_power_of_two_not_above_input(n in 1024u64..) {
        let m = normalize_block_override(n).unwrap();
        prop_assert!(m.is_power_of_two());
        prop_assert!(m <= n);
        prop_assert!(m > n / 2);
    }
}
