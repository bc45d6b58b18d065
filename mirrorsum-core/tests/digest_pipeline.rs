use md4::{Digest, Md4};
use mirrorsum_core::config::HashingConfig;
use mirrorsum_core::digest::{hash_file, hash_stream, signature_path};
use mirrorsum_core::zsync::{self, BlockSums};
use mirrorsum_core::Error;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::{self, Read};
use std::path::Path;

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn cfg(chunk_size: usize) -> HashingConfig {
    HashingConfig { chunk_size, ..HashingConfig::default() }
}

fn hash_bytes(data: &[u8], cfg: &HashingConfig) -> mirrorsum_core::digest::DigestSet {
    hash_stream(data, data.len() as u64, Path::new("mem"), cfg).unwrap()
}

#[test]
fn reference_fixtures() {
    let one = hash_bytes(b"1", &HashingConfig::default());
    assert_eq!(one.md5_hex(), "c4ca4238a0b923820dcc509a6f75849b");
    assert_eq!(one.sha1_hex(), "356a192b7913b04c54574d18c28d46e6395428ab");

    let hello = hash_bytes(b"hello world", &HashingConfig::default());
    assert_eq!(hello.md5_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    assert_eq!(hello.piece_hex(), vec!["2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string()]);

    let line = hash_bytes(b"1\n", &HashingConfig::default());
    assert_eq!(line.md5_hex(), "b026324c6904b2a9cb4b88d6d61c81d1");
    assert_eq!(line.sha1_hex(), "e5fa44f2b31c1fb553b6021e7360d07d5d91ff5e");
    assert_eq!(
        line.sha256_hex(),
        "4355a46b19d348dc2f57c046f8ef63d4538ebb936000f3c9ee954a27460dd865"
    );
}

#[test]
fn piece_count_matches_size() {
    let chunk = 4096usize;
    for (size, want) in [(0usize, 1usize), (1, 1), (4095, 1), (4096, 1), (4097, 2), (3 * 4096, 3), (3 * 4096 + 1, 4)] {
        let data = random_bytes(size, size as u64);
        let set = hash_bytes(&data, &cfg(chunk));
        assert_eq!(set.pieces.len(), want, "size {size}");
        assert_eq!(set.size, size as u64);
        // last piece covers exactly the tail of the file
        if size > 0 {
            let tail_start = (want - 1) * chunk;
            let tail: [u8; 20] = sha1::Sha1::digest(&data[tail_start..]).into();
            assert_eq!(set.pieces[want - 1], tail);
        }
    }
}

#[test]
fn empty_file_has_one_empty_piece() {
    let c = HashingConfig { compute_piece_rolling_digest: true, ..HashingConfig::default() };
    let set = hash_bytes(b"", &c);
    assert_eq!(set.piece_hex(), vec!["da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string()]);
    assert_eq!(set.piece_rsums_hex(), Some(vec!["00000000".to_string()]));
}

#[test]
fn hashing_is_deterministic() {
    let data = random_bytes(100_000, 7);
    let c = HashingConfig {
        chunk_size: 8192,
        compute_rolling_checksums: true,
        compute_piece_rolling_digest: true,
        ..HashingConfig::default()
    };
    assert_eq!(hash_bytes(&data, &c), hash_bytes(&data, &c));
}

#[test]
fn piece_rolling_digest_is_reversed_rsum_of_padded_piece() {
    let c = HashingConfig {
        chunk_size: 4096,
        compute_piece_rolling_digest: true,
        ..HashingConfig::default()
    };
    let set = hash_bytes(b"hello world", &c);
    assert_eq!(set.piece_rsums_hex(), Some(vec!["0caa5c04".to_string()]));
    assert!(set.dump_raw().contains("zpiece 0caa5c04"));
}

#[test]
fn zsync_stream_is_rsum_then_md4_per_block() {
    let data = random_bytes(5000, 11);
    let c = HashingConfig {
        chunk_size: 4096,
        compute_rolling_checksums: true,
        ..HashingConfig::default()
    };
    let set = hash_bytes(&data, &c);
    let p = set.zsync.unwrap();
    assert_eq!(p, zsync::select(5000, None));
    assert_eq!(p.hash_lens(), "2,2,4");

    let bs = p.block_size as usize;
    let mut want = Vec::new();
    for block in data.chunks(bs) {
        let mut padded = block.to_vec();
        padded.resize(bs, 0);
        want.extend_from_slice(&zsync::rsum(&padded)[4 - p.rsum_len..]);
        want.extend_from_slice(&Md4::digest(&padded)[..p.checksum_len]);
    }
    assert_eq!(set.zsums.len(), 3 * p.entry_len());
    assert_eq!(set.zsums, want);
}

#[test]
fn block_sums_ignore_feed_boundaries() {
    let data = random_bytes(20_000, 3);
    let p = zsync::select(data.len() as u64, None);
    let mut whole = BlockSums::new(p);
    whole.update(&data);
    let mut ragged = BlockSums::new(p);
    for piece in data.chunks(777) {
        ragged.update(piece);
    }
    assert_eq!(whole.finish(), ragged.finish());
}

#[test]
fn dump_raw_lists_pieces_then_whole_file_digests() {
    let set = hash_bytes(b"hello world", &HashingConfig::default());
    let text = set.dump_raw();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "piece 2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    assert_eq!(lines[1], "md5 5eb63bbbe01eeed093cb22bb8f5acdc3");
    assert_eq!(lines[2], "sha1 2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    assert_eq!(
        lines[3],
        "sha256 b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert_eq!(lines.len(), 4);
}

/// Hands out scripted reads; `None` is a zero-length read.
struct Scripted(Vec<Option<Vec<u8>>>);

impl Read for Scripted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0.is_empty() {
            return Ok(0);
        }
        match self.0.remove(0) {
            None => Ok(0),
            Some(bytes) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
        }
    }
}

#[test]
fn data_after_short_read_is_an_internal_error() {
    let reader = Scripted(vec![Some(b"ab".to_vec()), None, Some(b"cd".to_vec())]);
    let err = hash_stream(reader, 4, Path::new("flaky"), &cfg(4)).unwrap_err();
    assert!(matches!(err, Error::InternalConsistency { .. }), "{err}");
    assert!(err.is_per_path());
}

#[test]
fn partial_reads_are_not_short_reads() {
    let reader = Scripted(vec![Some(b"ab".to_vec()), Some(b"cd".to_vec()), Some(b"e".to_vec())]);
    let set = hash_stream(reader, 5, Path::new("slow"), &cfg(4)).unwrap();
    assert_eq!(set.size, 5);
    assert_eq!(set.pieces.len(), 2);
}

struct Failing;

impl Read for Failing {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "device gone"))
    }
}

#[test]
fn io_failure_is_a_read_error() {
    let err = hash_stream(Failing, 10, Path::new("gone"), &cfg(4)).unwrap_err();
    assert!(matches!(err, Error::Read { .. }));
}

#[test]
fn signature_is_kept_only_when_smaller_than_file() {
    let td = tempfile::tempdir().unwrap();
    let file = td.path().join("pkg.tar");
    std::fs::write(&file, vec![7u8; 100]).unwrap();

    let set = hash_file(&file, 100, &HashingConfig::default()).unwrap();
    assert_eq!(set.signature, None);

    std::fs::write(signature_path(&file), b"-----BEGIN PGP SIGNATURE-----").unwrap();
    let set = hash_file(&file, 100, &HashingConfig::default()).unwrap();
    assert_eq!(set.signature_text().as_deref(), Some("-----BEGIN PGP SIGNATURE-----"));

    std::fs::write(signature_path(&file), vec![b'x'; 100]).unwrap();
    let set = hash_file(&file, 100, &HashingConfig::default()).unwrap();
    assert_eq!(set.signature, None);
}

#[test]
fn invalid_config_is_rejected_before_reading() {
    let zero = cfg(0);
    let err = hash_stream(&b"hello world"[..], 11, Path::new("mem"), &zero).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err}");

    let misaligned = HashingConfig { chunk_size: 1000, compute_rolling_checksums: true, ..HashingConfig::default() };
    let err = hash_stream(&b"hello world"[..], 11, Path::new("mem"), &misaligned).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err}");

    // checked before the file is opened
    let err = hash_file(Path::new("/nonexistent/mirrorsum"), 0, &zero).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err}");
    assert!(!err.is_per_path());
}
