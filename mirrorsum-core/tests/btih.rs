use mirrorsum_core::btih::{encode, hash_fields, info_hash, InfoHashInput};
use sha1::{Digest, Sha1};
use sha2::Sha256;

fn hello_input<'a>(md5_hex: &'a str, sha1: &'a [u8], sha256: &'a [u8]) -> InfoHashInput<'a> {
    InfoHashInput {
        size: 11,
        name: "hello.txt",
        piece_length: 262_144,
        md5_hex,
        pieces: sha1,
        sha1,
        sha256,
    }
}

#[test]
fn flat_layout_and_known_hash() {
    let sha1 = Sha1::digest(b"hello world");
    let sha256 = Sha256::digest(b"hello world");
    let input = hello_input("5eb63bbbe01eeed093cb22bb8f5acdc3", &sha1, &sha256);

    let buf = encode(&input.fields());
    let head = b"6:lengthi11e6:md5sum32:5eb63bbbe01eeed093cb22bb8f5acdc34:name9:hello.txt12:piece lengthi262144e6:pieces20:";
    assert!(buf.starts_with(head));
    assert_ne!(buf[0], b'd');
    assert_eq!(buf.len(), head.len() + 20 + "4:sha120:".len() + 20 + "6:sha25632:".len() + 32);

    assert_eq!(hex::encode(info_hash(&input)), "b5c55d321cfcedcda7bf6dec09330192774adb33");
}

#[test]
fn missing_sha256_is_an_empty_string() {
    let sha1 = Sha1::digest(b"hello world");
    let input = hello_input("5eb63bbbe01eeed093cb22bb8f5acdc3", &sha1, &[]);
    assert!(encode(&input.fields()).ends_with(b"6:sha2560:"));
}

#[test]
fn field_order_changes_the_hash() {
    let sha1 = Sha1::digest(b"hello world");
    let sha256 = Sha256::digest(b"hello world");
    let input = hello_input("5eb63bbbe01eeed093cb22bb8f5acdc3", &sha1, &sha256);
    let fields = input.fields();
    let mut swapped = input.fields();
    swapped.swap(0, 1);
    assert_eq!(hash_fields(&fields), info_hash(&input));
    assert_ne!(hash_fields(&fields), hash_fields(&swapped));
}
