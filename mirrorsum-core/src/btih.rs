//! BitTorrent-style info-hash over a file's piece layout.
//!
//! The buffer is a flat run of bencoded key/value tokens with no enclosing
//! `d`...`e`. Existing stored hashes were produced from exactly this layout,
//! so field order and framing must not change.

use sha1::{Digest, Sha1};

pub enum Value<'a> {
    Int(u64),
    Bytes(&'a [u8]),
}

pub struct Field<'a> {
    pub key: &'static str,
    pub value: Value<'a>,
}

pub struct InfoHashInput<'a> {
    pub size: u64,
    pub name: &'a str,
    pub piece_length: usize,
    pub md5_hex: &'a str,
    /// Concatenated raw SHA1 piece digests.
    pub pieces: &'a [u8],
    pub sha1: &'a [u8],
    /// Empty when no SHA256 is available.
    pub sha256: &'a [u8],
}

impl<'a> InfoHashInput<'a> {
    /// Fields in encoding order.
    pub fn fields(&self) -> Vec<Field<'a>> {
        vec![
            Field { key: "length", value: Value::Int(self.size) },
            Field { key: "md5sum", value: Value::Bytes(self.md5_hex.as_bytes()) },
            Field { key: "name", value: Value::Bytes(self.name.as_bytes()) },
            Field { key: "piece length", value: Value::Int(self.piece_length as u64) },
            Field { key: "pieces", value: Value::Bytes(self.pieces) },
            Field { key: "sha1", value: Value::Bytes(self.sha1) },
            Field { key: "sha256", value: Value::Bytes(self.sha256) },
        ]
    }
}

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

pub fn encode(fields: &[Field<'_>]) -> Vec<u8> {
    let mut buf = Vec::new();
    for f in fields {
        push_bytes(&mut buf, f.key.as_bytes());
        match f.value {
            Value::Int(n) => {
                buf.push(b'i');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.push(b'e');
            }
            Value::Bytes(b) => push_bytes(&mut buf, b),
        }
    }
    buf
}

pub fn hash_fields(fields: &[Field<'_>]) -> [u8; 20] {
    Sha1::digest(encode(fields)).into()
}

pub fn info_hash(input: &InfoHashInput<'_>) -> [u8; 20] {
    hash_fields(&input.fields())
}
