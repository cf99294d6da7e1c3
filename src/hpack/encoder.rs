//! HPACK header list encoding (RFC 7541 Section 6)
//!
//! Representation selection, in order:
//!
//! 1. Exact (name, value) match in the static table → indexed (Section 6.1).
//! 2. Name match in the static table → literal without indexing with an
//!    indexed name (Section 6.2.2).
//! 3. Otherwise → literal without indexing with a new name.
//!
//! Without-indexing literals never insert into a dynamic table, so this
//! encoder keeps no per-connection state and the peer's decoder table stays
//! empty in the client→server direction. String literals are emitted raw by
//! default; Huffman coding can be switched on per encoder.

use super::huffman::{huffman_encode, huffman_encoded_len};
use super::table::{HeaderField, StaticTable};
use super::encode_integer;

/// HPACK encoder
pub struct HpackEncoder {
    use_huffman: bool,
}

impl HpackEncoder {
    /// Create an encoder emitting raw string literals
    pub fn new() -> Self {
        HpackEncoder { use_huffman: false }
    }

    /// Enable or disable Huffman coding of string literals
    pub fn set_huffman(&mut self, enabled: bool) {
        self.use_huffman = enabled;
    }

    /// Encode an ordered header list into a header block.
    pub fn encode(&self, fields: &[HeaderField]) -> Vec<u8> {
        let mut block = Vec::new();
        for field in fields {
            self.encode_field(&mut block, field);
        }
        block
    }

    fn encode_field(&self, block: &mut Vec<u8>, field: &HeaderField) {
        if let Some(index) = StaticTable::find_exact(&field.name, &field.value) {
            // Indexed: 1xxxxxxx with a 7-bit index.
            encode_integer(block, index, 7, 0x80);
            return;
        }

        if let Some(index) = StaticTable::find_name(&field.name) {
            // Literal without indexing, indexed name: 0000xxxx, 4-bit index.
            encode_integer(block, index, 4, 0x00);
            self.encode_string(block, &field.value);
            return;
        }

        // Literal without indexing, new name: a lone 0x00 prefix byte
        // followed by the name and value literals.
        block.push(0x00);
        self.encode_string(block, &field.name);
        self.encode_string(block, &field.value);
    }

    /// Emit a string literal (Section 5.2): 7-bit length prefix with the H
    /// bit, then the octets.
    fn encode_string(&self, block: &mut Vec<u8>, data: &[u8]) {
        if self.use_huffman && huffman_encoded_len(data) < data.len() {
            let encoded = huffman_encode(data);
            encode_integer(block, encoded.len(), 7, 0x80);
            block.extend_from_slice(&encoded);
        } else {
            encode_integer(block, data.len(), 7, 0x00);
            block.extend_from_slice(data);
        }
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        HpackEncoder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpack::HpackDecoder;

    #[test]
    fn test_encode_static_exact_match() {
        let encoder = HpackEncoder::new();
        let block = encoder.encode(&[HeaderField::new(
            b":method".as_slice(),
            b"GET".as_slice(),
        )]);
        assert_eq!(block, [0x82]);
    }

    #[test]
    fn test_encode_static_name_match() {
        let encoder = HpackEncoder::new();
        let block = encoder.encode(&[HeaderField::new(
            b":path".as_slice(),
            b"/sample/path".as_slice(),
        )]);
        // RFC 7541 Appendix C.2.2 byte-for-byte.
        assert_eq!(
            block,
            [0x04, 0x0c, b'/', b's', b'a', b'm', b'p', b'l', b'e', b'/', b'p', b'a', b't', b'h']
        );
    }

    #[test]
    fn test_encode_new_name() {
        let encoder = HpackEncoder::new();
        let block = encoder.encode(&[HeaderField::new(
            b"x-request-id".as_slice(),
            b"abc".as_slice(),
        )]);
        assert_eq!(block[0], 0x00);
        assert_eq!(block[1], 12);
        assert_eq!(&block[2..14], b"x-request-id");
        assert_eq!(block[14], 3);
        assert_eq!(&block[15..], b"abc");
    }

    #[test]
    fn test_request_pseudo_headers() {
        // The header list the connection engine builds for GET /.
        let encoder = HpackEncoder::new();
        let block = encoder.encode(&[
            HeaderField::new(b":method".as_slice(), b"GET".as_slice()),
            HeaderField::new(b":scheme".as_slice(), b"http".as_slice()),
            HeaderField::new(b":path".as_slice(), b"/".as_slice()),
        ]);
        assert_eq!(block, [0x82, 0x86, 0x84]);
    }

    #[test]
    fn test_roundtrip_with_decoder() {
        let encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::default();

        let fields = vec![
            HeaderField::new(b":method".as_slice(), b"GET".as_slice()),
            HeaderField::new(b":scheme".as_slice(), b"https".as_slice()),
            HeaderField::new(b":path".as_slice(), b"/search".as_slice()),
            HeaderField::new(b"host".as_slice(), b"localhost".as_slice()),
            HeaderField::new(b"x-custom".as_slice(), b"value".as_slice()),
        ];

        let block = encoder.encode(&fields);
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded, fields);

        // Without-indexing representations leave the decoder table empty.
        assert!(decoder.table().is_empty());
    }

    #[test]
    fn test_roundtrip_huffman() {
        let mut encoder = HpackEncoder::new();
        encoder.set_huffman(true);
        let mut decoder = HpackDecoder::default();

        let fields = vec![
            HeaderField::new(b":authority".as_slice(), b"www.example.com".as_slice()),
            HeaderField::new(b"cache-control".as_slice(), b"no-cache".as_slice()),
        ];

        let block = encoder.encode(&fields);
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_huffman_only_when_shorter() {
        // A string whose Huffman form is longer stays raw even with the
        // toggle on (the H bit would waste octets).
        let mut encoder = HpackEncoder::new();
        encoder.set_huffman(true);
        let block = encoder.encode(&[HeaderField::new(
            b"x-bin".as_slice(),
            vec![0x00u8, 0x01, 0x02],
        )]);
        // Value literal: H bit clear, raw length 3.
        let value_at = block.len() - 4;
        assert_eq!(block[value_at], 0x03);
    }
}
