//! Raw chunk framing: `(signature, compressed_len, decompressed_len,
//! reserved, payload)` with per-chunk LZ4 block compression.

use std::io::Read;

use lz4_flex::block;

use crate::bform::stream::{ByteReader, ByteWriter};
use crate::util::{Error, Warning};

/// A framed chunk: signature, compression flag, and the decompressed
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub signature: [u8; 4],
    pub compressed: bool,
    pub payload: Vec<u8>,
}

impl RawChunk {
    /// Read one chunk, decompressing the payload if needed. Returns `None`
    /// on failure, with the error latched in the reader. Non-zero reserved
    /// bytes append a warning.
    pub fn read_from(
        r: &mut ByteReader<impl Read>,
        warnings: &mut Vec<Warning>,
    ) -> Option<RawChunk> {
        let mut signature = [0u8; 4];
        if r.fill(&mut signature) {
            return None;
        }

        let compressed_len = r.read_u32();
        let decompressed_len = r.read_u32();
        let reserved = r.read_u32();
        if r.failed() {
            return None;
        }
        if reserved != 0 {
            warnings.push(Warning::ReservedNonZero("chunk header"));
        }

        // A compressed length of zero means the payload is stored raw.
        let payload = if compressed_len == 0 {
            let mut payload = vec![0u8; decompressed_len as usize];
            if r.fill(&mut payload) {
                return None;
            }
            payload
        } else {
            let mut compressed = vec![0u8; compressed_len as usize];
            if r.fill(&mut compressed) {
                return None;
            }
            match block::decompress(&compressed, decompressed_len as usize) {
                Ok(payload) if payload.len() == decompressed_len as usize => payload,
                Ok(payload) => {
                    r.latch(Error::framing(format!(
                        "chunk decompressed to {} bytes, expected {}",
                        payload.len(),
                        decompressed_len
                    )));
                    return None;
                }
                Err(e) => {
                    r.latch(Error::framing(format!("lz4: {}", e)));
                    return None;
                }
            }
        };

        Some(RawChunk {
            signature,
            compressed: compressed_len != 0,
            payload,
        })
    }

    /// Write the chunk, compressing the payload if flagged. Returns true on
    /// failure.
    pub fn write_to(&self, w: &mut ByteWriter<impl std::io::Write>) -> bool {
        if w.write(&self.signature) {
            return true;
        }

        if self.compressed {
            let compressed = block::compress(&self.payload);
            if w.write_u32(compressed.len() as u32) {
                return true;
            }
            if w.write_u32(self.payload.len() as u32) {
                return true;
            }
            if w.write_u32(0) {
                return true;
            }
            w.write(&compressed)
        } else {
            if w.write_u32(0) {
                return true;
            }
            if w.write_u32(self.payload.len() as u32) {
                return true;
            }
            if w.write_u32(0) {
                return true;
            }
            w.write(&self.payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(chunk: &RawChunk) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = ByteWriter::new(&mut out);
        assert!(!chunk.write_to(&mut w));
        w.finish().unwrap();
        out
    }

    fn unframe(bytes: &[u8]) -> (Option<RawChunk>, Vec<Warning>) {
        let mut warnings = Vec::new();
        let mut r = ByteReader::new(bytes);
        let chunk = RawChunk::read_from(&mut r, &mut warnings);
        (chunk, warnings)
    }

    #[test]
    fn test_uncompressed_roundtrip() {
        let chunk = RawChunk {
            signature: *b"END\0",
            compressed: false,
            payload: b"</roblox>".to_vec(),
        };
        let bytes = frame(&chunk);
        // cLen == 0 marks a raw payload of dLen bytes.
        assert_eq!(&bytes[..4], b"END\0");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &9u32.to_le_bytes());
        assert_eq!(&bytes[16..], b"</roblox>");

        let (decoded, warnings) = unframe(&bytes);
        assert_eq!(decoded.unwrap(), chunk);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_compressed_roundtrip() {
        let chunk = RawChunk {
            signature: *b"PROP",
            compressed: true,
            payload: vec![7u8; 4096],
        };
        let bytes = frame(&chunk);
        let compressed_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert!(compressed_len > 0);
        assert!((compressed_len as usize) < chunk.payload.len());

        let (decoded, _) = unframe(&bytes);
        assert_eq!(decoded.unwrap(), chunk);
    }

    #[test]
    fn test_reserved_nonzero_warns() {
        let chunk = RawChunk {
            signature: *b"INST",
            compressed: false,
            payload: vec![1, 2, 3],
        };
        let mut bytes = frame(&chunk);
        bytes[12] = 0xAA;
        let (decoded, warnings) = unframe(&bytes);
        assert!(decoded.is_some());
        assert_eq!(warnings, vec![Warning::ReservedNonZero("chunk header")]);
    }

    #[test]
    fn test_wrong_decompressed_length_fails() {
        let chunk = RawChunk {
            signature: *b"PROP",
            compressed: true,
            payload: vec![7u8; 512],
        };
        let mut bytes = frame(&chunk);
        // Tamper with the declared decompressed length.
        bytes[8..12].copy_from_slice(&100u32.to_le_bytes());
        let mut warnings = Vec::new();
        let mut r = ByteReader::new(&bytes[..]);
        assert!(RawChunk::read_from(&mut r, &mut warnings).is_none());
        assert!(matches!(r.finish(), Err(Error::ChunkFraming(_))));
    }

    #[test]
    fn test_truncated_chunk_fails() {
        let chunk = RawChunk {
            signature: *b"INST",
            compressed: false,
            payload: vec![1; 64],
        };
        let bytes = frame(&chunk);
        let (decoded, _) = unframe(&bytes[..bytes.len() - 1]);
        assert!(decoded.is_none());
    }
}
