//! The binary container model: header plus a typed chunk stream.
//!
//! This layer is bit-faithful and scene-agnostic: it knows groups, columns
//! and instance IDs, but nothing about the logical forest. Hosts that need
//! exact control over chunk layout (or want partial results past a fatal
//! error) work at this level; [`super::codec`] maps it to [`crate::scene`].

use std::io::{Read, Write};

use crate::bform::chunk::RawChunk;
use crate::bform::stream::{ByteReader, ByteWriter};
use crate::util::{Error, Result, Warning};
use crate::value::{column, Value, ValueType};

/// Magic bytes at the start of a binary scene file.
pub const BINARY_MAGIC: &[u8; 14] = b"<roblox!\x89\xff\r\n\x1a\n";

/// The only file version this codec understands.
pub const FILE_VERSION: u16 = 0;

/// Content the END chunk is expected to carry.
pub const END_CONTENT: &[u8] = b"</roblox>";

pub const SIG_INSTANCE: [u8; 4] = *b"INST";
pub const SIG_PROPERTY: [u8; 4] = *b"PROP";
pub const SIG_PARENT: [u8; 4] = *b"PRNT";
pub const SIG_END: [u8; 4] = *b"END\0";

/// A decoded or to-be-encoded binary file: counts from the header and the
/// chunk list in stream order. Warnings gather here so a host sees them even
/// when a later chunk fails.
#[derive(Debug, Default)]
pub struct FormatModel {
    /// Number of instance groups (INST chunks) the header declares.
    pub group_count: u32,
    /// Number of instances the header declares.
    pub instance_count: u32,
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<Warning>,
}

impl FormatModel {
    /// Decode a binary stream into the model. Chunks decoded before a fatal
    /// error stay in `chunks`; warnings accumulate in source order. Unknown
    /// chunk signatures are skipped with a warning. Parsing stops at the END
    /// chunk.
    pub fn read_from(&mut self, r: impl Read) -> Result<u64> {
        self.chunks.clear();
        self.warnings.clear();

        let mut fr = ByteReader::new(r);

        let mut magic = [0u8; BINARY_MAGIC.len()];
        if fr.fill(&mut magic) {
            return fr.finish();
        }
        if &magic != BINARY_MAGIC {
            fr.latch(Error::CorruptHeader);
            return fr.finish();
        }

        let version = fr.read_u16();
        if fr.failed() {
            return fr.finish();
        }
        if version != FILE_VERSION {
            fr.latch(Error::MismatchedVersion {
                expected: FILE_VERSION,
                decoded: version,
            });
            return fr.finish();
        }

        self.group_count = fr.read_u32();
        self.instance_count = fr.read_u32();
        let reserved = fr.read_u64();
        if fr.failed() {
            return fr.finish();
        }
        if reserved != 0 {
            self.warnings.push(Warning::ReservedNonZero("file header"));
        }

        loop {
            let raw = match RawChunk::read_from(&mut fr, &mut self.warnings) {
                Some(raw) => raw,
                None => return fr.finish(),
            };

            let chunk = match raw.signature {
                SIG_INSTANCE => Chunk::Instance(match ChunkInstance::decode(&raw) {
                    Ok(c) => c,
                    Err(e) => {
                        fr.latch(e);
                        return fr.finish();
                    }
                }),
                SIG_PROPERTY => Chunk::Property(match ChunkProperty::decode(&raw) {
                    Ok(c) => c,
                    Err(e) => {
                        fr.latch(e);
                        return fr.finish();
                    }
                }),
                SIG_PARENT => Chunk::Parent(match ChunkParent::decode(&raw) {
                    Ok(c) => c,
                    Err(e) => {
                        fr.latch(e);
                        return fr.finish();
                    }
                }),
                SIG_END => {
                    let end = ChunkEnd {
                        compressed: raw.compressed,
                        content: raw.payload,
                    };
                    if end.compressed {
                        self.warnings.push(Warning::EndChunkCompressed);
                    }
                    if end.content != END_CONTENT {
                        self.warnings.push(Warning::EndChunkContent);
                    }
                    self.chunks.push(Chunk::End(end));
                    break;
                }
                other => {
                    self.warnings.push(Warning::UnknownChunk(other));
                    continue;
                }
            };

            self.chunks.push(chunk);
        }

        fr.finish()
    }

    /// Encode the model back to bytes.
    pub fn write_to(&self, w: impl Write) -> Result<u64> {
        let mut fw = ByteWriter::new(w);

        fw.write(BINARY_MAGIC);
        fw.write_u16(FILE_VERSION);
        fw.write_u32(self.group_count);
        fw.write_u32(self.instance_count);
        fw.write_u64(0);

        for chunk in &self.chunks {
            let payload = match chunk.encode_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    fw.latch(e);
                    return fw.finish();
                }
            };
            let raw = RawChunk {
                signature: chunk.signature(),
                compressed: chunk.compressed(),
                payload,
            };
            if raw.write_to(&mut fw) {
                return fw.finish();
            }
        }

        fw.finish()
    }
}

/// One chunk of the stream. Dispatch is on the variant.
#[derive(Debug)]
pub enum Chunk {
    Instance(ChunkInstance),
    Property(ChunkProperty),
    Parent(ChunkParent),
    End(ChunkEnd),
}

impl Chunk {
    pub fn signature(&self) -> [u8; 4] {
        match self {
            Chunk::Instance(_) => SIG_INSTANCE,
            Chunk::Property(_) => SIG_PROPERTY,
            Chunk::Parent(_) => SIG_PARENT,
            Chunk::End(_) => SIG_END,
        }
    }

    pub fn compressed(&self) -> bool {
        match self {
            Chunk::Instance(c) => c.compressed,
            Chunk::Property(c) => c.compressed,
            Chunk::Parent(c) => c.compressed,
            Chunk::End(c) => c.compressed,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>> {
        match self {
            Chunk::Instance(c) => c.encode(),
            Chunk::Property(c) => c.encode(),
            Chunk::Parent(c) => c.encode(),
            Chunk::End(c) => Ok(c.content.clone()),
        }
    }
}

/// INST: declares a group of instances sharing one class name. The listed
/// scene-local IDs are how PROP and PRNT chunks refer back to them.
#[derive(Debug, Default)]
pub struct ChunkInstance {
    pub compressed: bool,
    pub group_id: u32,
    pub class_name: String,
    pub instance_ids: Vec<i32>,
    pub is_service: bool,
    /// One flag per instance when `is_service` is set: non-zero means the
    /// instance is fetched as a service instead of constructed.
    pub get_service: Vec<u8>,
}

impl ChunkInstance {
    fn decode(raw: &RawChunk) -> Result<Self> {
        let mut r = ByteReader::new(raw.payload.as_slice());
        let group_id = r.read_u32();
        let class_name = r.read_string();
        let is_service = r.read_u8() != 0;
        let len = r.read_u32() as usize;

        let mut id_bytes = vec![0u8; len * 4];
        r.fill(&mut id_bytes);

        let mut get_service = Vec::new();
        if is_service {
            get_service = vec![0u8; len];
            r.fill(&mut get_service);
        }
        r.finish()?;

        Ok(Self {
            compressed: raw.compressed,
            group_id,
            class_name,
            instance_ids: column::decode_referents(&id_bytes)?,
            is_service,
            get_service,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut w = ByteWriter::new(&mut out);
        w.write_u32(self.group_id);
        w.write_string(&self.class_name);
        w.write_u8(self.is_service as u8);
        w.write_u32(self.instance_ids.len() as u32);
        w.write(&column::encode_referents(&self.instance_ids));
        if self.is_service {
            if self.get_service.len() != self.instance_ids.len() {
                w.latch(Error::malformed(
                    "get-service flags do not cover the instance group",
                ));
            } else {
                w.write(&self.get_service);
            }
        }
        w.finish()?;
        Ok(out)
    }
}

/// The values carried by a PROP chunk. Reference-typed properties are
/// scene-local instance IDs at this layer; they never leak into the logical
/// model.
#[derive(Debug)]
pub enum PropertyValues {
    Typed(Vec<Value>),
    Referents(Vec<i32>),
}

impl PropertyValues {
    pub fn len(&self) -> usize {
        match self {
            PropertyValues::Typed(v) => v.len(),
            PropertyValues::Referents(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// PROP: one columnar property array for a group, paired positionally with
/// the group's instance list.
#[derive(Debug)]
pub struct ChunkProperty {
    pub compressed: bool,
    pub group_id: u32,
    pub property_name: String,
    pub data_type: u8,
    pub values: PropertyValues,
}

impl ChunkProperty {
    fn decode(raw: &RawChunk) -> Result<Self> {
        let mut r = ByteReader::new(raw.payload.as_slice());
        let group_id = r.read_u32();
        let property_name = r.read_string();
        let data_type = r.read_u8();
        let rest = r.read_to_end();
        r.finish()?;

        let ty = ValueType::from_id(data_type).ok_or(Error::UnknownDataType(data_type))?;
        let values = match ty {
            ValueType::Reference => PropertyValues::Referents(column::decode_referents(&rest)?),
            _ => PropertyValues::Typed(column::decode_array(ty, &rest)?),
        };

        Ok(Self {
            compressed: raw.compressed,
            group_id,
            property_name,
            data_type,
            values,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let ty = ValueType::from_id(self.data_type).ok_or(Error::UnknownDataType(self.data_type))?;
        let column_bytes = match &self.values {
            PropertyValues::Referents(ids) => {
                if ty != ValueType::Reference {
                    return Err(Error::malformed(
                        "instance IDs under a non-reference data type",
                    ));
                }
                column::encode_referents(ids)
            }
            PropertyValues::Typed(values) => column::encode_array(ty, values)?,
        };

        let mut out = Vec::new();
        let mut w = ByteWriter::new(&mut out);
        w.write_u32(self.group_id);
        w.write_string(&self.property_name);
        w.write_u8(self.data_type);
        w.write(&column_bytes);
        w.finish()?;
        Ok(out)
    }
}

/// PRNT: the parent relation, position-paired ID arrays. A parent of -1
/// marks a scene root.
#[derive(Debug, Default)]
pub struct ChunkParent {
    pub compressed: bool,
    /// Format version of this chunk alone; carried verbatim on re-encode.
    pub version: u8,
    pub children: Vec<i32>,
    pub parents: Vec<i32>,
}

impl ChunkParent {
    fn decode(raw: &RawChunk) -> Result<Self> {
        let mut r = ByteReader::new(raw.payload.as_slice());
        let version = r.read_u8();
        let count = r.read_u32() as usize;

        let mut child_bytes = vec![0u8; count * 4];
        r.fill(&mut child_bytes);
        let mut parent_bytes = vec![0u8; count * 4];
        r.fill(&mut parent_bytes);
        r.finish()?;

        Ok(Self {
            compressed: raw.compressed,
            version,
            children: column::decode_referents(&child_bytes)?,
            parents: column::decode_referents(&parent_bytes)?,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        if self.children.len() != self.parents.len() {
            return Err(Error::ParentLengthMismatch);
        }
        let mut out = Vec::new();
        let mut w = ByteWriter::new(&mut out);
        w.write_u8(self.version);
        w.write_u32(self.children.len() as u32);
        w.write(&column::encode_referents(&self.children));
        w.write(&column::encode_referents(&self.parents));
        w.finish()?;
        Ok(out)
    }
}

/// END: terminates the chunk stream. The content is opaque; for maximum
/// compatibility it should be `</roblox>` and the chunk uncompressed, and
/// decode warns when it is not.
#[derive(Debug, Default)]
pub struct ChunkEnd {
    pub compressed: bool,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_file_bytes() -> Vec<u8> {
        let model = FormatModel {
            group_count: 0,
            instance_count: 0,
            chunks: vec![Chunk::End(ChunkEnd {
                compressed: false,
                content: END_CONTENT.to_vec(),
            })],
            warnings: Vec::new(),
        };
        let mut out = Vec::new();
        model.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_empty_file_roundtrip() {
        let bytes = empty_file_bytes();
        assert_eq!(&bytes[..BINARY_MAGIC.len()], BINARY_MAGIC);

        let mut model = FormatModel::default();
        let n = model.read_from(bytes.as_slice()).unwrap();
        assert_eq!(n, bytes.len() as u64);
        assert_eq!(model.group_count, 0);
        assert_eq!(model.instance_count, 0);
        assert_eq!(model.chunks.len(), 1);
        assert!(model.warnings.is_empty());
        assert!(matches!(&model.chunks[0], Chunk::End(_)));
    }

    #[test]
    fn test_corrupt_magic_is_fatal() {
        let mut bytes = empty_file_bytes();
        bytes[0] ^= 0xFF;
        let mut model = FormatModel::default();
        assert!(matches!(
            model.read_from(bytes.as_slice()),
            Err(Error::CorruptHeader)
        ));
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let mut bytes = empty_file_bytes();
        bytes[BINARY_MAGIC.len()] = 9;
        let mut model = FormatModel::default();
        assert!(matches!(
            model.read_from(bytes.as_slice()),
            Err(Error::MismatchedVersion {
                expected: 0,
                decoded: 9
            })
        ));
    }

    #[test]
    fn test_unknown_chunk_skipped_with_warning() {
        let model = FormatModel {
            group_count: 0,
            instance_count: 0,
            chunks: vec![Chunk::End(ChunkEnd {
                compressed: false,
                content: END_CONTENT.to_vec(),
            })],
            warnings: Vec::new(),
        };
        let mut bytes = Vec::new();
        model.write_to(&mut bytes).unwrap();

        // Splice an unknown chunk between header and END.
        let header_len = BINARY_MAGIC.len() + 2 + 4 + 4 + 8;
        let mut unknown = Vec::new();
        let mut w = ByteWriter::new(&mut unknown);
        RawChunk {
            signature: *b"META",
            compressed: false,
            payload: vec![1, 2, 3],
        }
        .write_to(&mut w);
        w.finish().unwrap();
        let mut spliced = bytes[..header_len].to_vec();
        spliced.extend_from_slice(&unknown);
        spliced.extend_from_slice(&bytes[header_len..]);

        let mut decoded = FormatModel::default();
        decoded.read_from(spliced.as_slice()).unwrap();
        assert_eq!(decoded.chunks.len(), 1);
        assert_eq!(decoded.warnings, vec![Warning::UnknownChunk(*b"META")]);
    }

    #[test]
    fn test_instance_chunk_roundtrip() {
        let chunk = ChunkInstance {
            compressed: false,
            group_id: 3,
            class_name: "Workspace".to_string(),
            instance_ids: vec![0, 1, 5],
            is_service: true,
            get_service: vec![1, 1, 0],
        };
        let payload = chunk.encode().unwrap();
        let raw = RawChunk {
            signature: SIG_INSTANCE,
            compressed: false,
            payload,
        };
        let back = ChunkInstance::decode(&raw).unwrap();
        assert_eq!(back.group_id, 3);
        assert_eq!(back.class_name, "Workspace");
        assert_eq!(back.instance_ids, vec![0, 1, 5]);
        assert!(back.is_service);
        assert_eq!(back.get_service, vec![1, 1, 0]);
    }

    #[test]
    fn test_property_chunk_unknown_type_is_fatal() {
        let mut payload = Vec::new();
        let mut w = ByteWriter::new(&mut payload);
        w.write_u32(0);
        w.write_string("Name");
        w.write_u8(0xEE);
        w.finish().unwrap();
        let raw = RawChunk {
            signature: SIG_PROPERTY,
            compressed: false,
            payload,
        };
        assert!(matches!(
            ChunkProperty::decode(&raw),
            Err(Error::UnknownDataType(0xEE))
        ));
    }

    #[test]
    fn test_parent_chunk_preserves_version() {
        let chunk = ChunkParent {
            compressed: false,
            version: 7,
            children: vec![0, 1],
            parents: vec![-1, 0],
        };
        let payload = chunk.encode().unwrap();
        let raw = RawChunk {
            signature: SIG_PARENT,
            compressed: false,
            payload,
        };
        let back = ChunkParent::decode(&raw).unwrap();
        assert_eq!(back.version, 7);
        assert_eq!(back.children, vec![0, 1]);
        assert_eq!(back.parents, vec![-1, 0]);
    }

    #[test]
    fn test_parent_chunk_length_mismatch() {
        let chunk = ChunkParent {
            compressed: false,
            version: 0,
            children: vec![0, 1],
            parents: vec![-1],
        };
        assert!(matches!(
            chunk.encode(),
            Err(Error::ParentLengthMismatch)
        ));
    }
}
