//! Columnar binary encoding of value arrays.
//!
//! A PROP payload is one array of N values written struct-of-arrays: each
//! numeric field is emitted as its own column, transformed per field kind and
//! then byte-interleaved (see [`crate::util::transform`]). Interleaved
//! columns store each element big-endian, so the high-order rows of small
//! values become zero runs for the chunk's LZ4 stage. String-family kinds are
//! self-delimiting sequential records and skip the column treatment, as do
//! doubles.
//!
//! Instance-ID arrays (INST id lists, PRNT relations, reference properties)
//! zig-zag each ID and then delta-encode along the zig-zagged stream; dense
//! ID ranges collapse to near-zero deltas.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::util::transform::{
    delta_decode, delta_encode, deinterleave, interleave, rotate_f32_left, rotate_f32_right,
    zigzag_decode, zigzag_encode,
};
use crate::util::{Error, Result};

use super::{
    Axes, CFrame, Color3, Content, Faces, Ray, UDim, UDim2, Value, ValueType, Vector2,
    Vector2int16, Vector3, Vector3int16,
};

/// The 24 axis-aligned orientations a CFrame rotation can compress into a
/// single ID byte. ID 0 is reserved for "arbitrary rotation follows"; the
/// enumeration and gaps match the upstream format table.
const ORIENTATION_TABLE: [(u8, [f32; 9]); 24] = [
    (0x02, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
    (0x03, [1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0]),
    (0x05, [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0]),
    (0x06, [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0]),
    (0x07, [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, -1.0]),
    (0x09, [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
    (0x0A, [0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
    (0x0C, [0.0, 0.0, -1.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0]),
    (0x0D, [0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]),
    (0x0E, [0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]),
    (0x10, [0.0, -1.0, 0.0, 0.0, 0.0, -1.0, 1.0, 0.0, 0.0]),
    (0x11, [0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0]),
    (0x14, [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0]),
    (0x15, [-1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0]),
    (0x17, [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0]),
    (0x18, [-1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, -1.0, 0.0]),
    (0x19, [0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
    (0x1B, [0.0, 0.0, -1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
    (0x1C, [0.0, -1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, -1.0]),
    (0x1E, [0.0, 0.0, 1.0, -1.0, 0.0, 0.0, 0.0, -1.0, 0.0]),
    (0x1F, [0.0, 1.0, 0.0, 0.0, 0.0, -1.0, -1.0, 0.0, 0.0]),
    (0x20, [0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0]),
    (0x22, [0.0, -1.0, 0.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0]),
    (0x23, [0.0, 0.0, -1.0, 0.0, -1.0, 0.0, -1.0, 0.0, 0.0]),
];

/// Find the orientation ID for a rotation matrix, if it is one of the 24
/// axis-aligned orientations.
pub fn orientation_id(rotation: &[f32; 9]) -> Option<u8> {
    ORIENTATION_TABLE
        .iter()
        .find(|(_, m)| m == rotation)
        .map(|(id, _)| *id)
}

/// Look up the rotation matrix for a non-zero orientation ID.
pub fn orientation_matrix(id: u8) -> Option<[f32; 9]> {
    ORIENTATION_TABLE
        .iter()
        .find(|(tid, _)| *tid == id)
        .map(|(_, m)| *m)
}

// === field column helpers ===

fn f32_column(values: &[f32]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for &v in values {
        raw.extend_from_slice(&rotate_f32_left(v).to_be_bytes());
    }
    interleave(&raw, 4)
}

fn f32_column_decode(data: &[u8]) -> Result<Vec<f32>> {
    let raw = deinterleave(data, 4)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| rotate_f32_right(BigEndian::read_u32(c)))
        .collect())
}

fn i32_column(values: &[i32]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for &v in values {
        raw.extend_from_slice(&zigzag_encode(v).to_be_bytes());
    }
    interleave(&raw, 4)
}

fn i32_column_decode(data: &[u8]) -> Result<Vec<i32>> {
    let raw = deinterleave(data, 4)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| zigzag_decode(BigEndian::read_u32(c)))
        .collect())
}

fn u32_column(values: &[u32]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for &v in values {
        raw.extend_from_slice(&v.to_be_bytes());
    }
    interleave(&raw, 4)
}

fn u32_column_decode(data: &[u8]) -> Result<Vec<u32>> {
    let raw = deinterleave(data, 4)?;
    Ok(raw.chunks_exact(4).map(BigEndian::read_u32).collect())
}

fn i16_column(values: &[i16]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(values.len() * 2);
    for &v in values {
        raw.extend_from_slice(&v.to_be_bytes());
    }
    interleave(&raw, 2)
}

fn i16_column_decode(data: &[u8]) -> Result<Vec<i16>> {
    let raw = deinterleave(data, 2)?;
    Ok(raw.chunks_exact(2).map(BigEndian::read_i16).collect())
}

fn push_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn take_prefixed<'a>(rest: &mut &'a [u8]) -> Result<&'a [u8]> {
    if rest.len() < 4 {
        return Err(Error::malformed("truncated string length"));
    }
    let len = LittleEndian::read_u32(&rest[..4]) as usize;
    if rest.len() < 4 + len {
        return Err(Error::malformed("truncated string bytes"));
    }
    let bytes = &rest[4..4 + len];
    *rest = &rest[4 + len..];
    Ok(bytes)
}

/// Split a fixed-stride composite payload into its per-field column blocks.
/// `widths` are the per-field byte widths in declared order.
fn split_fields<'a>(data: &'a [u8], widths: &[usize]) -> Result<(usize, Vec<&'a [u8]>)> {
    let stride: usize = widths.iter().sum();
    if data.len() % stride != 0 {
        return Err(Error::malformed(format!(
            "{} bytes is not a multiple of element size {}",
            data.len(),
            stride
        )));
    }
    let count = data.len() / stride;
    let mut fields = Vec::with_capacity(widths.len());
    let mut offset = 0;
    for &w in widths {
        fields.push(&data[offset..offset + w * count]);
        offset += w * count;
    }
    Ok((count, fields))
}

// === instance-ID arrays ===

/// Encode an instance-ID array: zig-zag each ID, delta along the zig-zagged
/// stream, byte-interleaved.
pub fn encode_referents(ids: &[i32]) -> Vec<u8> {
    let mut zigzagged: Vec<i32> = ids.iter().map(|&id| zigzag_encode(id) as i32).collect();
    delta_encode(&mut zigzagged);
    let mut raw = Vec::with_capacity(zigzagged.len() * 4);
    for delta in zigzagged {
        raw.extend_from_slice(&(delta as u32).to_be_bytes());
    }
    interleave(&raw, 4)
}

/// Inverse of [`encode_referents`]: each ID is the cumulative sum of the
/// stored deltas, un-zig-zagged.
pub fn decode_referents(data: &[u8]) -> Result<Vec<i32>> {
    let raw = deinterleave(data, 4)?;
    let mut deltas: Vec<i32> = raw
        .chunks_exact(4)
        .map(|c| BigEndian::read_u32(c) as i32)
        .collect();
    delta_decode(&mut deltas);
    Ok(deltas
        .into_iter()
        .map(|z| zigzag_decode(z as u32))
        .collect())
}

// === value arrays ===

macro_rules! collect_field {
    ($values:expr, $variant:ident, $map:expr) => {
        $values
            .iter()
            .map(|v| match v {
                Value::$variant(inner) => Ok($map(inner)),
                other => Err(Error::malformed(format!(
                    "expected {} value, found {}",
                    ValueType::$variant.tag_name(),
                    other.value_type().tag_name()
                ))),
            })
            .collect::<Result<Vec<_>>>()?
    };
}

/// Encode an array of values of type `ty` as one column block. All values
/// must have that type. Reference arrays carry scene-local IDs, not logical
/// values; encode them with [`encode_referents`] instead.
pub fn encode_array(ty: ValueType, values: &[Value]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match ty {
        ValueType::String => {
            let strings: Vec<&String> = collect_field!(values, String, |s| s);
            for s in strings {
                push_prefixed(&mut out, s.as_bytes());
            }
        }
        ValueType::ProtectedString => {
            let strings: Vec<&String> = collect_field!(values, ProtectedString, |s| s);
            for s in strings {
                push_prefixed(&mut out, s.as_bytes());
            }
        }
        ValueType::BinaryString => {
            let blobs: Vec<&Vec<u8>> = collect_field!(values, BinaryString, |b| b);
            for b in blobs {
                push_prefixed(&mut out, b);
            }
        }
        ValueType::Content => {
            let contents: Vec<&Content> = collect_field!(values, Content, |c| c);
            for c in contents {
                match c {
                    Content::None => out.push(0),
                    Content::Url(url) => {
                        out.push(1);
                        push_prefixed(&mut out, url.as_bytes());
                    }
                }
            }
        }
        ValueType::Bool => {
            let bools: Vec<bool> = collect_field!(values, Bool, |&b: &bool| b);
            out.extend(bools.iter().map(|&b| b as u8));
        }
        ValueType::Faces => {
            let faces: Vec<Faces> = collect_field!(values, Faces, |&f: &Faces| f);
            out.extend(faces.iter().map(|f| f.to_bits()));
        }
        ValueType::Axes => {
            let axes: Vec<Axes> = collect_field!(values, Axes, |&a: &Axes| a);
            out.extend(axes.iter().map(|a| a.to_bits()));
        }
        ValueType::Int => {
            let ints: Vec<i32> = collect_field!(values, Int, |&n: &i32| n);
            out = i32_column(&ints);
        }
        ValueType::Float => {
            let floats: Vec<f32> = collect_field!(values, Float, |&f: &f32| f);
            out = f32_column(&floats);
        }
        ValueType::Double => {
            let doubles: Vec<f64> = collect_field!(values, Double, |&d: &f64| d);
            for d in doubles {
                out.extend_from_slice(&d.to_le_bytes());
            }
        }
        ValueType::BrickColor => {
            let colors: Vec<u32> = collect_field!(values, BrickColor, |&c: &u32| c);
            out = u32_column(&colors);
        }
        ValueType::Token => {
            let tokens: Vec<u32> = collect_field!(values, Token, |&t: &u32| t);
            out = u32_column(&tokens);
        }
        ValueType::UDim => {
            let udims: Vec<UDim> = collect_field!(values, UDim, |&u: &UDim| u);
            out.extend(f32_column(&udims.iter().map(|u| u.scale).collect::<Vec<_>>()));
            out.extend(i32_column(&udims.iter().map(|u| u.offset).collect::<Vec<_>>()));
        }
        ValueType::UDim2 => {
            let udims: Vec<UDim2> = collect_field!(values, UDim2, |&u: &UDim2| u);
            out.extend(f32_column(&udims.iter().map(|u| u.x.scale).collect::<Vec<_>>()));
            out.extend(i32_column(&udims.iter().map(|u| u.x.offset).collect::<Vec<_>>()));
            out.extend(f32_column(&udims.iter().map(|u| u.y.scale).collect::<Vec<_>>()));
            out.extend(i32_column(&udims.iter().map(|u| u.y.offset).collect::<Vec<_>>()));
        }
        ValueType::Ray => {
            let rays: Vec<Ray> = collect_field!(values, Ray, |&r: &Ray| r);
            let fields: [fn(&Ray) -> f32; 6] = [
                |r| r.origin.x,
                |r| r.origin.y,
                |r| r.origin.z,
                |r| r.direction.x,
                |r| r.direction.y,
                |r| r.direction.z,
            ];
            for field in fields {
                out.extend(f32_column(&rays.iter().map(field).collect::<Vec<_>>()));
            }
        }
        ValueType::Color3 => {
            let colors: Vec<Color3> = collect_field!(values, Color3, |&c: &Color3| c);
            out.extend(f32_column(&colors.iter().map(|c| c.r).collect::<Vec<_>>()));
            out.extend(f32_column(&colors.iter().map(|c| c.g).collect::<Vec<_>>()));
            out.extend(f32_column(&colors.iter().map(|c| c.b).collect::<Vec<_>>()));
        }
        ValueType::Vector2 => {
            let vecs: Vec<Vector2> = collect_field!(values, Vector2, |&v: &Vector2| v);
            out.extend(f32_column(&vecs.iter().map(|v| v.x).collect::<Vec<_>>()));
            out.extend(f32_column(&vecs.iter().map(|v| v.y).collect::<Vec<_>>()));
        }
        ValueType::Vector3 => {
            let vecs: Vec<Vector3> = collect_field!(values, Vector3, |&v: &Vector3| v);
            out = vector3_columns(&vecs);
        }
        ValueType::Vector2int16 => {
            let vecs: Vec<Vector2int16> =
                collect_field!(values, Vector2int16, |&v: &Vector2int16| v);
            out.extend(i16_column(&vecs.iter().map(|v| v.x).collect::<Vec<_>>()));
            out.extend(i16_column(&vecs.iter().map(|v| v.y).collect::<Vec<_>>()));
        }
        ValueType::Vector3int16 => {
            let vecs: Vec<Vector3int16> =
                collect_field!(values, Vector3int16, |&v: &Vector3int16| v);
            out.extend(i16_column(&vecs.iter().map(|v| v.x).collect::<Vec<_>>()));
            out.extend(i16_column(&vecs.iter().map(|v| v.y).collect::<Vec<_>>()));
            out.extend(i16_column(&vecs.iter().map(|v| v.z).collect::<Vec<_>>()));
        }
        ValueType::CFrame => {
            let frames: Vec<CFrame> = collect_field!(values, CFrame, |&c: &CFrame| c);
            for frame in &frames {
                match orientation_id(&frame.rotation) {
                    Some(id) => out.push(id),
                    None => {
                        out.push(0);
                        for component in frame.rotation {
                            out.extend_from_slice(&component.to_le_bytes());
                        }
                    }
                }
            }
            let positions: Vec<Vector3> = frames.iter().map(|f| f.position).collect();
            out.extend(vector3_columns(&positions));
        }
        ValueType::Reference => {
            return Err(Error::malformed(
                "reference arrays are encoded as instance IDs",
            ));
        }
    }
    Ok(out)
}

fn vector3_columns(vecs: &[Vector3]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vecs.len() * 12);
    out.extend(f32_column(&vecs.iter().map(|v| v.x).collect::<Vec<_>>()));
    out.extend(f32_column(&vecs.iter().map(|v| v.y).collect::<Vec<_>>()));
    out.extend(f32_column(&vecs.iter().map(|v| v.z).collect::<Vec<_>>()));
    out
}

fn vector3_columns_decode(data: &[u8]) -> Result<Vec<Vector3>> {
    let (_, fields) = split_fields(data, &[4, 4, 4])?;
    let x = f32_column_decode(fields[0])?;
    let y = f32_column_decode(fields[1])?;
    let z = f32_column_decode(fields[2])?;
    Ok(x.into_iter()
        .zip(y)
        .zip(z)
        .map(|((x, y), z)| Vector3 { x, y, z })
        .collect())
}

/// Decode one column block of type `ty` into values. The element count is
/// derived from the payload itself. Reference arrays decode to instance IDs
/// via [`decode_referents`].
pub fn decode_array(ty: ValueType, data: &[u8]) -> Result<Vec<Value>> {
    let values = match ty {
        ValueType::String => {
            let mut rest = data;
            let mut out = Vec::new();
            while !rest.is_empty() {
                let bytes = take_prefixed(&mut rest)?;
                out.push(Value::String(
                    String::from_utf8_lossy(bytes).into_owned(),
                ));
            }
            out
        }
        ValueType::ProtectedString => {
            let mut rest = data;
            let mut out = Vec::new();
            while !rest.is_empty() {
                let bytes = take_prefixed(&mut rest)?;
                out.push(Value::ProtectedString(
                    String::from_utf8_lossy(bytes).into_owned(),
                ));
            }
            out
        }
        ValueType::BinaryString => {
            let mut rest = data;
            let mut out = Vec::new();
            while !rest.is_empty() {
                out.push(Value::BinaryString(take_prefixed(&mut rest)?.to_vec()));
            }
            out
        }
        ValueType::Content => {
            let mut rest = data;
            let mut out = Vec::new();
            while !rest.is_empty() {
                let kind = rest[0];
                rest = &rest[1..];
                match kind {
                    0 => out.push(Value::Content(Content::None)),
                    1 => {
                        let bytes = take_prefixed(&mut rest)?;
                        out.push(Value::Content(Content::Url(
                            String::from_utf8_lossy(bytes).into_owned(),
                        )));
                    }
                    other => {
                        return Err(Error::malformed(format!(
                            "unknown content kind {}",
                            other
                        )))
                    }
                }
            }
            out
        }
        ValueType::Bool => data.iter().map(|&b| Value::Bool(b != 0)).collect(),
        ValueType::Faces => data
            .iter()
            .map(|&b| Value::Faces(Faces::from_bits(b)))
            .collect(),
        ValueType::Axes => data
            .iter()
            .map(|&b| Value::Axes(Axes::from_bits(b)))
            .collect(),
        ValueType::Int => i32_column_decode(data)?.into_iter().map(Value::Int).collect(),
        ValueType::Float => f32_column_decode(data)?
            .into_iter()
            .map(Value::Float)
            .collect(),
        ValueType::Double => {
            if data.len() % 8 != 0 {
                return Err(Error::malformed("double array truncated"));
            }
            data.chunks_exact(8)
                .map(|c| Value::Double(LittleEndian::read_f64(c)))
                .collect()
        }
        ValueType::BrickColor => u32_column_decode(data)?
            .into_iter()
            .map(Value::BrickColor)
            .collect(),
        ValueType::Token => u32_column_decode(data)?
            .into_iter()
            .map(Value::Token)
            .collect(),
        ValueType::UDim => {
            let (_, fields) = split_fields(data, &[4, 4])?;
            let scale = f32_column_decode(fields[0])?;
            let offset = i32_column_decode(fields[1])?;
            scale
                .into_iter()
                .zip(offset)
                .map(|(scale, offset)| Value::UDim(UDim { scale, offset }))
                .collect()
        }
        ValueType::UDim2 => {
            let (count, fields) = split_fields(data, &[4, 4, 4, 4])?;
            let xs = f32_column_decode(fields[0])?;
            let xo = i32_column_decode(fields[1])?;
            let ys = f32_column_decode(fields[2])?;
            let yo = i32_column_decode(fields[3])?;
            (0..count)
                .map(|i| {
                    Value::UDim2(UDim2 {
                        x: UDim {
                            scale: xs[i],
                            offset: xo[i],
                        },
                        y: UDim {
                            scale: ys[i],
                            offset: yo[i],
                        },
                    })
                })
                .collect()
        }
        ValueType::Ray => {
            let (count, fields) = split_fields(data, &[4, 4, 4, 4, 4, 4])?;
            let cols: Vec<Vec<f32>> = fields
                .into_iter()
                .map(f32_column_decode)
                .collect::<Result<_>>()?;
            (0..count)
                .map(|i| {
                    Value::Ray(Ray {
                        origin: Vector3::new(cols[0][i], cols[1][i], cols[2][i]),
                        direction: Vector3::new(cols[3][i], cols[4][i], cols[5][i]),
                    })
                })
                .collect()
        }
        ValueType::Color3 => {
            let (count, fields) = split_fields(data, &[4, 4, 4])?;
            let r = f32_column_decode(fields[0])?;
            let g = f32_column_decode(fields[1])?;
            let b = f32_column_decode(fields[2])?;
            (0..count)
                .map(|i| {
                    Value::Color3(Color3 {
                        r: r[i],
                        g: g[i],
                        b: b[i],
                    })
                })
                .collect()
        }
        ValueType::Vector2 => {
            let (count, fields) = split_fields(data, &[4, 4])?;
            let x = f32_column_decode(fields[0])?;
            let y = f32_column_decode(fields[1])?;
            (0..count)
                .map(|i| Value::Vector2(Vector2 { x: x[i], y: y[i] }))
                .collect()
        }
        ValueType::Vector3 => vector3_columns_decode(data)?
            .into_iter()
            .map(Value::Vector3)
            .collect(),
        ValueType::Vector2int16 => {
            let (count, fields) = split_fields(data, &[2, 2])?;
            let x = i16_column_decode(fields[0])?;
            let y = i16_column_decode(fields[1])?;
            (0..count)
                .map(|i| Value::Vector2int16(Vector2int16 { x: x[i], y: y[i] }))
                .collect()
        }
        ValueType::Vector3int16 => {
            let (count, fields) = split_fields(data, &[2, 2, 2])?;
            let x = i16_column_decode(fields[0])?;
            let y = i16_column_decode(fields[1])?;
            let z = i16_column_decode(fields[2])?;
            (0..count)
                .map(|i| {
                    Value::Vector3int16(Vector3int16 {
                        x: x[i],
                        y: y[i],
                        z: z[i],
                    })
                })
                .collect()
        }
        ValueType::CFrame => {
            // Tag/rotation records first; the parse is done when the bytes
            // left are exactly the position block for the elements seen.
            let mut rest = data;
            let mut rotations: Vec<[f32; 9]> = Vec::new();
            loop {
                if rest.len() == 12 * rotations.len() {
                    break;
                }
                if rest.len() < 12 * rotations.len() || rest.is_empty() {
                    return Err(Error::malformed("CFrame array truncated"));
                }
                let tag = rest[0];
                rest = &rest[1..];
                if tag == 0 {
                    if rest.len() < 36 {
                        return Err(Error::malformed("CFrame rotation truncated"));
                    }
                    let mut rotation = [0f32; 9];
                    for (i, component) in rotation.iter_mut().enumerate() {
                        *component = LittleEndian::read_f32(&rest[i * 4..]);
                    }
                    rest = &rest[36..];
                    rotations.push(rotation);
                } else {
                    let rotation = orientation_matrix(tag).ok_or_else(|| {
                        Error::malformed(format!("unknown CFrame orientation {:#04x}", tag))
                    })?;
                    rotations.push(rotation);
                }
            }
            let positions = vector3_columns_decode(rest)?;
            rotations
                .into_iter()
                .zip(positions)
                .map(|(rotation, position)| Value::CFrame(CFrame { position, rotation }))
                .collect()
        }
        ValueType::Reference => {
            return Err(Error::malformed(
                "reference arrays are decoded as instance IDs",
            ));
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ty: ValueType, values: Vec<Value>) {
        let bytes = encode_array(ty, &values).unwrap();
        let back = decode_array(ty, &bytes).unwrap();
        assert_eq!(back, values, "{:?}", ty);
    }

    #[test]
    fn test_int_column_roundtrip() {
        roundtrip(
            ValueType::Int,
            vec![Value::Int(0), Value::Int(-1), Value::Int(1000), Value::Int(i32::MIN)],
        );
    }

    #[test]
    fn test_float_column_roundtrip() {
        roundtrip(
            ValueType::Float,
            vec![Value::Float(0.0), Value::Float(-2.5), Value::Float(1e-12)],
        );
    }

    #[test]
    fn test_interleaved_small_ints_lead_with_zero_rows() {
        // Small magnitudes keep the high-order rows zero, which is the whole
        // point of the big-endian interleave.
        let bytes =
            encode_array(ValueType::Int, &[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(&bytes[..9], &[0u8; 9]);
    }

    #[test]
    fn test_string_and_content_roundtrip() {
        roundtrip(
            ValueType::String,
            vec![Value::String("".into()), Value::String("hello".into())],
        );
        roundtrip(
            ValueType::Content,
            vec![
                Value::Content(Content::None),
                Value::Content(Content::Url("rbxasset://sound".into())),
                Value::Content(Content::Url(String::new())),
            ],
        );
    }

    #[test]
    fn test_composite_roundtrips() {
        roundtrip(
            ValueType::Vector3,
            vec![
                Value::Vector3(Vector3::new(4.0, 1.0, 2.0)),
                Value::Vector3(Vector3::new(-0.5, 0.0, 9e9)),
            ],
        );
        roundtrip(
            ValueType::UDim2,
            vec![Value::UDim2(UDim2 {
                x: UDim {
                    scale: 0.5,
                    offset: -20,
                },
                y: UDim {
                    scale: 1.0,
                    offset: 3,
                },
            })],
        );
        roundtrip(
            ValueType::Ray,
            vec![Value::Ray(Ray {
                origin: Vector3::new(1.0, 2.0, 3.0),
                direction: Vector3::new(0.0, -1.0, 0.0),
            })],
        );
        roundtrip(
            ValueType::Vector3int16,
            vec![Value::Vector3int16(Vector3int16 { x: -5, y: 0, z: 300 })],
        );
    }

    #[test]
    fn test_vector3_column_layout() {
        // Field columns are contiguous: all X, then all Y, then all Z.
        let bytes = encode_array(
            ValueType::Vector3,
            &[
                Value::Vector3(Vector3::new(1.0, 2.0, 3.0)),
                Value::Vector3(Vector3::new(4.0, 5.0, 6.0)),
            ],
        )
        .unwrap();
        assert_eq!(bytes.len(), 24);
        let x = f32_column_decode(&bytes[..8]).unwrap();
        assert_eq!(x, vec![1.0, 4.0]);
    }

    #[test]
    fn test_cframe_axis_aligned_is_one_byte() {
        let frames = vec![Value::CFrame(CFrame {
            position: Vector3::new(1.0, 2.0, 3.0),
            ..CFrame::default()
        })];
        let bytes = encode_array(ValueType::CFrame, &frames).unwrap();
        // identity rotation compresses to its ID byte plus the position block
        assert_eq!(bytes.len(), 1 + 12);
        assert_eq!(bytes[0], 0x02);
        assert_eq!(decode_array(ValueType::CFrame, &bytes).unwrap(), frames);
    }

    #[test]
    fn test_cframe_arbitrary_rotation_roundtrip() {
        let frames = vec![
            Value::CFrame(CFrame {
                position: Vector3::new(0.0, 5.0, 0.0),
                rotation: [0.866, 0.0, 0.5, 0.0, 1.0, 0.0, -0.5, 0.0, 0.866],
            }),
            Value::CFrame(CFrame::default()),
        ];
        let bytes = encode_array(ValueType::CFrame, &frames).unwrap();
        assert_eq!(decode_array(ValueType::CFrame, &bytes).unwrap(), frames);
    }

    #[test]
    fn test_orientation_table() {
        // 24 distinct IDs, none of them the inline marker.
        let mut ids: Vec<u8> = ORIENTATION_TABLE.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 24);
        assert!(!ids.contains(&0));
        assert_eq!(ids[0], 0x02);
        assert_eq!(*ids.last().unwrap(), 0x23);

        for (id, m) in ORIENTATION_TABLE {
            assert_eq!(orientation_id(&m), Some(id));
            assert_eq!(orientation_matrix(id), Some(m));
        }
    }

    #[test]
    fn test_referent_deltas() {
        let ids = vec![0i32, 1, 2, 3, 4];
        let bytes = encode_referents(&ids);
        // A dense range zig-zags to [0, 2, 4, 6, 8], so every stored delta
        // after the first is 2 and the low-order row is [0, 2, 2, 2, 2].
        assert_eq!(&bytes[15..], &[0, 2, 2, 2, 2]);
        assert_eq!(decode_referents(&bytes).unwrap(), ids);

        let sparse = vec![7i32, -1, 100, 3];
        assert_eq!(decode_referents(&encode_referents(&sparse)).unwrap(), sparse);
    }

    #[test]
    fn test_referent_transform_order_is_zigzag_then_delta() {
        // [3, 1] zig-zags to [6, 2]; the deltas of the zig-zagged stream are
        // [6, -4], stored as wrapping u32 words. Delta-before-zig-zag would
        // store [6, 3] instead.
        let bytes = encode_referents(&[3, 1]);
        assert_eq!(
            bytes,
            [0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x06, 0xFC]
        );
        assert_eq!(decode_referents(&bytes).unwrap(), vec![3, 1]);
    }

    #[test]
    fn test_bad_array_lengths() {
        assert!(decode_array(ValueType::Int, &[1, 2, 3]).is_err());
        assert!(decode_array(ValueType::Double, &[0; 7]).is_err());
        assert!(decode_array(ValueType::String, &[5, 0, 0, 0, b'x']).is_err());
    }
}
