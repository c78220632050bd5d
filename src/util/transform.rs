//! Column transform primitives.
//!
//! Numeric property columns go through up to three reversible stages before
//! the chunk-level LZ4 pass: a per-value transform (zig-zag for signed
//! integers, a 1-bit rotation for floats), an optional delta stage for
//! instance-ID arrays, and a byte transposition that groups byte `i` of every
//! element into one contiguous row. Each stage is a bijection; decoding
//! applies the inverses in reverse order.

use crate::util::{Error, Result};

/// Transpose an `count`×`stride` byte matrix so that byte `i` of every
/// element lands in row `i`. `src.len()` must equal `count * stride`.
pub fn interleave(src: &[u8], stride: usize) -> Vec<u8> {
    debug_assert!(stride > 0 && src.len() % stride == 0);
    let count = src.len() / stride;
    let mut out = vec![0u8; src.len()];
    for (e, element) in src.chunks_exact(stride).enumerate() {
        for (b, &byte) in element.iter().enumerate() {
            out[b * count + e] = byte;
        }
    }
    out
}

/// Inverse of [`interleave`]: gather row `i` back into byte `i` of each
/// element. Fails if the input is not a whole number of elements.
pub fn deinterleave(src: &[u8], stride: usize) -> Result<Vec<u8>> {
    if stride == 0 || src.len() % stride != 0 {
        return Err(Error::malformed(format!(
            "{} bytes is not a multiple of element size {}",
            src.len(),
            stride
        )));
    }
    let count = src.len() / stride;
    let mut out = vec![0u8; src.len()];
    for e in 0..count {
        for b in 0..stride {
            out[e * stride + b] = src[b * count + e];
        }
    }
    Ok(out)
}

/// Map a signed 32-bit integer onto an unsigned one so that values of small
/// magnitude land near zero.
#[inline]
pub const fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub const fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Rotate the IEEE-754 bit pattern of a float left by one, moving the sign
/// bit to the LSB. Small positive and negative values become byte-close,
/// which matters after interleaving. Not payload-preserving for NaN, but the
/// format does not distinguish NaN payloads.
#[inline]
pub fn rotate_f32_left(f: f32) -> u32 {
    f.to_bits().rotate_left(1)
}

/// Inverse of [`rotate_f32_left`].
#[inline]
pub fn rotate_f32_right(bits: u32) -> f32 {
    f32::from_bits(bits.rotate_right(1))
}

/// Replace each element with its difference from the previous one. The first
/// element is kept as-is.
pub fn delta_encode(values: &mut [i32]) {
    let mut prev = 0i32;
    for v in values.iter_mut() {
        let cur = *v;
        *v = cur.wrapping_sub(prev);
        prev = cur;
    }
}

/// Inverse of [`delta_encode`]: cumulative sum in place.
pub fn delta_decode(values: &mut [i32]) {
    let mut acc = 0i32;
    for v in values.iter_mut() {
        acc = acc.wrapping_add(*v);
        *v = acc;
    }
}
