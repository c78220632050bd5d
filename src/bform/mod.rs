//! The binary container ("B-form"): a chunked, per-chunk-compressed file.
//!
//! - [`stream`] - sticky length-tracking byte reader/writer
//! - [`chunk`] - raw chunk framing with LZ4 block compression
//! - [`model`] - header and typed chunk stream ([`FormatModel`])
//! - [`codec`] - scene-level encode/decode on top of the model

pub mod chunk;
pub mod codec;
pub mod model;
pub mod stream;

pub use codec::{decode, decode_file, encode, encode_file};
pub use model::FormatModel;
