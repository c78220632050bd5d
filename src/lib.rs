//! # rbxscene
//!
//! Codec for the Roblox 3D-scene document formats. The same logical model -
//! a forest of polymorphic instances with typed properties - has two wire
//! representations: a chunked LZ4-compressed binary container and an
//! XML-shaped textual tree. This crate decodes and encodes both and keeps
//! them interchangeable.
//!
//! The original format and engine belong to Roblox Corporation; this is an
//! independent implementation aiming to match the shipped files bit for bit.
//!
//! ## Modules
//!
//! - [`scene`] - the logical model (scenes, instances, parent relation)
//! - [`value`] - the typed-value system and its textual/columnar codecs
//! - [`bform`] - the binary container
//! - [`tform`] - the textual tag-tree codec
//! - [`document`] - the tag tree exchanged with an external XML reader/writer
//! - [`schema`] - the class/property schema oracle boundary
//! - [`util`] - errors, warnings, column transform primitives
//!
//! ## Example
//!
//! ```ignore
//! use rbxscene::prelude::*;
//!
//! let out = rbxscene::bform::decode_file("place.rbxl", None)?;
//! for warning in &out.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! for root in &out.scene.instances {
//!     println!("{}", root.borrow().class_name);
//! }
//! ```

pub mod bform;
pub mod document;
pub mod scene;
pub mod schema;
pub mod tform;
pub mod util;
pub mod value;

// Re-export commonly used types
pub use scene::{DecodeOutput, EncodeOptions, Instance, InstanceRef, Scene};
pub use util::{Error, Result, Warning};
pub use value::{Value, ValueType};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::document::{Document, Tag};
    pub use crate::scene::{DecodeOutput, EncodeOptions, Instance, InstanceRef, Scene};
    pub use crate::schema::Schema;
    pub use crate::util::{Error, Result, Warning};
    pub use crate::value::{Value, ValueType};
}
