//! The textual tree form ("T-form"): the XML-shaped tag tree codec.

pub mod codec;

pub use codec::{decode, encode};
