//! `tablekit-core` — building blocks for single-table entities.
//!
//! This crate contains **pure** primitives (no store access): the error model, attribute
//! values and records, sort-key templates, and batch chunking.

pub mod chunk;
pub mod error;
pub mod key;
pub mod record;
pub mod value;

pub use chunk::{BatchChunker, MAX_BATCH_WRITE_ITEMS};
pub use error::{EntityError, EntityResult};
pub use key::{KeyCodec, KeyParts, KEY_SEPARATOR};
pub use record::{fields, is_non_blank, ItemKey, Record};
pub use value::{iso_timestamp, AttrValue};
