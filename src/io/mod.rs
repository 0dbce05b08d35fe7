//! Low-level IO primitives for the data and index files of a store.

pub mod index;
pub mod record;

pub use index::{IndexEntry, KeyIndex};
pub use record::{Record, RecordCodec, RecordKind, RecordSummary, RecordView};
