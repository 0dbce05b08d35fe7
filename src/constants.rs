/// Record marker for a single dense parameter.
pub const PARAMETER_MAGIC: [u8; 4] = *b"PPAR";
/// Record marker for a lookup (embedding) table.
pub const LOOKUP_MAGIC: [u8; 4] = *b"PLKP";
/// Length of the blake3 digest trailing every record.
pub const CHECKSUM_SIZE: usize = 32;
/// Suffix appended to the data file name to derive the index file name.
pub const INDEX_SUFFIX: &str = ".meta";
/// Key used for collections whose namespace is the root.
pub const ROOT_KEY: &str = "/";
/// Separator between a collection namespace and an entity name.
pub const NAMESPACE_SEPARATOR: char = '/';

/// Longest entity name accepted by the decoder.
pub const MAX_NAME_BYTES: u32 = 64 * 1024;
/// Highest tensor rank accepted by the decoder.
pub const MAX_RANK: u32 = 32;
/// Largest element count of a single stored tensor.
pub const MAX_TENSOR_ELEMENTS: u64 = 1 << 32;
/// Default decode guard for a single record.
pub const DEFAULT_MAX_RECORD_BYTES: u64 = 1024 * 1024 * 1024;
