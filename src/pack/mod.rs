//! The store façade: one data file of records plus its `.meta` key index.
//!
//! A [`Pack`] owns the write offset of its store but no file handles; every save and populate
//! opens what it needs and closes it before returning, on success and on failure alike.
//! Writers must be serialised by the caller. Populates only read and may run concurrently with
//! each other.

mod inspect;
mod options;
mod populate;
mod save;
mod target;

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub use inspect::{KeyReport, VerifyReport};
pub use options::{PopulateOptions, SaveOptions};
pub use populate::PopulateReport;
pub use target::{Target, TargetMut};

use crate::{
    config::PackConfig,
    constants::INDEX_SUFFIX,
    error::{PackError, Result},
    io::{IndexEntry, KeyIndex, Record, RecordCodec},
};

/// Keyed, append-only parameter store.
#[derive(Debug, Clone)]
pub struct Pack {
    data_path: PathBuf,
    index_path: PathBuf,
    offset: u64,
    config: PackConfig,
    codec: RecordCodec,
}

/// A decoded record together with where it sits in the data file.
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub offset: u64,
    pub length: u64,
    pub record: Record,
}

impl Pack {
    /// Binds to the store at `path` (index at `<path>.meta`) with the default config.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(path, PackConfig::default())
    }

    /// Binds to the store at `path`, restoring the write offset from its index if it exists.
    pub fn with_config(path: impl AsRef<Path>, config: PackConfig) -> Result<Self> {
        let data_path = path.as_ref().to_path_buf();
        let mut pack = Self {
            index_path: index_path_for(&data_path),
            data_path,
            offset: 0,
            codec: RecordCodec::from_config(&config),
            config,
        };
        pack.restore_offset()?;
        Ok(pack)
    }

    /// Re-points the pack at another store. The offset restarts at 0 and is then restored from
    /// the new store's index, so appending to an existing store never overwrites it.
    pub fn reinit(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.data_path = path.as_ref().to_path_buf();
        self.index_path = index_path_for(&self.data_path);
        self.offset = 0;
        self.restore_offset()?;
        tracing::info!(
            path = %self.data_path.display(),
            offset = self.offset,
            "pack re-pointed"
        );
        Ok(())
    }

    /// Byte position where the next saved block will start.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    fn restore_offset(&mut self) -> Result<()> {
        let index = self.load_index()?;
        self.offset = index.end_offset();
        tracing::debug!(
            path = %self.data_path.display(),
            keys = index.len(),
            offset = self.offset,
            "restored write offset"
        );
        Ok(())
    }

    pub(crate) fn load_index(&self) -> Result<KeyIndex> {
        KeyIndex::load(&self.index_path)
    }

    pub(crate) fn data_len(&self) -> Result<u64> {
        match std::fs::metadata(&self.data_path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(err) => Err(PackError::io_at(err, &self.data_path)),
        }
    }

    /// Decodes every record of one indexed block. The records must tile the block exactly.
    pub(crate) fn read_block(&self, entry: &IndexEntry) -> Result<Vec<StoredRecord>> {
        if entry.length == 0 {
            return Ok(Vec::new());
        }
        let file = match File::open(&self.data_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(PackError::corrupt(entry.offset, "data file is missing"));
            }
            Err(err) => return Err(PackError::io_at(err, &self.data_path)),
        };
        let file_len = file.metadata()?.len();
        if file_len < entry.end() {
            return Err(PackError::corrupt(
                entry.offset,
                format!(
                    "data file ends at {file_len} but key '{}' spans to {}",
                    entry.key,
                    entry.end()
                ),
            ));
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(entry.offset))?;
        let mut records = Vec::new();
        let mut pos = entry.offset;
        while pos < entry.end() {
            let (record, length) = self.codec.decode(&mut reader, pos, entry.end() - pos)?;
            records.push(StoredRecord {
                offset: pos,
                length,
                record,
            });
            pos += length;
        }
        tracing::debug!(
            key = %entry.key,
            offset = entry.offset,
            records = records.len(),
            "read block"
        );
        Ok(records)
    }
}

fn index_path_for(data_path: &Path) -> PathBuf {
    let mut name = OsString::from(data_path.as_os_str());
    name.push(INDEX_SUFFIX);
    PathBuf::from(name)
}
