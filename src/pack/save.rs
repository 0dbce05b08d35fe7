use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{Pack, SaveOptions, Target};
use crate::{
    error::{PackError, Result},
    filter::NameFilter,
    io::{IndexEntry, KeyIndex, RecordView, index::validate_key},
    model::Entity,
};

impl Pack {
    /// Saves a parameter, lookup parameter or whole collection under one key.
    ///
    /// The records land in one contiguous block at the current offset; the index line for the
    /// key is written only after the block is fully on disk.
    pub fn save<'a>(&mut self, target: impl Into<Target<'a>>, opts: &SaveOptions) -> Result<IndexEntry> {
        let target = target.into();
        let key = opts
            .key
            .clone()
            .unwrap_or_else(|| target.default_key().to_string());
        validate_key(&key)?;

        let mut index = self.load_index()?;
        if index.contains(&key) {
            return Err(PackError::DuplicateKey { key });
        }
        if !opts.append {
            return self.replace_store(key, target, opts.filter.as_ref());
        }

        let start = index.end_offset();
        if start != self.offset {
            tracing::debug!(
                cached = self.offset,
                indexed = start,
                "write offset resynchronised from index"
            );
        }
        self.offset = start;

        let file = self.open_for_append(start)?;
        let length = match self.write_block(&file, start, target, opts.filter.as_ref()) {
            Ok(length) => length,
            Err(err) => {
                rollback(&file, start);
                return Err(err);
            }
        };

        let entry = IndexEntry {
            key,
            offset: start,
            length,
        };
        if let Err(err) = index.append(&self.index_path, entry.clone(), self.config.sync_writes) {
            rollback(&file, start);
            return Err(err);
        }
        self.offset = entry.end();
        tracing::debug!(
            key = %entry.key,
            offset = entry.offset,
            length = entry.length,
            "saved block"
        );
        Ok(entry)
    }

    /// Opens the data file positioned at `start`, dropping bytes no index entry accounts for.
    fn open_for_append(&self, start: u64) -> Result<File> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.data_path)
            .map_err(|err| PackError::io_at(err, &self.data_path))?;
        let len = file.metadata()?.len();
        if len < start {
            return Err(PackError::corrupt(
                len,
                format!("data file ends at {len} but the index expects {start} bytes"),
            ));
        }
        if len > start {
            tracing::warn!(
                path = %self.data_path.display(),
                orphaned = len - start,
                "truncating unindexed bytes left by an interrupted save"
            );
            file.set_len(start)?;
        }
        file.seek(SeekFrom::Start(start))?;
        Ok(file)
    }

    fn write_block(
        &self,
        file: &File,
        start: u64,
        target: Target<'_>,
        filter: &dyn NameFilter,
    ) -> Result<u64> {
        let mut writer = BufWriter::new(file);
        let mut length = 0u64;
        let mut write = |view: RecordView<'_>| -> Result<()> {
            let written = self.codec.encode(&mut writer, view)?;
            tracing::trace!(name = view.name, offset = start + length, written, "encoded record");
            length += written;
            Ok(())
        };

        match target {
            Target::Parameter(param) => write(param.into())?,
            Target::Lookup(table) => write(table.into())?,
            Target::Collection(model) => {
                for entity in model.iter() {
                    if !filter.admits(&model.full_name(entity.name())) {
                        tracing::trace!(name = entity.name(), "filtered out on save");
                        continue;
                    }
                    match entity {
                        Entity::Parameter(param) => write(param.into())?,
                        Entity::Lookup(table) => write(table.into())?,
                    }
                }
            }
        }

        writer.flush()?;
        drop(writer);
        if self.config.sync_writes {
            file.sync_data()?;
        }
        Ok(length)
    }

    /// Writes `target` as the only key of a fresh store. The new files are built next to the
    /// old ones and renamed over them once complete, so a failed save leaves the old store intact.
    fn replace_store(
        &mut self,
        key: String,
        target: Target<'_>,
        filter: &dyn NameFilter,
    ) -> Result<IndexEntry> {
        let data_tmp = tmp_path_for(&self.data_path);
        let index_tmp = tmp_path_for(&self.index_path);
        match self.write_replacement(&data_tmp, &index_tmp, key, target, filter) {
            Ok(entry) => {
                self.offset = entry.end();
                tracing::info!(
                    path = %self.data_path.display(),
                    key = %entry.key,
                    length = entry.length,
                    "recreated store"
                );
                Ok(entry)
            }
            Err(err) => {
                discard(&data_tmp);
                discard(&index_tmp);
                Err(err)
            }
        }
    }

    fn write_replacement(
        &self,
        data_tmp: &Path,
        index_tmp: &Path,
        key: String,
        target: Target<'_>,
        filter: &dyn NameFilter,
    ) -> Result<IndexEntry> {
        let file = File::create(data_tmp).map_err(|err| PackError::io_at(err, data_tmp))?;
        let length = self.write_block(&file, 0, target, filter)?;
        drop(file);

        File::create(index_tmp).map_err(|err| PackError::io_at(err, index_tmp))?;
        let entry = IndexEntry {
            key,
            offset: 0,
            length,
        };
        KeyIndex::default().append(index_tmp, entry.clone(), self.config.sync_writes)?;

        // Data first: a crash between the renames leaves old spans over new bytes, which fail
        // their checksums instead of loading.
        std::fs::rename(data_tmp, &self.data_path)
            .map_err(|err| PackError::io_at(err, &self.data_path))?;
        std::fs::rename(index_tmp, &self.index_path)
            .map_err(|err| PackError::io_at(err, &self.index_path))?;
        Ok(entry)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(%err, path = %path.display(), "failed to remove temporary file"),
    }
}

// Best effort: the index never references these bytes, and the next append truncates them anyway.
fn rollback(file: &File, start: u64) {
    if let Err(err) = file.set_len(start) {
        tracing::warn!(%err, offset = start, "failed to roll back partial block");
    }
}
