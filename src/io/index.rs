//! Text side index mapping keys to spans of the data file.
//!
//! One line per saved key, in write order:
//!
//! ```text
//! <key> <offset> <length>\n
//! ```
//!
//! The line is split from the right, so keys may contain spaces. A final line that lacks its
//! newline was torn by an interrupted save; it is ignored and cut off by the next append.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{PackError, Result};

/// Location of one saved key's block within the data file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u64,
    pub length: u64,
}

impl IndexEntry {
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// In-memory copy of the index file.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    entries: Vec<IndexEntry>,
    by_key: HashMap<String, usize>,
    // Length of the file prefix made of complete lines.
    valid_len: u64,
    file_len: u64,
}

impl KeyIndex {
    /// Parses the index at `path`. A missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(PackError::io_at(err, path)),
        };
        let mut index = Self::parse(&raw)?;
        index.file_len = raw.len() as u64;
        if index.valid_len < index.file_len {
            tracing::warn!(
                path = %path.display(),
                dropped = index.file_len - index.valid_len,
                "ignoring torn trailing index line"
            );
        }
        Ok(index)
    }

    fn parse(raw: &[u8]) -> Result<Self> {
        let mut index = Self::default();
        let mut pos = 0usize;
        while let Some(nl) = raw[pos..].iter().position(|byte| *byte == b'\n') {
            let line_start = pos as u64;
            let line = std::str::from_utf8(&raw[pos..pos + nl])
                .map_err(|_| corrupt_line(line_start, "index line is not valid UTF-8"))?;
            let line = line.strip_suffix('\r').unwrap_or(line);
            pos += nl + 1;
            if line.is_empty() {
                continue;
            }
            let entry = parse_line(line).ok_or_else(|| corrupt_line(line_start, "malformed index line"))?;
            index.push(entry, line_start)?;
        }
        index.valid_len = pos as u64;
        Ok(index)
    }

    fn push(&mut self, entry: IndexEntry, at: u64) -> Result<()> {
        if self.by_key.contains_key(&entry.key) {
            return Err(corrupt_line(at, "index lists a key twice"));
        }
        if entry.offset < self.end_offset() {
            return Err(corrupt_line(at, "index spans overlap or are out of order"));
        }
        if entry.offset.checked_add(entry.length).is_none() {
            return Err(corrupt_line(at, "index span overflows"));
        }
        self.by_key.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&IndexEntry> {
        self.by_key.get(key).map(|idx| &self.entries[*idx])
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Entries in write order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End of the last indexed span; the next block is written here.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.entries.last().map_or(0, IndexEntry::end)
    }

    /// Appends one entry to the index file and then to the in-memory table.
    pub fn append(&mut self, path: &Path, entry: IndexEntry, sync: bool) -> Result<()> {
        validate_key(&entry.key)?;
        if self.contains(&entry.key) {
            return Err(PackError::DuplicateKey { key: entry.key });
        }
        if entry.offset < self.end_offset() {
            return Err(PackError::corrupt(
                entry.offset,
                "new index span starts before the end of the previous one",
            ));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| PackError::io_at(err, path))?;
        if self.valid_len < self.file_len {
            file.set_len(self.valid_len)?;
        }
        let line = format!("{} {} {}\n", entry.key, entry.offset, entry.length);
        file.write_all(line.as_bytes())?;
        if sync {
            file.sync_data()?;
        }
        self.valid_len += line.len() as u64;
        self.file_len = self.valid_len;

        let at = self.valid_len - line.len() as u64;
        self.push(entry, at)
    }
}

/// Keys are written verbatim on a single line, so they must be non-empty and newline-free.
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key must not be empty"
    } else if key.contains(['\n', '\r']) {
        "key must not contain line breaks"
    } else if key.trim() != key {
        "key must not start or end with whitespace"
    } else {
        return Ok(());
    };
    Err(PackError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

fn parse_line(line: &str) -> Option<IndexEntry> {
    let mut parts = line.rsplitn(3, ' ');
    let length = parts.next()?.parse().ok()?;
    let offset = parts.next()?.parse().ok()?;
    let key = parts.next()?;
    if key.is_empty() {
        return None;
    }
    Some(IndexEntry {
        key: key.to_string(),
        offset,
        length,
    })
}

fn corrupt_line(at: u64, reason: &'static str) -> PackError {
    PackError::corrupt(at, format!("index byte {at}: {reason}"))
}
