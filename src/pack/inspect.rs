use serde::Serialize;

use super::Pack;
use crate::{
    error::{PackError, Result},
    io::{IndexEntry, RecordSummary},
};

/// Per-key result of [`Pack::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyReport {
    pub key: String,
    pub offset: u64,
    pub length: u64,
    pub records: usize,
}

/// Whole-store consistency report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub keys: Vec<KeyReport>,
    pub indexed_bytes: u64,
    pub data_bytes: u64,
    /// Bytes past the last indexed span, left by an interrupted save.
    pub orphaned_bytes: u64,
}

impl VerifyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphaned_bytes == 0
    }
}

impl Pack {
    /// Index entries in write order.
    pub fn keys(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.load_index()?.entries().to_vec())
    }

    /// Shape-level summaries of every record saved under `key`.
    pub fn records(&self, key: &str) -> Result<Vec<RecordSummary>> {
        let index = self.load_index()?;
        let entry = index.lookup(key).ok_or_else(|| PackError::KeyNotFound {
            key: key.to_string(),
        })?;
        Ok(self
            .read_block(entry)?
            .iter()
            .map(|stored| stored.record.summary(stored.offset, stored.length))
            .collect())
    }

    /// Decodes every indexed block, failing on the first corrupt record.
    pub fn verify(&self) -> Result<VerifyReport> {
        let index = self.load_index()?;
        let data_bytes = self.data_len()?;
        let mut report = VerifyReport {
            data_bytes,
            indexed_bytes: index.end_offset(),
            ..VerifyReport::default()
        };
        for entry in index.entries() {
            let records = self.read_block(entry)?;
            report.keys.push(KeyReport {
                key: entry.key.clone(),
                offset: entry.offset,
                length: entry.length,
                records: records.len(),
            });
        }
        report.orphaned_bytes = data_bytes.saturating_sub(report.indexed_bytes);
        if report.orphaned_bytes > 0 {
            tracing::warn!(
                path = %self.data_path.display(),
                orphaned = report.orphaned_bytes,
                "store holds unindexed trailing bytes"
            );
        }
        Ok(report)
    }
}
