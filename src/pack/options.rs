use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::filter::{AcceptAll, NameFilter, PatternFilter};

/// Options for [`Pack::save`](super::Pack::save).
#[derive(Clone)]
pub struct SaveOptions {
    /// Key to save under. Defaults to the collection namespace or the entity name.
    pub key: Option<String>,
    /// Which collection entities to write. Single-entity saves ignore it.
    pub filter: Arc<dyn NameFilter>,
    /// Append to the existing store. When false the store is recreated from scratch.
    pub append: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            key: None,
            filter: Arc::new(AcceptAll),
            append: true,
        }
    }
}

impl SaveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl NameFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Compiles `patterns` into a [`PatternFilter`].
    pub fn with_patterns<I, S>(self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.with_filter(PatternFilter::new(patterns)?))
    }

    #[must_use]
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("key", &self.key)
            .field("append", &self.append)
            .finish_non_exhaustive()
    }
}

/// Options for [`Pack::populate`](super::Pack::populate).
#[derive(Clone)]
pub struct PopulateOptions {
    /// Key to read. Defaults like [`SaveOptions::key`].
    pub key: Option<String>,
    /// Which stored collection entities to apply. Single-entity populates ignore it.
    pub filter: Arc<dyn NameFilter>,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            key: None,
            filter: Arc::new(AcceptAll),
        }
    }
}

impl PopulateOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl NameFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_patterns<I, S>(self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.with_filter(PatternFilter::new(patterns)?))
    }
}

impl fmt::Debug for PopulateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulateOptions")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
