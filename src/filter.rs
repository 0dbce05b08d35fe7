//! Name filters deciding which entities a save writes and a populate applies.

use std::fmt;

use regex::Regex;

use crate::error::{PackError, Result};

/// Predicate over a fully-qualified entity name.
pub trait NameFilter: Send + Sync {
    fn admits(&self, full_name: &str) -> bool;
}

impl<F> NameFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn admits(&self, full_name: &str) -> bool {
        self(full_name)
    }
}

/// Admits every name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl NameFilter for AcceptAll {
    fn admits(&self, _full_name: &str) -> bool {
        true
    }
}

/// Admits a name when any of its regular expressions matches somewhere in it.
///
/// An empty pattern list admits everything.
#[derive(Clone, Default)]
pub struct PatternFilter {
    patterns: Vec<Regex>,
}

impl PatternFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| PackError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl NameFilter for PatternFilter {
    fn admits(&self, full_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(full_name))
    }
}

impl fmt::Debug for PatternFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.patterns.iter().map(Regex::as_str))
            .finish()
    }
}
