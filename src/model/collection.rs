use crate::constants::{NAMESPACE_SEPARATOR, ROOT_KEY};
use crate::error::{PackError, Result};

use super::parameter::{LookupParameter, Parameter};

/// One entity held by a [`ParameterCollection`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Parameter(Parameter),
    Lookup(LookupParameter),
}

impl Entity {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter(param) => param.name(),
            Self::Lookup(table) => table.name(),
        }
    }

    #[must_use]
    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Self::Parameter(param) => Some(param),
            Self::Lookup(_) => None,
        }
    }

    #[must_use]
    pub fn as_lookup(&self) -> Option<&LookupParameter> {
        match self {
            Self::Lookup(table) => Some(table),
            Self::Parameter(_) => None,
        }
    }
}

impl From<Parameter> for Entity {
    fn from(param: Parameter) -> Self {
        Self::Parameter(param)
    }
}

impl From<LookupParameter> for Entity {
    fn from(table: LookupParameter) -> Self {
        Self::Lookup(table)
    }
}

/// Ordered set of named entities under a namespace.
///
/// Names are local to the collection; [`ParameterCollection::full_name`] prefixes the namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCollection {
    namespace: String,
    entities: Vec<Entity>,
}

impl ParameterCollection {
    /// Creates an empty collection. Trailing separators are trimmed, so `/model/` and `/model`
    /// name the same namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let trimmed = namespace.trim_end_matches(NAMESPACE_SEPARATOR).to_string();
        Self {
            namespace: trimmed,
            entities: Vec::new(),
        }
    }

    /// Collection living in the root namespace.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn full_name(&self, local: &str) -> String {
        if self.namespace.is_empty() {
            local.to_string()
        } else {
            format!("{}{NAMESPACE_SEPARATOR}{local}", self.namespace)
        }
    }

    /// Key under which the whole collection is saved when the caller gives none.
    #[must_use]
    pub fn default_key(&self) -> &str {
        if self.namespace.is_empty() {
            ROOT_KEY
        } else {
            &self.namespace
        }
    }

    pub fn insert(&mut self, entity: impl Into<Entity>) -> Result<()> {
        let entity = entity.into();
        if self.get(entity.name()).is_some() {
            return Err(PackError::DuplicateName {
                name: entity.name().to_string(),
            });
        }
        self.entities.push(entity);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.name() == name)
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.get(name).and_then(Entity::as_parameter)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&LookupParameter> {
        self.get(name).and_then(Entity::as_lookup)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
