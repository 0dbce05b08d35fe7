use crate::model::{LookupParameter, Parameter, ParameterCollection};

/// What a save reads from.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Parameter(&'a Parameter),
    Lookup(&'a LookupParameter),
    Collection(&'a ParameterCollection),
}

impl Target<'_> {
    /// Key used when the caller does not name one.
    #[must_use]
    pub fn default_key(&self) -> &str {
        match self {
            Self::Parameter(param) => param.name(),
            Self::Lookup(table) => table.name(),
            Self::Collection(model) => model.default_key(),
        }
    }
}

impl<'a> From<&'a Parameter> for Target<'a> {
    fn from(param: &'a Parameter) -> Self {
        Self::Parameter(param)
    }
}

impl<'a> From<&'a LookupParameter> for Target<'a> {
    fn from(table: &'a LookupParameter) -> Self {
        Self::Lookup(table)
    }
}

impl<'a> From<&'a ParameterCollection> for Target<'a> {
    fn from(model: &'a ParameterCollection) -> Self {
        Self::Collection(model)
    }
}

/// What a populate writes into.
#[derive(Debug)]
pub enum TargetMut<'a> {
    Parameter(&'a mut Parameter),
    Lookup(&'a mut LookupParameter),
    Collection(&'a mut ParameterCollection),
}

impl TargetMut<'_> {
    #[must_use]
    pub fn default_key(&self) -> &str {
        match self {
            Self::Parameter(param) => param.name(),
            Self::Lookup(table) => table.name(),
            Self::Collection(model) => model.default_key(),
        }
    }
}

impl<'a> From<&'a mut Parameter> for TargetMut<'a> {
    fn from(param: &'a mut Parameter) -> Self {
        Self::Parameter(param)
    }
}

impl<'a> From<&'a mut LookupParameter> for TargetMut<'a> {
    fn from(table: &'a mut LookupParameter) -> Self {
        Self::Lookup(table)
    }
}

impl<'a> From<&'a mut ParameterCollection> for TargetMut<'a> {
    fn from(model: &'a mut ParameterCollection) -> Self {
        Self::Collection(model)
    }
}
