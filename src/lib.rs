//! Keyed, append-only persistence for model parameters.
//!
//! A store is a pair of files: `<name>` holds self-describing binary records and `<name>.meta`
//! maps each saved key to the span of records written under it. [`Pack`] saves a
//! [`Parameter`], a [`LookupParameter`] or a whole [`ParameterCollection`] under a key and later
//! populates objects back from it, optionally restricted by a [`NameFilter`].
//!
//! ```no_run
//! use parampack::{Pack, Parameter, ParameterCollection, PopulateOptions, SaveOptions};
//!
//! # fn main() -> parampack::Result<()> {
//! let mut model = ParameterCollection::new("/model");
//! model.insert(Parameter::from_values("w", &[2, 2], vec![1.0, 2.0, 3.0, 4.0])?)?;
//!
//! let mut pack = Pack::new("model.bin")?;
//! pack.save(&model, &SaveOptions::default())?;
//!
//! let mut restored = ParameterCollection::new("/model");
//! pack.populate(&mut restored, &PopulateOptions::default())?;
//! assert_eq!(restored, model);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod io;
pub mod model;
pub mod pack;

pub use config::PackConfig;
pub use error::{PackError, Result};
pub use filter::{AcceptAll, NameFilter, PatternFilter};
pub use io::{IndexEntry, RecordKind, RecordSummary};
pub use model::{Entity, LookupParameter, Parameter, ParameterCollection, Shape, Tensor};
pub use pack::{
    KeyReport, Pack, PopulateOptions, PopulateReport, SaveOptions, Target, TargetMut,
    VerifyReport,
};
