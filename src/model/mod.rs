//! In-memory parameter objects read on save and filled on populate.

mod collection;
mod parameter;
mod tensor;

pub use collection::{Entity, ParameterCollection};
pub use parameter::{LookupParameter, Parameter};
pub use tensor::{Shape, Tensor};

pub(crate) use tensor::checked_product;
