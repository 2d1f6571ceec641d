#[macro_use]
extern crate async_trait;

#[macro_use]
extern crate log;

mod error;
mod pipeline;
mod validators;

pub use error::*;
pub use pipeline::*;
pub use validators::*;
