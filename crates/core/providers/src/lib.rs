#[macro_use]
extern crate serde;

#[macro_use]
extern crate async_trait;

#[macro_use]
extern crate log;

#[macro_use]
extern crate sso_result;

pub mod keys;
mod metrics;
mod provider;
mod reference;
mod session;
mod singleflight;

pub use keys::{CallKey, Operation};
pub use metrics::*;
pub use provider::*;
pub use reference::*;
pub use session::*;
pub use singleflight::*;
