mod config;
mod service;

pub use config::CoalescionServiceConfig;
pub use service::{Coalesced, CoalescionService};
