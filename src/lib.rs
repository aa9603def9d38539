pub mod api;
pub mod datasources;
pub mod error;
pub mod position;
pub mod schedule;
pub mod scheduler;
pub mod settings;
mod signing;
pub mod sinks;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use error::{Result, TrackerError};
pub use position::Position;
