//! Async command surface for UI bindings and the CLI.
//!
//! - [`spawn_generator`]: start the task that owns a generator
//! - [`GeneratorHandle`]: the control API as async calls

mod service;

pub use service::{GeneratorHandle, GeneratorStatus, spawn_generator};
