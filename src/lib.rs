// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod processing;
pub mod cache;
pub mod generator;
pub mod commands;

// Public exports for external consumers
pub use crate::core::{
    Caller, GeneratorConfig, GeneratorEvent, IDLE_PROGRESS, ImageRequest, ImageTypeDescriptor, LineColors,
    PixelSize, ReportRequest,
};
pub use generator::Generator;
pub use processing::{
    LaunchSpec, ProcessEvent, RendererLauncher, RendererProcess, SupervisorState, TokioLauncher,
};
pub use utils::{GeneratorError, GeneratorResult};
pub use commands::*;

// This library file is the public API of the crate.
// The command line entry point is in main.rs.
