//! Everything between the generator and the renderer process.

pub mod process;
pub mod protocol;
mod queue;
mod supervisor;

pub use process::{LaunchSpec, ProcessEvent, RendererLauncher, RendererProcess, TokioLauncher};
pub use protocol::{RendererResponse, ResponseAccumulator};
pub use queue::{CommandQueue, Continuation, PendingCommand, RenderOutput, Resolved};
pub use supervisor::{ProcessSupervisor, SupervisorSignal, SupervisorState};
