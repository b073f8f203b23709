//! Core generator types.
//!
//! - [`GeneratorConfig`]: renderer, cache and report settings
//! - [`ImageTypeDescriptor`]: a registered plot type
//! - [`ImageRequest`] / [`ReportRequest`]: control API arguments
//! - [`GeneratorEvent`]: notifications for the UI binding
//! - [`ProgressTracker`]: progress of the current burst

mod config;
mod events;
mod progress;
mod types;

pub use config::GeneratorConfig;
pub use events::{EventSink, GeneratorEvent};
pub use progress::{IDLE_PROGRESS, ProgressTracker};
pub use types::{Caller, ImageRequest, ImageTypeDescriptor, LineColors, PixelSize, ReportRequest};
