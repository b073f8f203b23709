//! Renderer pipe protocol.
//!
//! One command line is written per exchange. The renderer answers with any
//! number of informational lines followed by exactly one terminal line:
//! `OK ...` on success or `ERROR: <message>` on failure. Graph commands print
//! the produced image size as `WIDTHxHEIGHT` before the terminal line.

use tracing::debug;
use crate::core::PixelSize;
use crate::utils::{GeneratorError, GeneratorResult};

const OK_MARKER: &str = "OK";
const ERROR_MARKER: &str = "ERROR:";

/// Parsed answer to one command.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererResponse {
    Success {
        pixel_size: Option<PixelSize>,
        /// Informational lines preceding the terminal line
        output: Vec<String>,
    },
    Failure {
        message: String,
        output: Vec<String>,
    },
}

/// Collects output lines until a terminal line completes a response.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    lines: Vec<String>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one output line; returns the response once it is complete.
    pub fn push_line(&mut self, line: &str) -> Option<RendererResponse> {
        let line = line.trim_end_matches(['\r', '\n']);

        if is_ok_line(line) {
            let output = std::mem::take(&mut self.lines);
            let pixel_size = output.iter().rev().find_map(|l| l.parse::<PixelSize>().ok());
            debug!("Renderer response complete: OK ({} output lines)", output.len());
            return Some(RendererResponse::Success { pixel_size, output });
        }

        if let Some(rest) = line.strip_prefix(ERROR_MARKER) {
            let message = rest.trim().to_string();
            let output = std::mem::take(&mut self.lines);
            debug!("Renderer response complete: ERROR {}", message);
            return Some(RendererResponse::Failure { message, output });
        }

        if !line.trim().is_empty() {
            self.lines.push(line.to_string());
        }
        None
    }

    /// Output collected since the last terminal line.
    pub fn buffered(&self) -> String {
        self.lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn is_ok_line(line: &str) -> bool {
    line == OK_MARKER || line.starts_with("OK ")
}

/// Quotes an argument for the renderer's pipe-mode argument splitting.
///
/// rrdtool toggles quoting on `'` and `"` and knows no escapes, so an
/// argument holding both quote characters cannot be expressed.
pub fn quote_argument(arg: &str) -> GeneratorResult<String> {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"', '\'']) {
        return Ok(arg.to_string());
    }
    if !arg.contains('\'') {
        Ok(format!("'{arg}'"))
    } else if !arg.contains('"') {
        Ok(format!("\"{arg}\""))
    } else {
        Err(GeneratorError::render(format!(
            "Argument cannot be passed to the renderer: {arg}"
        )))
    }
}
