//! Generator configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::utils::{GeneratorError, GeneratorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Renderer executable, looked up on PATH
    pub renderer_program: String,
    /// Arguments putting the renderer into pipe mode
    pub renderer_args: Vec<String>,
    /// Directory the renderer starts in
    pub working_directory: PathBuf,
    /// Seconds a rendered image stays in the cache
    pub cache_timeout_secs: f64,
    pub cache_check_interval_ms: u64,
    pub report_step_interval_ms: u64,
    /// Parent of the per-run report directories
    pub report_root: PathBuf,
    /// File extension of rendered images
    pub image_format: String,
    /// Where cached images live; a temporary directory when unset
    pub scratch_directory: Option<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            renderer_program: "rrdtool".to_string(),
            renderer_args: vec!["-".to_string()],
            working_directory: PathBuf::from("."),
            cache_timeout_secs: 120.0,
            cache_check_interval_ms: 10_000,
            report_step_interval_ms: 100,
            report_root: default_report_root(),
            image_format: "png".to_string(),
            scratch_directory: None,
        }
    }
}

fn default_report_root() -> PathBuf {
    dirs::document_dir()
        .map(|docs| docs.join("SystemDataScope"))
        .unwrap_or_else(|| PathBuf::from("reports"))
}

impl GeneratorConfig {
    /// Loads a JSON config; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> GeneratorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GeneratorError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> GeneratorResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| GeneratorError::config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GeneratorResult<()> {
        if self.renderer_program.trim().is_empty() {
            return Err(GeneratorError::config("renderer_program is empty"));
        }
        if Duration::try_from_secs_f64(self.cache_timeout_secs).is_err() {
            return Err(GeneratorError::config(format!(
                "cache_timeout_secs must be a non-negative representable duration, got {}",
                self.cache_timeout_secs
            )));
        }
        if self.report_step_interval_ms == 0 || self.cache_check_interval_ms == 0 {
            return Err(GeneratorError::config("Timer intervals must be positive"));
        }
        if self.image_format.is_empty() || self.image_format.contains(['/', '\\', '.']) {
            return Err(GeneratorError::config(format!(
                "Invalid image_format: {}",
                self.image_format
            )));
        }
        Ok(())
    }

    pub fn cache_timeout(&self) -> Duration {
        // validate() rejects anything that does not convert
        Duration::try_from_secs_f64(self.cache_timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn cache_check_interval(&self) -> Duration {
        Duration::from_millis(self.cache_check_interval_ms)
    }

    pub fn report_step_interval(&self) -> Duration {
        Duration::from_millis(self.report_step_interval_ms)
    }
}
