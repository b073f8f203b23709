//! Core types for image types, requests and rendered sizes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::utils::{GeneratorError, GeneratorResult};

/// Pixel dimensions of a requested or rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for PixelSize {
    type Err = GeneratorError;

    /// Parses the `WIDTHxHEIGHT` form the renderer prints after a graph.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once('x')
            .ok_or_else(|| GeneratorError::render(format!("Not a pixel size: {s}")))?;
        let width = w
            .parse()
            .map_err(|_| GeneratorError::render(format!("Bad width in {s}")))?;
        let height = h
            .parse()
            .map_err(|_| GeneratorError::render(format!("Bad height in {s}")))?;
        Ok(Self { width, height })
    }
}

/// Identifier of the UI element that asked for an image.
pub type Caller = i64;

/// A registered plot type.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTypeDescriptor {
    pub type_name: String,
    /// Full-size types treat the requested size as the whole canvas
    pub is_full_size: bool,
    pub command_template: String,
    /// Font tag to size, applied on top of the generator-wide fonts
    pub font_size_overrides: BTreeMap<String, u32>,
    /// Size reported by the renderer for the last full-size render of this type
    pub full_image_pixel_size: Option<PixelSize>,
    /// Registration this descriptor belongs to, assigned by the generator
    pub generation: u64,
}

/// JSON form accepted by [`ImageTypeDescriptor::from_registration`].
#[derive(Debug, Deserialize)]
struct Registration {
    command: String,
    #[serde(default)]
    full_size: bool,
    #[serde(default)]
    fonts: BTreeMap<String, u32>,
}

impl ImageTypeDescriptor {
    pub fn new(type_name: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            is_full_size: false,
            command_template: command_template.into(),
            font_size_overrides: BTreeMap::new(),
            full_image_pixel_size: None,
            generation: 0,
        }
    }

    /// Builds a descriptor from either a bare template or a JSON registration
    /// object `{"command": ..., "full_size": ..., "fonts": {...}}`.
    pub fn from_registration(type_name: &str, command_json: &str) -> GeneratorResult<Self> {
        if type_name.trim().is_empty() {
            return Err(GeneratorError::template("Image type name is empty"));
        }

        let trimmed = command_json.trim();
        let descriptor = match trimmed.chars().next() {
            Some('{') => {
                let reg: Registration = serde_json::from_str(trimmed)?;
                Self {
                    type_name: type_name.to_string(),
                    is_full_size: reg.full_size,
                    command_template: reg.command,
                    font_size_overrides: reg.fonts,
                    full_image_pixel_size: None,
                    generation: 0,
                }
            }
            Some('"') => {
                let command: String = serde_json::from_str(trimmed)?;
                Self::new(type_name, command)
            }
            _ => Self::new(type_name, trimmed),
        };

        if descriptor.command_template.trim().is_empty() {
            return Err(GeneratorError::template(format!(
                "Empty command for image type {type_name}"
            )));
        }
        Ok(descriptor)
    }
}

/// Arguments of a single `get_image` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub caller: Caller,
    pub type_name: String,
    /// Start of the plotted range, seconds since the epoch
    pub from: f64,
    /// Length of the plotted range in seconds
    pub duration: f64,
    pub size: PixelSize,
    pub full_size: bool,
    /// Image the caller is currently showing, used to skip redundant notifications
    pub current_fname: String,
}

/// Arguments of a `make_report` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportRequest {
    pub from: f64,
    pub duration: f64,
    pub size: PixelSize,
}

/// Colours substituted into single-line plot templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineColors {
    pub main: String,
    pub secondary: String,
}

impl LineColors {
    pub const DEFAULT_MAIN: &'static str = "#0000FF";
    pub const DEFAULT_SECONDARY: &'static str = "#FF0000";

    pub fn new(main: &str, secondary: &str) -> GeneratorResult<Self> {
        Ok(Self {
            main: normalize_color(main)?,
            secondary: normalize_color(secondary)?,
        })
    }
}

impl Default for LineColors {
    fn default() -> Self {
        Self {
            main: Self::DEFAULT_MAIN.to_string(),
            secondary: Self::DEFAULT_SECONDARY.to_string(),
        }
    }
}

/// Accepts `#RRGGBB` or `#RRGGBBAA` and returns it upper-cased.
fn normalize_color(value: &str) -> GeneratorResult<String> {
    let hex = value
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| GeneratorError::config(format!("Colour must start with '#': {value}")))?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GeneratorError::config(format!("Invalid colour: {value}")));
    }
    Ok(format!("#{}", hex.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_parses_renderer_output() {
        assert_eq!("481x155".parse::<PixelSize>().unwrap(), PixelSize::new(481, 155));
        assert!("481 by 155".parse::<PixelSize>().is_err());
        assert!("x155".parse::<PixelSize>().is_err());
    }

    #[test]
    fn registration_accepts_plain_template() {
        let d = ImageTypeDescriptor::from_registration("cpu", "graph {file} --start {from}").unwrap();
        assert_eq!(d.command_template, "graph {file} --start {from}");
        assert!(!d.is_full_size);
        assert!(d.font_size_overrides.is_empty());
    }

    #[test]
    fn registration_accepts_json_object() {
        let json = r#"{"command": "graph {file}", "full_size": true, "fonts": {"TITLE": 12}}"#;
        let d = ImageTypeDescriptor::from_registration("mem", json).unwrap();
        assert!(d.is_full_size);
        assert_eq!(d.font_size_overrides.get("TITLE"), Some(&12));
    }

    #[test]
    fn registration_rejects_empty_command() {
        assert!(ImageTypeDescriptor::from_registration("cpu", "  ").is_err());
        assert!(ImageTypeDescriptor::from_registration("cpu", r#"{"command": ""}"#).is_err());
        assert!(ImageTypeDescriptor::from_registration("", "graph").is_err());
    }

    #[test]
    fn colors_are_validated() {
        let c = LineColors::new("#00ff00", "#123456aa").unwrap();
        assert_eq!(c.main, "#00FF00");
        assert_eq!(c.secondary, "#123456AA");
        assert!(LineColors::new("green", "#000000").is_err());
        assert!(LineColors::new("#00ff0", "#000000").is_err());
    }
}
