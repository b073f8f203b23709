//! Command template substitution.
//!
//! Templates are renderer command lines with `{name}` placeholders; `{{` and
//! `}}` produce literal braces. Unknown placeholders are an error so typos in
//! a registration surface on first use instead of reaching the renderer.
//! `{full_width}` and `{full_height}` carry the size of the type's last
//! full-size render.

use std::collections::BTreeMap;
use std::path::Path;
use crate::core::{LineColors, PixelSize};
use crate::processing::protocol::quote_argument;
use crate::utils::{GeneratorError, GeneratorResult};

/// Values available to a template.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub file: &'a Path,
    pub from: f64,
    pub duration: f64,
    pub size: PixelSize,
    pub full_size: bool,
    /// Size of the last full-size render of this type, if any
    pub full_image_size: Option<PixelSize>,
    pub fonts: &'a BTreeMap<String, u32>,
    pub colors: &'a LineColors,
    pub image_format: &'a str,
}

impl RenderContext<'_> {
    fn value(&self, name: &str) -> Option<GeneratorResult<String>> {
        let full = self.full_image_size.unwrap_or(self.size);
        let value = match name {
            "file" => return Some(quote_argument(&self.file.to_string_lossy())),
            "from" => self.from.to_string(),
            "to" => (self.from + self.duration).to_string(),
            "duration" => self.duration.to_string(),
            "width" => self.size.width.to_string(),
            "height" => self.size.height.to_string(),
            "full_width" => full.width.to_string(),
            "full_height" => full.height.to_string(),
            "full_size_mode" => {
                if self.full_size { "--full-size-mode".to_string() } else { String::new() }
            }
            "fonts" => self
                .fonts
                .iter()
                .map(|(tag, size)| format!("--font {tag}:{size}"))
                .collect::<Vec<_>>()
                .join(" "),
            "color_main" => self.colors.main.clone(),
            "color_secondary" => self.colors.secondary.clone(),
            "format" => self.image_format.to_ascii_uppercase(),
            _ => return None,
        };
        Some(Ok(value))
    }
}

/// Expands `template` against `ctx`, collapsing runs of blanks left by empty values.
pub fn render_command(template: &str, ctx: &RenderContext<'_>) -> GeneratorResult<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(GeneratorError::template(format!(
                                "Unterminated placeholder in: {template}"
                            )));
                        }
                    }
                }
                let value = ctx.value(name.trim()).ok_or_else(|| {
                    GeneratorError::template(format!("Unknown placeholder {{{name}}}"))
                })??;
                out.push_str(&value);
            }
            '}' => {
                return Err(GeneratorError::template(format!("Stray '}}' in: {template}")));
            }
            other => out.push(other),
        }
    }

    Ok(out.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Checks a template's placeholders without rendering it for real.
pub fn validate_template(template: &str) -> GeneratorResult<()> {
    let fonts = BTreeMap::new();
    let colors = LineColors::default();
    let ctx = RenderContext {
        file: Path::new("validate.png"),
        from: 0.0,
        duration: 1.0,
        size: PixelSize::new(1, 1),
        full_size: false,
        full_image_size: None,
        fonts: &fonts,
        colors: &colors,
        image_format: "png",
    };
    render_command(template, &ctx).map(|_| ())
}
