use std::fmt;
use crate::core::{ImageRequest, PixelSize};

/// Identity of a logical image request.
///
/// Time values are kept as their bit patterns so that the key is hashable and
/// two requests with identical arguments always produce identical keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    type_name: String,
    from_bits: u64,
    duration_bits: u64,
    size: PixelSize,
    full_size: bool,
}

impl CacheKey {
    pub fn new(type_name: &str, from: f64, duration: f64, size: PixelSize, full_size: bool) -> Self {
        Self {
            type_name: type_name.to_string(),
            from_bits: canonical_bits(from),
            duration_bits: canonical_bits(duration),
            size,
            full_size,
        }
    }

    pub fn for_request(request: &ImageRequest) -> Self {
        Self::new(
            &request.type_name,
            request.from,
            request.duration,
            request.size,
            request.full_size,
        )
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn from(&self) -> f64 {
        f64::from_bits(self.from_bits)
    }

    pub fn duration(&self) -> f64 {
        f64::from_bits(self.duration_bits)
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn full_size(&self) -> bool {
        self.full_size
    }
}

/// Settings an image is rendered under.
///
/// Only a render whose stamp still matches the generator's current one may
/// enter the cache or be joined by new callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderStamp {
    /// Registration of the image type
    pub type_generation: u64,
    /// Bumped on every font or colour change
    pub settings_epoch: u64,
}

// -0.0 and 0.0 describe the same instant
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 { 0.0f64.to_bits() } else { value.to_bits() }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.type_name,
            self.from(),
            self.duration(),
            self.size,
            if self.full_size { "full" } else { "thumb" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(type_name: &str, from: f64, size: PixelSize, full: bool) -> CacheKey {
        CacheKey::new(type_name, from, 3600.0, size, full)
    }

    #[test]
    fn identical_arguments_give_identical_keys() {
        let size = PixelSize::new(200, 100);
        assert_eq!(key("cpu", 0.0, size, false), key("cpu", 0.0, size, false));
        assert_eq!(key("cpu", -0.0, size, false), key("cpu", 0.0, size, false));
    }

    #[test]
    fn every_component_matters() {
        let size = PixelSize::new(200, 100);
        let keys: HashSet<_> = [
            key("cpu", 0.0, size, false),
            key("mem", 0.0, size, false),
            key("cpu", 1.0, size, false),
            key("cpu", 0.0, PixelSize::new(201, 100), false),
            key("cpu", 0.0, size, true),
            CacheKey::new("cpu", 0.0, 7200.0, size, false),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn display_is_readable() {
        let k = key("cpu", 1700000000.0, PixelSize::new(200, 100), true);
        assert_eq!(k.to_string(), "cpu|1700000000|3600|200x100|full");
    }
}
