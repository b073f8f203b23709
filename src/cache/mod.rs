//! Content-addressed cache of rendered images.

mod key;
mod store;

pub use key::{CacheKey, RenderStamp};
pub use store::{CachedArtifact, ImageCache, Lookup};
