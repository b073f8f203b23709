pub mod error;
pub mod fs;

pub use error::{GeneratorError, GeneratorResult};
pub use fs::{create_unique_dir, file_exists, remove_file_quiet, sanitize_file_stem};
