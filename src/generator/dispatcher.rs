//! `get_image`: cache lookup, request coalescing and render completion.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CachedArtifact, Lookup, RenderStamp};
use crate::core::{Caller, GeneratorEvent, ImageRequest};
use crate::processing::{Continuation, RenderOutput};
use crate::utils::{GeneratorError, GeneratorResult, file_exists, remove_file_quiet};
use super::Generator;

impl Generator {
    /// Asks for an image. The caller hears back through `NewImage` (or
    /// `ImageFailed`) exactly once, unless the cached image is the one it
    /// already shows, in which case nothing is emitted.
    pub fn get_image(&mut self, request: ImageRequest) {
        let caller = request.caller;

        let Some(stamp) = self.current_stamp(&request.type_name) else {
            self.fail_request(caller, GeneratorError::UnregisteredType(request.type_name.clone()));
            return;
        };

        let key = CacheKey::for_request(&request);
        self.cache.evict_expired(Instant::now());
        match self.cache.lookup(&key) {
            Lookup::Hit(artifact) => {
                if artifact.file_path != Path::new(&request.current_fname) {
                    debug!("Cache hit for {} -> caller {}", key, caller);
                    self.events.emit(GeneratorEvent::NewImage {
                        caller,
                        path: artifact.file_path,
                    });
                } else {
                    debug!("Caller {} already shows {}", caller, key);
                }
                return;
            }
            Lookup::MissingFile(path) => {
                warn!("Cached image {} is gone, rendering {} again", path.display(), key);
            }
            Lookup::Miss => {}
        }

        // renders started under older settings finish on their own
        let render = (key, stamp);
        if let Some(waiting) = self.in_progress.get_mut(&render) {
            debug!("Joining in-progress render of {} for caller {}", render.0, caller);
            if !waiting.contains(&caller) {
                waiting.push(caller);
            }
            return;
        }

        if !self.supervisor.accepts_commands() {
            self.fail_request(caller, GeneratorError::NotRunning);
            return;
        }

        let path = self.next_scratch_path();
        let command = match self.image_command(&request, &path) {
            Ok(command) => command,
            Err(e) => {
                self.fail_request(caller, e);
                return;
            }
        };

        self.in_progress.insert(render.clone(), vec![caller]);
        self.progress.issue();
        let (key, stamp) = render;
        let continuation = Continuation::Image {
            key,
            stamp,
            path,
            full_size: request.full_size,
        };
        let (_, resolved) = self.queue.enqueue(command, continuation, &mut self.supervisor);
        self.handle_resolved(resolved);
        self.emit_progress();
    }

    fn image_command(&self, request: &ImageRequest, path: &Path) -> GeneratorResult<String> {
        let descriptor = self
            .image_types
            .get(&request.type_name)
            .ok_or_else(|| GeneratorError::UnregisteredType(request.type_name.clone()))?;
        self.build_command(
            descriptor,
            path,
            request.from,
            request.duration,
            request.size,
            request.full_size,
        )
    }

    fn next_scratch_path(&mut self) -> PathBuf {
        self.next_image_index += 1;
        self.scratch
            .path()
            .join(format!("img-{}.{}", self.next_image_index, self.config.image_format))
    }

    /// A request that never reached the renderer.
    fn fail_request(&mut self, caller: Caller, error: GeneratorError) {
        warn!("Image request from caller {} failed: {}", caller, error);
        self.events.emit(GeneratorEvent::RendererError(error.to_string()));
        self.events.emit(GeneratorEvent::ImageFailed {
            caller,
            error: error.to_string(),
        });
    }

    pub(super) fn finish_image(
        &mut self,
        key: CacheKey,
        stamp: RenderStamp,
        path: PathBuf,
        full_size: bool,
        outcome: GeneratorResult<RenderOutput>,
    ) {
        let callers = self.in_progress.remove(&(key.clone(), stamp)).unwrap_or_default();
        self.progress.complete();

        let outcome = outcome.and_then(|output| {
            if file_exists(&path) {
                Ok(output)
            } else {
                Err(GeneratorError::cache_io(path.clone(), "renderer produced no file"))
            }
        });

        match outcome {
            Ok(output) => {
                let now = Instant::now();
                if self.current_stamp(key.type_name()) == Some(stamp) {
                    if full_size {
                        self.record_full_size(key.type_name(), output.pixel_size);
                    }
                    self.cache.insert(CachedArtifact {
                        key: key.clone(),
                        file_path: path.clone(),
                        pixel_size: output.pixel_size,
                        created_at: now,
                    });
                } else {
                    // Type or settings changed while rendering: hand the file out, never serve it again
                    self.cache.adopt_orphan(path.clone(), now);
                }
                debug!("Rendered {} for {} caller(s)", key, callers.len());
                for caller in callers {
                    self.events.emit(GeneratorEvent::NewImage {
                        caller,
                        path: path.clone(),
                    });
                }
            }
            Err(error) => {
                warn!("Rendering {} failed: {}", key, error);
                remove_file_quiet(&path);
                self.report_command_error(&error);
                for caller in callers {
                    self.events.emit(GeneratorEvent::ImageFailed {
                        caller,
                        error: error.to_string(),
                    });
                }
            }
        }
    }
}
