//! The plot generator.
//!
//! [`Generator`] owns the renderer supervisor, the command queue, the image
//! cache and the report run. It is driven by discrete events (API calls,
//! process events, timer ticks) from a single owner and never blocks; see
//! [`crate::commands`] for the async loop that provides that owner.

mod dispatcher;
pub mod report;
pub mod template;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ImageCache, RenderStamp};
use crate::core::{
    Caller, EventSink, GeneratorConfig, GeneratorEvent, IDLE_PROGRESS, ImageTypeDescriptor, LineColors,
    PixelSize, ProgressTracker,
};
use crate::processing::protocol::quote_argument;
use crate::processing::{
    CommandQueue, Continuation, ProcessEvent, ProcessSupervisor, RendererLauncher, Resolved, SupervisorSignal,
    SupervisorState,
};
use crate::utils::{GeneratorError, GeneratorResult};

use report::ReportRun;
use template::{RenderContext, render_command, validate_template};

/// Directory holding cached images.
#[derive(Debug)]
enum Scratch {
    Temporary(TempDir),
    Fixed(PathBuf),
}

impl Scratch {
    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Fixed(path) => path,
        }
    }
}

pub struct Generator {
    config: GeneratorConfig,
    events: EventSink,
    supervisor: ProcessSupervisor,
    queue: CommandQueue,
    cache: ImageCache,
    scratch: Scratch,
    image_types: HashMap<String, ImageTypeDescriptor>,
    font_options: BTreeMap<String, u32>,
    colors: Option<LineColors>,
    /// Callers waiting for each render that is queued or in flight
    in_progress: HashMap<(CacheKey, RenderStamp), Vec<Caller>>,
    /// Bumped whenever fonts, colours or the type set change
    settings_epoch: u64,
    next_type_generation: u64,
    progress: ProgressTracker,
    last_progress: f64,
    last_ready: bool,
    report: Option<ReportRun>,
    next_report_id: u64,
    next_image_index: u64,
}

impl Generator {
    /// Creates a stopped generator.
    ///
    /// `process_events` is handed to every renderer launch; whoever owns the
    /// generator must feed what arrives on its receiver to
    /// [`Generator::handle_process_event`].
    pub fn new(
        config: GeneratorConfig,
        launcher: Box<dyn RendererLauncher>,
        process_events: UnboundedSender<ProcessEvent>,
        events: UnboundedSender<GeneratorEvent>,
    ) -> GeneratorResult<Self> {
        config.validate()?;

        let scratch = match &config.scratch_directory {
            Some(path) => {
                std::fs::create_dir_all(path)?;
                Scratch::Fixed(path.clone())
            }
            None => Scratch::Temporary(tempfile::Builder::new().prefix("plotgen-").tempdir()?),
        };
        debug!("Caching images in {}", scratch.path().display());

        let supervisor = ProcessSupervisor::new(
            launcher,
            process_events,
            config.renderer_program.clone(),
            config.renderer_args.clone(),
            config.working_directory.clone(),
        );

        Ok(Self {
            cache: ImageCache::new(config.cache_timeout()),
            config,
            events: EventSink::new(events),
            supervisor,
            queue: CommandQueue::new(),
            scratch,
            image_types: HashMap::new(),
            font_options: BTreeMap::new(),
            colors: None,
            in_progress: HashMap::new(),
            settings_epoch: 0,
            next_type_generation: 0,
            progress: ProgressTracker::new(),
            last_progress: IDLE_PROGRESS,
            last_ready: false,
            report: None,
            next_report_id: 0,
            next_image_index: 0,
        })
    }

    // ── Renderer lifecycle ───────────────────────────────────────────────────

    /// Launches the renderer in the current working directory.
    pub fn start(&mut self) -> GeneratorResult<()> {
        self.supervisor.start().inspect_err(|e| {
            self.events.emit(GeneratorEvent::RendererError(e.to_string()));
        })
    }

    /// Stops the renderer; everything still queued fails with `NotRunning`.
    pub fn stop(&mut self) {
        self.supervisor.stop();
        let resolved = self.queue.fail_all(&GeneratorError::NotRunning);
        self.handle_resolved(resolved);
        self.emit_ready();
        self.emit_progress();
    }

    /// Feeds one event from the renderer process.
    pub fn handle_process_event(&mut self, event: ProcessEvent) {
        match self.supervisor.handle_event(event) {
            SupervisorSignal::Ignored => {}
            SupervisorSignal::BecameReady => {
                self.emit_ready();
                let resolved = self.queue.pump(&mut self.supervisor);
                self.handle_resolved(resolved);
            }
            SupervisorSignal::Output(line) => {
                let resolved = self.queue.handle_output(&line, &mut self.supervisor);
                self.handle_resolved(resolved);
            }
            SupervisorSignal::Crashed(report) => {
                let mut message = report;
                let partial = self.queue.buffered_output();
                if !partial.is_empty() {
                    message.push('\n');
                    message.push_str(&partial);
                }
                self.events.emit(GeneratorEvent::RendererError(message.clone()));
                let resolved = self.queue.fail_all(&GeneratorError::crash(message));
                self.handle_resolved(resolved);
                self.emit_ready();
            }
        }
        self.emit_progress();
    }

    /// Changes the renderer's working directory.
    ///
    /// A stopped renderer picks the directory up on its next start; a running
    /// one gets a `cd` command queued behind everything already submitted.
    pub fn chdir(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.supervisor.is_running() {
            debug!("Renderer stopped, next start uses {}", path.display());
            self.supervisor.set_working_directory(path);
            return;
        }
        let command = match quote_argument(&path.to_string_lossy()) {
            Ok(quoted) => format!("cd {quoted}"),
            Err(e) => {
                warn!("Not changing renderer directory: {}", e);
                self.events.emit(GeneratorEvent::RendererError(e.to_string()));
                return;
            }
        };
        let (_, resolved) = self
            .queue
            .enqueue(command, Continuation::ChangeDirectory { path }, &mut self.supervisor);
        self.handle_resolved(resolved);
    }

    // ── Image types ──────────────────────────────────────────────────────────

    /// Registers or replaces an image type. Replacing drops its cached images
    /// and keeps renders of the old template out of the cache.
    pub fn register_image_type(&mut self, type_name: &str, command_json: &str) -> GeneratorResult<()> {
        let mut descriptor = ImageTypeDescriptor::from_registration(type_name, command_json)
            .and_then(|d| validate_template(&d.command_template).map(|_| d))
            .inspect_err(|e| {
                warn!("Rejected image type {}: {}", type_name, e);
                self.events.emit(GeneratorEvent::RendererError(e.to_string()));
            })?;

        self.next_type_generation += 1;
        descriptor.generation = self.next_type_generation;
        if self.image_types.insert(type_name.to_string(), descriptor).is_some() {
            let dropped = self.cache.drop_type(type_name);
            debug!("Replaced image type {} ({} cached images dropped)", type_name, dropped);
        } else {
            debug!("Registered image type {}", type_name);
        }
        Ok(())
    }

    pub fn is_type_registered(&self, type_name: &str) -> bool {
        self.image_types.contains_key(type_name)
    }

    /// Registered type names in report order.
    pub fn registered_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.image_types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forgets every image type together with every cached image.
    pub fn drop_all_image_types(&mut self) {
        info!("Dropping {} image types", self.image_types.len());
        self.image_types.clear();
        self.cache.drop_all();
        self.settings_epoch += 1;
    }

    /// Size of the last full-size render of `type_name`.
    pub fn image_type_size(&self, type_name: &str) -> Option<PixelSize> {
        self.image_types.get(type_name).and_then(|d| d.full_image_pixel_size)
    }

    /// Sets the size of a renderer font tag (`DEFAULT`, `TITLE`, `AXIS`, ...).
    pub fn set_font_size(&mut self, font_tag: &str, size: u32) {
        let tag = font_tag.trim().to_ascii_uppercase();
        if self.font_options.get(&tag) == Some(&size) {
            return;
        }
        debug!("Font {} set to {}", tag, size);
        self.font_options.insert(tag, size);
        self.settings_changed();
    }

    pub fn set_single_line_colors(&mut self, main: &str, secondary: &str) -> GeneratorResult<()> {
        let colors = LineColors::new(main, secondary).inspect_err(|e| {
            self.events.emit(GeneratorEvent::RendererError(e.to_string()));
        })?;
        if self.colors.as_ref() != Some(&colors) {
            self.colors = Some(colors);
            self.settings_changed();
        }
        Ok(())
    }

    /// Applies the default colours unless colours were set before.
    pub fn set_default_single_line_colors(&mut self) {
        if self.colors.is_none() {
            self.colors = Some(LineColors::default());
        }
    }

    pub fn single_line_colors(&self) -> LineColors {
        self.colors.clone().unwrap_or_default()
    }

    // ── Cache ────────────────────────────────────────────────────────────────

    pub fn set_image_cache_timeout(&mut self, seconds: f64) {
        match Duration::try_from_secs_f64(seconds) {
            Ok(timeout) => self.cache.set_timeout(timeout),
            Err(e) => warn!("Ignoring invalid cache timeout {}: {}", seconds, e),
        }
    }

    /// Periodic sweep of expired images.
    pub fn check_cache(&mut self) {
        self.check_cache_at(Instant::now());
    }

    pub fn check_cache_at(&mut self, now: Instant) {
        let evicted = self.cache.evict_expired(now);
        if evicted > 0 {
            debug!("Cache sweep evicted {} images", evicted);
        }
    }

    pub fn cached_images(&self) -> usize {
        self.cache.len()
    }

    pub fn scratch_directory(&self) -> &Path {
        self.scratch.path()
    }

    // ── State queries ────────────────────────────────────────────────────────

    pub fn ready(&self) -> bool {
        self.supervisor.is_ready()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    /// Instance id of the current renderer launch.
    pub fn renderer_instance(&self) -> u64 {
        self.supervisor.instance()
    }

    pub fn working_directory(&self) -> &Path {
        self.supervisor.working_directory()
    }

    pub fn progress(&self) -> f64 {
        self.progress.progress()
    }

    pub fn reporting(&self) -> bool {
        self.report.is_some()
    }

    pub fn commands_in_flight(&self) -> usize {
        self.queue.in_flight_count()
    }

    pub fn commands_queued(&self) -> usize {
        self.queue.pending_len()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    // ── Internals shared by the dispatcher and the reporter ──────────────────

    fn build_command(
        &self,
        descriptor: &ImageTypeDescriptor,
        file: &Path,
        from: f64,
        duration: f64,
        size: PixelSize,
        full_size: bool,
    ) -> GeneratorResult<String> {
        let mut fonts = self.font_options.clone();
        fonts.extend(descriptor.font_size_overrides.iter().map(|(k, v)| (k.clone(), *v)));
        let colors = self.single_line_colors();
        let ctx = RenderContext {
            file,
            from,
            duration,
            size,
            full_size: full_size || descriptor.is_full_size,
            fonts: &fonts,
            colors: &colors,
            image_format: &self.config.image_format,
            full_image_size: descriptor.full_image_pixel_size,
        };
        render_command(&descriptor.command_template, &ctx)
    }

    fn handle_resolved(&mut self, resolved: Vec<Resolved>) {
        for Resolved { command, outcome } in resolved {
            match command.on_complete {
                Continuation::Image {
                    key,
                    stamp,
                    path,
                    full_size,
                } => {
                    self.finish_image(key, stamp, path, full_size, outcome);
                }
                Continuation::Report {
                    run_id,
                    type_name,
                    output_path,
                } => {
                    self.finish_report_image(run_id, &type_name, &output_path, outcome);
                }
                Continuation::ChangeDirectory { path } => match outcome {
                    Ok(_) => {
                        debug!("Renderer now in {}", path.display());
                        self.supervisor.set_working_directory(path);
                    }
                    Err(e) => {
                        warn!("Changing renderer directory to {} failed: {}", path.display(), e);
                        self.report_command_error(&e);
                    }
                },
            }
        }
    }

    /// Surfaces a per-command renderer error. Process-level errors have
    /// already been reported once when the process went down.
    fn report_command_error(&self, error: &GeneratorError) {
        if matches!(error, GeneratorError::Render(_) | GeneratorError::CacheIo { .. }) {
            self.events.emit(GeneratorEvent::RendererError(error.to_string()));
        }
    }

    /// Fonts or colours changed: cached images are stale, and so is
    /// anything still rendering with the old settings.
    fn settings_changed(&mut self) {
        self.settings_epoch += 1;
        self.cache.retire_all(Instant::now());
    }

    /// Stamp a render of `type_name` started now would carry.
    fn current_stamp(&self, type_name: &str) -> Option<RenderStamp> {
        self.image_types.get(type_name).map(|d| RenderStamp {
            type_generation: d.generation,
            settings_epoch: self.settings_epoch,
        })
    }

    fn record_full_size(&mut self, type_name: &str, size: Option<PixelSize>) {
        if let (Some(descriptor), Some(size)) = (self.image_types.get_mut(type_name), size) {
            descriptor.full_image_pixel_size = Some(size);
        }
    }

    fn emit_ready(&mut self) {
        let ready = self.supervisor.is_ready();
        if ready != self.last_ready {
            self.last_ready = ready;
            self.events.emit(GeneratorEvent::ReadyChanged(ready));
        }
    }

    fn emit_progress(&mut self) {
        let progress = self.progress.progress();
        if progress != self.last_progress {
            self.last_progress = progress;
            self.events.emit(GeneratorEvent::ProgressChanged(progress));
        }
    }
}
