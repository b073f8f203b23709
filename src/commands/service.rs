//! Async front-end for a [`Generator`].
//!
//! One tokio task owns the generator and reacts to control messages, renderer
//! process events and two timers (report steps, cache sweeps). Every mutation
//! goes through that task, which keeps the queue's ordering guarantees without
//! any locking.

use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::core::{GeneratorConfig, GeneratorEvent, ImageRequest, PixelSize, ReportRequest};
use crate::generator::Generator;
use crate::processing::{RendererLauncher, SupervisorState};
use crate::utils::{GeneratorError, GeneratorResult};

/// Snapshot of the generator's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorStatus {
    pub ready: bool,
    pub progress: f64,
    pub reporting: bool,
    pub supervisor: SupervisorState,
    pub commands_in_flight: usize,
    pub commands_queued: usize,
    pub cached_images: usize,
}

enum Control {
    Start(oneshot::Sender<GeneratorResult<()>>),
    Stop,
    SetCacheTimeout(f64),
    CheckCache,
    Chdir(PathBuf),
    RegisterImageType {
        type_name: String,
        command_json: String,
        reply: oneshot::Sender<GeneratorResult<()>>,
    },
    IsTypeRegistered(String, oneshot::Sender<bool>),
    ImageTypeSize(String, oneshot::Sender<Option<PixelSize>>),
    DropAllImageTypes,
    SetFontSize(String, u32),
    GetImage(ImageRequest),
    MakeReport(ReportRequest, oneshot::Sender<GeneratorResult<PathBuf>>),
    SetColors {
        main: String,
        secondary: String,
        reply: oneshot::Sender<GeneratorResult<()>>,
    },
    SetDefaultColors,
    Status(oneshot::Sender<GeneratorStatus>),
    Shutdown,
}

/// Cloneable handle to a running generator task.
#[derive(Clone)]
pub struct GeneratorHandle {
    tx: mpsc::UnboundedSender<Control>,
}

/// Spawns the generator task. Events arrive on the returned receiver.
pub fn spawn_generator(
    config: GeneratorConfig,
    launcher: Box<dyn RendererLauncher>,
) -> GeneratorResult<(GeneratorHandle, mpsc::UnboundedReceiver<GeneratorEvent>, JoinHandle<()>)> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (process_tx, mut process_rx) = mpsc::unbounded_channel();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Control>();

    let report_every = config.report_step_interval();
    let sweep_every = config.cache_check_interval();
    let mut generator = Generator::new(config, launcher, process_tx, event_tx)?;

    let task = tokio::spawn(async move {
        let mut report_timer = time::interval(report_every);
        report_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_timer = time::interval(sweep_every);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Generator task running");
        loop {
            tokio::select! {
                control = control_rx.recv() => {
                    match control {
                        Some(Control::Shutdown) | None => break,
                        Some(control) => apply(&mut generator, control),
                    }
                }
                Some(event) = process_rx.recv() => generator.handle_process_event(event),
                _ = report_timer.tick() => generator.report_tick(),
                _ = sweep_timer.tick() => generator.check_cache(),
            }
        }
        generator.stop();
        info!("Generator task stopped");
    });

    Ok((GeneratorHandle { tx: control_tx }, event_rx, task))
}

fn apply(generator: &mut Generator, control: Control) {
    match control {
        Control::Start(reply) => {
            let _ = reply.send(generator.start());
        }
        Control::Stop => generator.stop(),
        Control::SetCacheTimeout(seconds) => generator.set_image_cache_timeout(seconds),
        Control::CheckCache => generator.check_cache(),
        Control::Chdir(path) => generator.chdir(path),
        Control::RegisterImageType {
            type_name,
            command_json,
            reply,
        } => {
            let _ = reply.send(generator.register_image_type(&type_name, &command_json));
        }
        Control::IsTypeRegistered(type_name, reply) => {
            let _ = reply.send(generator.is_type_registered(&type_name));
        }
        Control::ImageTypeSize(type_name, reply) => {
            let _ = reply.send(generator.image_type_size(&type_name));
        }
        Control::DropAllImageTypes => generator.drop_all_image_types(),
        Control::SetFontSize(tag, size) => generator.set_font_size(&tag, size),
        Control::GetImage(request) => generator.get_image(request),
        Control::MakeReport(request, reply) => {
            let result = generator.make_report(request);
            // first step right away instead of waiting a full interval
            generator.report_tick();
            let _ = reply.send(result);
        }
        Control::SetColors { main, secondary, reply } => {
            let _ = reply.send(generator.set_single_line_colors(&main, &secondary));
        }
        Control::SetDefaultColors => generator.set_default_single_line_colors(),
        Control::Status(reply) => {
            let _ = reply.send(GeneratorStatus {
                ready: generator.ready(),
                progress: generator.progress(),
                reporting: generator.reporting(),
                supervisor: generator.supervisor_state(),
                commands_in_flight: generator.commands_in_flight(),
                commands_queued: generator.commands_queued(),
                cached_images: generator.cached_images(),
            });
        }
        Control::Shutdown => debug!("Shutdown handled by the task loop"),
    }
}

impl GeneratorHandle {
    fn send(&self, control: Control) -> GeneratorResult<()> {
        self.tx.send(control).map_err(|_| GeneratorError::ChannelClosed)
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Control) -> GeneratorResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx))?;
        reply_rx.await.map_err(|_| GeneratorError::ChannelClosed)
    }

    pub async fn start(&self) -> GeneratorResult<()> {
        self.ask(Control::Start).await?
    }

    pub fn stop(&self) -> GeneratorResult<()> {
        self.send(Control::Stop)
    }

    pub fn set_image_cache_timeout(&self, seconds: f64) -> GeneratorResult<()> {
        self.send(Control::SetCacheTimeout(seconds))
    }

    pub fn check_cache(&self) -> GeneratorResult<()> {
        self.send(Control::CheckCache)
    }

    pub fn chdir(&self, path: impl Into<PathBuf>) -> GeneratorResult<()> {
        self.send(Control::Chdir(path.into()))
    }

    pub async fn register_image_type(&self, type_name: &str, command_json: &str) -> GeneratorResult<()> {
        let type_name = type_name.to_string();
        let command_json = command_json.to_string();
        self.ask(|reply| Control::RegisterImageType {
            type_name,
            command_json,
            reply,
        })
        .await?
    }

    pub async fn is_type_registered(&self, type_name: &str) -> GeneratorResult<bool> {
        let type_name = type_name.to_string();
        self.ask(|reply| Control::IsTypeRegistered(type_name, reply)).await
    }

    pub async fn image_type_size(&self, type_name: &str) -> GeneratorResult<Option<PixelSize>> {
        let type_name = type_name.to_string();
        self.ask(|reply| Control::ImageTypeSize(type_name, reply)).await
    }

    pub fn drop_all_image_types(&self) -> GeneratorResult<()> {
        self.send(Control::DropAllImageTypes)
    }

    pub fn set_font_size(&self, font_tag: &str, size: u32) -> GeneratorResult<()> {
        self.send(Control::SetFontSize(font_tag.to_string(), size))
    }

    pub fn get_image(&self, request: ImageRequest) -> GeneratorResult<()> {
        self.send(Control::GetImage(request))
    }

    pub async fn make_report(&self, request: ReportRequest) -> GeneratorResult<PathBuf> {
        self.ask(|reply| Control::MakeReport(request, reply)).await?
    }

    pub async fn set_single_line_colors(&self, main: &str, secondary: &str) -> GeneratorResult<()> {
        let main = main.to_string();
        let secondary = secondary.to_string();
        self.ask(|reply| Control::SetColors { main, secondary, reply }).await?
    }

    pub fn set_default_single_line_colors(&self) -> GeneratorResult<()> {
        self.send(Control::SetDefaultColors)
    }

    pub async fn status(&self) -> GeneratorResult<GeneratorStatus> {
        self.ask(Control::Status).await
    }

    /// Stops the renderer and ends the generator task.
    pub fn shutdown(&self) -> GeneratorResult<()> {
        self.send(Control::Shutdown)
    }
}
