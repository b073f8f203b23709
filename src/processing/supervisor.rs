//! Lifecycle of the single renderer process.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};
use crate::utils::{GeneratorError, GeneratorResult};
use super::process::{LaunchSpec, ProcessEvent, RendererLauncher, RendererProcess, ensure_directory};

/// Diagnostic lines kept for crash reports.
const DIAGNOSTIC_LINES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Ready,
    Busy,
    Crashed,
}

/// What a process event meant for the rest of the generator.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorSignal {
    /// Stale instance, expected exit or stderr noise
    Ignored,
    BecameReady,
    Output(String),
    /// The renderer died underneath us; carries the captured output
    Crashed(String),
}

pub struct ProcessSupervisor {
    launcher: Box<dyn RendererLauncher>,
    process_events: UnboundedSender<ProcessEvent>,
    process: Option<Box<dyn RendererProcess>>,
    state: SupervisorState,
    instance: u64,
    program: String,
    args: Vec<String>,
    working_directory: PathBuf,
    diagnostics: VecDeque<String>,
}

impl ProcessSupervisor {
    pub fn new(
        launcher: Box<dyn RendererLauncher>,
        process_events: UnboundedSender<ProcessEvent>,
        program: impl Into<String>,
        args: Vec<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            launcher,
            process_events,
            process: None,
            state: SupervisorState::Stopped,
            instance: 0,
            program: program.into(),
            args,
            working_directory: working_directory.into(),
            diagnostics: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Instance id of the most recent launch.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// True once the renderer has confirmed startup and until it stops.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SupervisorState::Ready | SupervisorState::Busy)
    }

    /// True when commands may be queued for this renderer.
    pub fn accepts_commands(&self) -> bool {
        matches!(
            self.state,
            SupervisorState::Starting | SupervisorState::Ready | SupervisorState::Busy
        )
    }

    pub fn is_running(&self) -> bool {
        self.accepts_commands()
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Directory for the next launch; does not touch a running renderer.
    pub fn set_working_directory(&mut self, path: impl Into<PathBuf>) {
        self.working_directory = path.into();
    }

    /// Launches the renderer in the current working directory.
    pub fn start(&mut self) -> GeneratorResult<()> {
        if self.is_running() {
            warn!("Renderer already running (state {:?}), start ignored", self.state);
            return Ok(());
        }

        ensure_directory(&self.working_directory)?;

        self.instance += 1;
        self.diagnostics.clear();
        let spec = LaunchSpec {
            program: self.program.clone(),
            args: self.args.clone(),
            working_directory: self.working_directory.clone(),
            instance: self.instance,
        };

        match self.launcher.launch(&spec, self.process_events.clone()) {
            Ok(process) => {
                info!("Renderer instance {} launched", self.instance);
                self.process = Some(process);
                self.state = SupervisorState::Starting;
                Ok(())
            }
            Err(e) => {
                error!("Renderer launch failed: {}", e);
                self.process = None;
                self.state = SupervisorState::Stopped;
                Err(e)
            }
        }
    }

    /// Deliberately stops the renderer. The exit that follows is not a crash.
    pub fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            debug!("Stopping renderer instance {}", self.instance);
            process.shutdown();
        }
        self.state = SupervisorState::Stopped;
    }

    /// Writes one command; only legal while `Ready`.
    pub fn send(&mut self, command: &str) -> GeneratorResult<()> {
        if self.state != SupervisorState::Ready {
            return Err(GeneratorError::NotRunning);
        }
        let process = self.process.as_mut().ok_or(GeneratorError::NotRunning)?;
        process.write_command(command)?;
        self.state = SupervisorState::Busy;
        Ok(())
    }

    /// The in-flight command has been answered.
    pub fn command_finished(&mut self) {
        if self.state == SupervisorState::Busy {
            self.state = SupervisorState::Ready;
        }
    }

    pub fn handle_event(&mut self, event: ProcessEvent) -> SupervisorSignal {
        if event.instance() != self.instance {
            debug!("Ignoring event from stale renderer instance {}", event.instance());
            return SupervisorSignal::Ignored;
        }

        match event {
            ProcessEvent::Started { .. } => {
                if self.state == SupervisorState::Starting {
                    info!("Renderer instance {} ready", self.instance);
                    self.state = SupervisorState::Ready;
                    SupervisorSignal::BecameReady
                } else {
                    SupervisorSignal::Ignored
                }
            }
            ProcessEvent::Output { line, .. } => {
                if self.is_ready() {
                    SupervisorSignal::Output(line)
                } else {
                    debug!("Discarding renderer output in state {:?}: {}", self.state, line);
                    SupervisorSignal::Ignored
                }
            }
            ProcessEvent::Diagnostic { line, .. } => {
                debug!("Renderer stderr: {}", line);
                if self.diagnostics.len() == DIAGNOSTIC_LINES {
                    self.diagnostics.pop_front();
                }
                self.diagnostics.push_back(line);
                SupervisorSignal::Ignored
            }
            ProcessEvent::Exited { code, .. } => {
                if matches!(self.state, SupervisorState::Stopped | SupervisorState::Crashed) {
                    debug!("Renderer instance {} exited after stop", self.instance);
                    return SupervisorSignal::Ignored;
                }
                self.process = None;
                self.state = SupervisorState::Crashed;
                let mut report = match code {
                    Some(code) => format!("renderer exited with code {code}"),
                    None => "renderer terminated by signal".to_string(),
                };
                if !self.diagnostics.is_empty() {
                    report.push('\n');
                    report.push_str(&self.diagnostics.iter().cloned().collect::<Vec<_>>().join("\n"));
                }
                error!("Renderer instance {} crashed: {}", self.instance, report);
                SupervisorSignal::Crashed(report)
            }
        }
    }
}
