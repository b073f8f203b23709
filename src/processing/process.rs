//! Renderer process seam and its tokio implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};
use crate::utils::{GeneratorError, GeneratorResult};

/// Something that happened to a launched renderer, tagged with its instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Started { instance: u64 },
    /// One line of stdout
    Output { instance: u64, line: String },
    /// One line of stderr
    Diagnostic { instance: u64, line: String },
    Exited { instance: u64, code: Option<i32> },
}

impl ProcessEvent {
    pub fn instance(&self) -> u64 {
        match self {
            Self::Started { instance }
            | Self::Output { instance, .. }
            | Self::Diagnostic { instance, .. }
            | Self::Exited { instance, .. } => *instance,
        }
    }
}

/// What the supervisor needs to start one renderer instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    pub instance: u64,
}

/// A running renderer accepting one command line at a time.
pub trait RendererProcess: Send {
    /// Queues `line` for the renderer's stdin without blocking.
    fn write_command(&mut self, line: &str) -> GeneratorResult<()>;

    /// Asks the renderer to go away; an `Exited` event follows.
    fn shutdown(&mut self);
}

/// Starts renderer processes and reports their lifecycle through `events`.
pub trait RendererLauncher: Send {
    fn launch(
        &mut self,
        spec: &LaunchSpec,
        events: UnboundedSender<ProcessEvent>,
    ) -> GeneratorResult<Box<dyn RendererProcess>>;
}

/// Launches the renderer as a tokio child process bound to stdin/stdout pipes.
#[derive(Debug, Default, Clone)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl RendererLauncher for TokioLauncher {
    fn launch(
        &mut self,
        spec: &LaunchSpec,
        events: UnboundedSender<ProcessEvent>,
    ) -> GeneratorResult<Box<dyn RendererProcess>> {
        debug!(
            "Spawning renderer `{} {}` in {}",
            spec.program,
            spec.args.join(" "),
            spec.working_directory.display()
        );

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GeneratorError::launch(format!("{}: {}", spec.program, e)))?;

        let instance = spec.instance;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GeneratorError::launch("Renderer stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GeneratorError::launch("Renderer stdout not captured"))?;
        let stderr = child.stderr.take();

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    warn!("Failed to write to renderer: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    warn!("Failed to flush renderer stdin: {}", e);
                    break;
                }
            }
            // Dropping stdin closes the pipe, which ends pipe mode
            debug!("Renderer writer for instance {} finished", instance);
        });

        if let Some(stderr) = stderr {
            let events = events.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = events.send(ProcessEvent::Diagnostic { instance, line });
                }
            });
        }

        let _ = events.send(ProcessEvent::Started { instance });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let _ = events.send(ProcessEvent::Output { instance, line });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read renderer output: {}", e);
                        break;
                    }
                }
            }

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Failed to reap renderer: {}", e);
                    None
                }
            };
            debug!("Renderer instance {} exited with {:?}", instance, code);
            let _ = events.send(ProcessEvent::Exited { instance, code });
        });

        Ok(Box::new(PipeRenderer { line_tx: Some(line_tx) }))
    }
}

struct PipeRenderer {
    line_tx: Option<mpsc::UnboundedSender<String>>,
}

impl RendererProcess for PipeRenderer {
    fn write_command(&mut self, line: &str) -> GeneratorResult<()> {
        let tx = self
            .line_tx
            .as_ref()
            .ok_or_else(|| GeneratorError::crash("Renderer input already closed"))?;
        let mut line = line.trim_end().to_string();
        line.push('\n');
        tx.send(line)
            .map_err(|_| GeneratorError::crash("Renderer input pipe closed"))
    }

    fn shutdown(&mut self) {
        self.line_tx = None;
    }
}

/// Checks that a working directory exists before handing it to a renderer.
pub fn ensure_directory(path: &Path) -> GeneratorResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(GeneratorError::launch(format!(
            "Working directory does not exist: {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_launch_failure() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, _rx) = mpsc::unbounded_channel();
            let spec = LaunchSpec {
                program: "plotgen-renderer-that-does-not-exist".into(),
                args: vec!["-".into()],
                working_directory: PathBuf::from("."),
                instance: 1,
            };
            let err = TokioLauncher::new().launch(&spec, tx).err().unwrap();
            assert!(matches!(err, GeneratorError::ProcessLaunch(_)));
        });
    }

    #[test]
    fn event_instance_accessor() {
        let event = ProcessEvent::Output { instance: 7, line: "OK".into() };
        assert_eq!(event.instance(), 7);
    }

    #[test]
    fn ensure_directory_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_directory(dir.path()).is_ok());
        assert!(ensure_directory(&dir.path().join("nope")).is_err());
    }
}
