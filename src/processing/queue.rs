//! Serialized command pipeline in front of the renderer.
//!
//! Commands leave the queue strictly in submission order and at most one of
//! them is in flight. Responses carry no id; the in-flight command is always
//! the one being answered.

use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, warn};
use crate::cache::{CacheKey, RenderStamp};
use crate::core::PixelSize;
use crate::utils::{GeneratorError, GeneratorResult};
use super::protocol::{RendererResponse, ResponseAccumulator};
use super::supervisor::{ProcessSupervisor, SupervisorState};

/// What to do with the answer to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Continuation {
    /// Cache entry for `key`, rendered into `path` under `stamp`
    Image {
        key: CacheKey,
        stamp: RenderStamp,
        path: PathBuf,
        full_size: bool,
    },
    /// One image of report run `run_id`
    Report {
        run_id: u64,
        type_name: String,
        output_path: PathBuf,
    },
    ChangeDirectory { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub sequence_id: u64,
    pub raw_command_text: String,
    pub on_complete: Continuation,
}

/// Successful answer to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub pixel_size: Option<PixelSize>,
    pub output: Vec<String>,
}

/// A command together with its one and only outcome.
#[derive(Debug)]
pub struct Resolved {
    pub command: PendingCommand,
    pub outcome: GeneratorResult<RenderOutput>,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    in_flight: Option<PendingCommand>,
    next_sequence: u64,
    accumulator: ResponseAccumulator,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command and sends it right away if the renderer is idle.
    ///
    /// Returns the sequence id and any commands that resolved while pumping.
    pub fn enqueue(
        &mut self,
        raw_command_text: impl Into<String>,
        on_complete: Continuation,
        supervisor: &mut ProcessSupervisor,
    ) -> (u64, Vec<Resolved>) {
        self.next_sequence += 1;
        let sequence_id = self.next_sequence;
        let command = PendingCommand {
            sequence_id,
            raw_command_text: raw_command_text.into(),
            on_complete,
        };
        debug!("Queued command #{}: {}", sequence_id, command.raw_command_text);
        self.pending.push_back(command);
        (sequence_id, self.pump(supervisor))
    }

    /// Promotes the head of the queue when nothing is in flight.
    pub fn pump(&mut self, supervisor: &mut ProcessSupervisor) -> Vec<Resolved> {
        let mut resolved = Vec::new();
        while self.in_flight.is_none() && supervisor.state() == SupervisorState::Ready {
            let Some(command) = self.pending.pop_front() else {
                break;
            };
            match supervisor.send(&command.raw_command_text) {
                Ok(()) => {
                    debug!("Command #{} in flight", command.sequence_id);
                    self.accumulator.clear();
                    self.in_flight = Some(command);
                }
                Err(e) => {
                    warn!("Failed to send command #{}: {}", command.sequence_id, e);
                    resolved.push(Resolved { command, outcome: Err(e) });
                }
            }
        }
        resolved
    }

    /// Feeds one renderer output line, resolving the in-flight command when its
    /// response is complete.
    pub fn handle_output(&mut self, line: &str, supervisor: &mut ProcessSupervisor) -> Vec<Resolved> {
        if self.in_flight.is_none() {
            debug!("Renderer output with no command in flight: {}", line);
            return Vec::new();
        }

        let Some(response) = self.accumulator.push_line(line) else {
            return Vec::new();
        };

        let mut resolved = Vec::new();
        if let Some(command) = self.in_flight.take() {
            let outcome = match response {
                RendererResponse::Success { pixel_size, output } => Ok(RenderOutput { pixel_size, output }),
                RendererResponse::Failure { message, .. } => Err(GeneratorError::render(message)),
            };
            debug!("Command #{} resolved (ok: {})", command.sequence_id, outcome.is_ok());
            resolved.push(Resolved { command, outcome });
        }
        supervisor.command_finished();
        resolved.extend(self.pump(supervisor));
        resolved
    }

    /// Resolves the in-flight command and everything queued with `error`.
    pub fn fail_all(&mut self, error: &GeneratorError) -> Vec<Resolved> {
        self.accumulator.clear();
        self.in_flight
            .take()
            .into_iter()
            .chain(self.pending.drain(..))
            .map(|command| Resolved {
                command,
                outcome: Err(error.clone()),
            })
            .collect()
    }

    pub fn in_flight(&self) -> Option<&PendingCommand> {
        self.in_flight.as_ref()
    }

    pub fn in_flight_count(&self) -> usize {
        usize::from(self.in_flight.is_some())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Output received so far for the in-flight command.
    pub fn buffered_output(&self) -> String {
        self.accumulator.buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::{self, UnboundedSender};
    use crate::processing::process::{LaunchSpec, ProcessEvent, RendererLauncher, RendererProcess};

    struct Log(Arc<Mutex<Vec<String>>>);

    impl RendererProcess for Log {
        fn write_command(&mut self, line: &str) -> GeneratorResult<()> {
            self.0.lock().unwrap().push(line.to_string());
            Ok(())
        }

        fn shutdown(&mut self) {}
    }

    struct LogLauncher(Arc<Mutex<Vec<String>>>);

    impl RendererLauncher for LogLauncher {
        fn launch(
            &mut self,
            _spec: &LaunchSpec,
            _events: UnboundedSender<ProcessEvent>,
        ) -> GeneratorResult<Box<dyn RendererProcess>> {
            Ok(Box::new(Log(self.0.clone())))
        }
    }

    fn ready_supervisor() -> (ProcessSupervisor, Arc<Mutex<Vec<String>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sup = ProcessSupervisor::new(Box::new(LogLauncher(written.clone())), tx, "rrdtool", vec![], ".");
        sup.start().unwrap();
        sup.handle_event(ProcessEvent::Started { instance: sup.instance() });
        (sup, written)
    }

    fn cd(path: &str) -> Continuation {
        Continuation::ChangeDirectory { path: PathBuf::from(path) }
    }

    #[test]
    fn one_in_flight_and_fifo_order() {
        let (mut sup, written) = ready_supervisor();
        let mut queue = CommandQueue::new();

        for name in ["a", "b", "c"] {
            let (_, resolved) = queue.enqueue(format!("cd {name}"), cd(name), &mut sup);
            assert!(resolved.is_empty());
            assert!(queue.in_flight_count() <= 1);
        }
        assert_eq!(written.lock().unwrap().as_slice(), ["cd a"]);
        assert_eq!(queue.pending_len(), 2);

        let resolved = queue.handle_output("OK u:0 s:0 r:0", &mut sup);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].command.on_complete, cd("a"));
        assert!(resolved[0].outcome.is_ok());
        assert_eq!(written.lock().unwrap().as_slice(), ["cd a", "cd b"]);

        let resolved = queue.handle_output("ERROR: No such directory", &mut sup);
        assert_eq!(resolved[0].command.on_complete, cd("b"));
        assert_eq!(resolved[0].outcome, Err(GeneratorError::render("No such directory")));
        assert_eq!(written.lock().unwrap().len(), 3);

        queue.handle_output("OK", &mut sup);
        assert!(queue.is_idle());
        assert_eq!(sup.state(), SupervisorState::Ready);
    }

    #[test]
    fn sequence_ids_increase() {
        let (mut sup, _) = ready_supervisor();
        let mut queue = CommandQueue::new();
        let (first, _) = queue.enqueue("cd a", cd("a"), &mut sup);
        let (second, _) = queue.enqueue("cd b", cd("b"), &mut sup);
        assert!(second > first);
    }

    #[test]
    fn holds_commands_until_ready() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sup = ProcessSupervisor::new(Box::new(LogLauncher(written.clone())), tx, "rrdtool", vec![], ".");
        sup.start().unwrap();
        let mut queue = CommandQueue::new();
        queue.enqueue("cd a", cd("a"), &mut sup);
        assert!(written.lock().unwrap().is_empty());

        sup.handle_event(ProcessEvent::Started { instance: sup.instance() });
        queue.pump(&mut sup);
        assert_eq!(written.lock().unwrap().as_slice(), ["cd a"]);
    }

    #[test]
    fn fail_all_resolves_everything_once() {
        let (mut sup, _) = ready_supervisor();
        let mut queue = CommandQueue::new();
        queue.enqueue("cd a", cd("a"), &mut sup);
        queue.enqueue("cd b", cd("b"), &mut sup);
        queue.handle_output("partial line", &mut sup);

        let resolved = queue.fail_all(&GeneratorError::crash("exit 1"));
        let order: Vec<_> = resolved.iter().map(|r| r.command.on_complete.clone()).collect();
        assert_eq!(order, vec![cd("a"), cd("b")]);
        assert!(resolved.iter().all(|r| r.outcome.is_err()));
        assert!(queue.is_idle());
        assert!(queue.fail_all(&GeneratorError::crash("again")).is_empty());
        assert_eq!(queue.buffered_output(), "");
    }

    #[test]
    fn stray_output_is_discarded() {
        let (mut sup, _) = ready_supervisor();
        let mut queue = CommandQueue::new();
        assert!(queue.handle_output("OK", &mut sup).is_empty());
    }
}
