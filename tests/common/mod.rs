#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use plotgen_lib::{
    Generator, GeneratorConfig, GeneratorError, GeneratorEvent, GeneratorResult, ImageRequest, LaunchSpec,
    PixelSize, ProcessEvent, RendererLauncher, RendererProcess,
};
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const CPU_TEMPLATE: &str = "graph {file} --start {from} --end {to} -w {width} -h {height} {full_size_mode} DEF:v=cpu.rrd:v:AVERAGE LINE1:v{color_main}";
pub const MEM_TEMPLATE: &str = "graph {file} --start {from} --end {to} -w {width} -h {height} {full_size_mode} DEF:v=mem.rrd:v:AVERAGE LINE1:v{color_main}";

/// Everything written to scripted renderers, across launches.
#[derive(Debug, Default)]
pub struct Script {
    pub written: Vec<String>,
    pub launches: Vec<LaunchSpec>,
    pub shutdowns: usize,
    pub fail_launch: bool,
    /// Report `Started` as soon as a launch succeeds
    pub auto_start: bool,
    /// Event channel of the latest launch
    pub events: Option<UnboundedSender<ProcessEvent>>,
}

impl Script {
    /// Plays one stdout line from the latest launch.
    pub fn emit_line(&self, line: &str) {
        let instance = self.launches.last().map(|spec| spec.instance).unwrap_or_default();
        if let Some(tx) = &self.events {
            tx.send(ProcessEvent::Output {
                instance,
                line: line.to_string(),
            })
            .unwrap();
        }
    }
}

pub type SharedScript = Arc<Mutex<Script>>;

struct ScriptedProcess(SharedScript);

impl RendererProcess for ScriptedProcess {
    fn write_command(&mut self, line: &str) -> GeneratorResult<()> {
        self.0.lock().unwrap().written.push(line.to_string());
        Ok(())
    }

    fn shutdown(&mut self) {
        self.0.lock().unwrap().shutdowns += 1;
    }
}

/// Launcher that never spawns anything; the test plays the renderer.
pub struct ScriptedLauncher(pub SharedScript);

impl RendererLauncher for ScriptedLauncher {
    fn launch(
        &mut self,
        spec: &LaunchSpec,
        events: UnboundedSender<ProcessEvent>,
    ) -> GeneratorResult<Box<dyn RendererProcess>> {
        let mut script = self.0.lock().unwrap();
        if script.fail_launch {
            return Err(GeneratorError::launch("rrdtool: No such file or directory"));
        }
        if script.auto_start {
            events.send(ProcessEvent::Started { instance: spec.instance }).unwrap();
        }
        script.launches.push(spec.clone());
        script.events = Some(events);
        Ok(Box::new(ScriptedProcess(self.0.clone())))
    }
}

pub fn test_config(root: &TempDir) -> GeneratorConfig {
    let working = root.path().join("rrd");
    std::fs::create_dir_all(&working).unwrap();
    GeneratorConfig {
        working_directory: working,
        report_root: root.path().join("reports"),
        scratch_directory: Some(root.path().join("scratch")),
        ..GeneratorConfig::default()
    }
}

pub struct Harness {
    pub generator: Generator,
    pub events: UnboundedReceiver<GeneratorEvent>,
    pub script: SharedScript,
    pub root: TempDir,
    _process_rx: UnboundedReceiver<ProcessEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut GeneratorConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(&root);
        adjust(&mut config);
        let script = SharedScript::default();
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let generator =
            Generator::new(config, Box::new(ScriptedLauncher(script.clone())), process_tx, event_tx).unwrap();
        Self {
            generator,
            events,
            script,
            root,
            _process_rx: process_rx,
        }
    }

    /// Registers cpu and mem.
    pub fn with_default_types() -> Self {
        let mut h = Self::new();
        h.generator.register_image_type("cpu", CPU_TEMPLATE).unwrap();
        h.generator.register_image_type("mem", MEM_TEMPLATE).unwrap();
        h
    }

    /// Starts the renderer and confirms its startup.
    pub fn start_ready(&mut self) {
        self.generator.start().unwrap();
        self.started();
    }

    pub fn started(&mut self) {
        let instance = self.generator.renderer_instance();
        self.generator.handle_process_event(ProcessEvent::Started { instance });
    }

    pub fn output(&mut self, line: &str) {
        let instance = self.generator.renderer_instance();
        self.generator.handle_process_event(ProcessEvent::Output {
            instance,
            line: line.to_string(),
        });
    }

    pub fn exited(&mut self, code: Option<i32>) {
        let instance = self.generator.renderer_instance();
        self.generator.handle_process_event(ProcessEvent::Exited { instance, code });
    }

    pub fn written(&self) -> Vec<String> {
        self.script.lock().unwrap().written.clone()
    }

    pub fn last_written(&self) -> String {
        self.written().last().cloned().unwrap_or_default()
    }

    /// Answers the in-flight command like rrdtool would, writing the target file.
    pub fn respond_ok(&mut self, size: PixelSize) {
        if let Some(path) = target_file(&self.last_written()) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, b"\x89PNG").unwrap();
        }
        self.output(&size.to_string());
        self.output("OK u:0.01 s:0.00 r:0.02");
    }

    pub fn respond_error(&mut self, message: &str) {
        self.output(&format!("ERROR: {message}"));
    }

    pub fn drain(&mut self) -> Vec<GeneratorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// File argument of a `graph` command line, quoted or bare.
pub fn target_file(command: &str) -> Option<PathBuf> {
    let rest = command.strip_prefix("graph ")?.trim_start();
    if let Some(quoted) = rest.strip_prefix('\'') {
        let len = quoted.find('\'')?;
        return Some(PathBuf::from(&quoted[..len]));
    }
    rest.split_whitespace().next().map(PathBuf::from)
}

pub fn request(caller: i64, type_name: &str) -> ImageRequest {
    ImageRequest {
        caller,
        type_name: type_name.to_string(),
        from: 1_700_000_000.0,
        duration: 3600.0,
        size: PixelSize::new(400, 200),
        full_size: false,
        current_fname: String::new(),
    }
}

pub fn new_images(events: &[GeneratorEvent]) -> Vec<(i64, PathBuf)> {
    events
        .iter()
        .filter_map(|e| match e {
            GeneratorEvent::NewImage { caller, path } => Some((*caller, path.clone())),
            _ => None,
        })
        .collect()
}

pub fn failures(events: &[GeneratorEvent]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|e| match e {
            GeneratorEvent::ImageFailed { caller, .. } => Some(*caller),
            _ => None,
        })
        .collect()
}

pub fn renderer_errors(events: &[GeneratorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            GeneratorEvent::RendererError(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}
