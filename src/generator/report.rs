//! Report run bookkeeping.
//!
//! A run owns a snapshot of the registered image type names and hands them out
//! one per tick. It is finished once every type has been handed out and every
//! handed-out image has completed, successfully or not.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use crate::core::{GeneratorEvent, PixelSize, ReportRequest};
use crate::processing::{Continuation, RenderOutput};
use crate::utils::{GeneratorError, GeneratorResult, create_unique_dir, file_exists, sanitize_file_stem};
use super::Generator;

const REPORT_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRun {
    pub run_id: u64,
    pub from: f64,
    pub duration: f64,
    pub target_size: PixelSize,
    pub output_directory: PathBuf,
    remaining_type_list: VecDeque<String>,
    pub total_count: usize,
    pub completed_count: usize,
    issued_count: usize,
}

impl ReportRun {
    pub fn new(run_id: u64, request: ReportRequest, output_directory: PathBuf, types: Vec<String>) -> Self {
        Self {
            run_id,
            from: request.from,
            duration: request.duration,
            target_size: request.size,
            output_directory,
            total_count: types.len(),
            remaining_type_list: types.into(),
            completed_count: 0,
            issued_count: 0,
        }
    }

    /// Takes the next type off the list, with its 1-based position in the run.
    pub fn next_type(&mut self) -> Option<(usize, String)> {
        let type_name = self.remaining_type_list.pop_front()?;
        self.issued_count += 1;
        Some((self.issued_count, type_name))
    }

    /// Where the image for the `index`-th type of the run is written.
    pub fn output_path(&self, index: usize, type_name: &str, image_format: &str) -> PathBuf {
        report_file_path(&self.output_directory, index, type_name, image_format)
    }

    pub fn record_completion(&mut self) {
        if self.completed_count < self.issued_count {
            self.completed_count += 1;
        }
    }

    /// Types not yet handed out.
    pub fn unissued(&self) -> usize {
        self.remaining_type_list.len()
    }

    /// Handed out but not yet completed.
    pub fn outstanding(&self) -> usize {
        self.issued_count - self.completed_count
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_type_list.is_empty() && self.completed_count >= self.total_count
    }
}

pub fn report_file_path(dir: &Path, index: usize, type_name: &str, image_format: &str) -> PathBuf {
    dir.join(format!("{:03}_{}.{}", index, sanitize_file_stem(type_name), image_format))
}

impl Generator {
    /// Starts a report run over every registered image type, replacing any
    /// run in progress. Returns the run's output directory.
    pub fn make_report(&mut self, request: ReportRequest) -> GeneratorResult<PathBuf> {
        let superseded = self.report.take();
        if let Some(old) = &superseded {
            info!(
                "Report run {} superseded with {}/{} images done",
                old.run_id, old.completed_count, old.total_count
            );
            self.progress.release(old.unissued());
        }
        let was_reporting = superseded.is_some();

        let stamp = chrono::Local::now().format(REPORT_DIR_FORMAT).to_string();
        let output_directory = match create_unique_dir(&self.config.report_root, &stamp) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot create report directory: {}", e);
                self.events.emit(GeneratorEvent::RendererError(e.to_string()));
                if was_reporting {
                    self.events.emit(GeneratorEvent::ReportingChanged(false));
                }
                self.emit_progress();
                return Err(e);
            }
        };

        self.next_report_id += 1;
        let run = ReportRun::new(
            self.next_report_id,
            request,
            output_directory.clone(),
            self.registered_types(),
        );
        info!(
            "Report run {} started: {} images into {}",
            run.run_id,
            run.total_count,
            output_directory.display()
        );

        if run.is_finished() {
            if was_reporting {
                self.events.emit(GeneratorEvent::ReportingChanged(false));
            }
            self.events.emit(GeneratorEvent::ReportComplete(output_directory.clone()));
            self.emit_progress();
            return Ok(output_directory);
        }

        self.progress.reserve(run.total_count);
        self.report = Some(run);
        if !was_reporting {
            self.events.emit(GeneratorEvent::ReportingChanged(true));
        }
        self.emit_progress();
        Ok(output_directory)
    }

    /// One scheduler step: issues the next report image once the renderer has
    /// nothing else to do.
    pub fn report_tick(&mut self) {
        if !self.queue.is_idle() {
            return;
        }
        let image_format = self.config.image_format.clone();
        let Some(run) = self.report.as_mut() else {
            return;
        };
        let Some((index, type_name)) = run.next_type() else {
            return;
        };
        let run_id = run.run_id;
        let output_path = run.output_path(index, &type_name, &image_format);
        let (from, duration, size) = (run.from, run.duration, run.target_size);

        let command = if !self.supervisor.accepts_commands() {
            Err(GeneratorError::NotRunning)
        } else {
            match self.image_types.get(&type_name) {
                Some(descriptor) => self.build_command(descriptor, &output_path, from, duration, size, true),
                None => Err(GeneratorError::UnregisteredType(type_name.clone())),
            }
        };

        match command {
            Ok(command) => {
                debug!("Report run {}: rendering {} ({})", run_id, type_name, index);
                let continuation = Continuation::Report {
                    run_id,
                    type_name,
                    output_path,
                };
                let (_, resolved) = self.queue.enqueue(command, continuation, &mut self.supervisor);
                self.handle_resolved(resolved);
            }
            Err(error) => {
                self.finish_report_image(run_id, &type_name, &output_path, Err(error));
            }
        }
        self.emit_progress();
    }

    pub(super) fn finish_report_image(
        &mut self,
        run_id: u64,
        type_name: &str,
        output_path: &Path,
        outcome: GeneratorResult<RenderOutput>,
    ) {
        self.progress.complete();
        let outcome = outcome.and_then(|output| {
            if file_exists(output_path) {
                Ok(output)
            } else {
                Err(GeneratorError::cache_io(output_path, "renderer produced no file"))
            }
        });
        match outcome {
            Ok(output) => {
                debug!("Report image {} written to {}", type_name, output_path.display());
                self.record_full_size(type_name, output.pixel_size);
            }
            Err(error) => {
                warn!("Report image {} failed: {}", type_name, error);
                if matches!(error, GeneratorError::NotRunning | GeneratorError::UnregisteredType(_)) {
                    self.events.emit(GeneratorEvent::RendererError(error.to_string()));
                } else {
                    self.report_command_error(&error);
                }
            }
        }

        let Some(run) = self.report.as_mut() else {
            debug!("Completion for finished report run {} ignored", run_id);
            return;
        };
        if run.run_id != run_id {
            debug!("Completion for superseded report run {} ignored", run_id);
            return;
        }
        run.record_completion();
        if run.is_finished() {
            let output_directory = run.output_directory.clone();
            info!("Report run {} complete: {}", run_id, output_directory.display());
            self.report = None;
            self.events.emit(GeneratorEvent::ReportingChanged(false));
            self.events.emit(GeneratorEvent::ReportComplete(output_directory));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(types: &[&str]) -> ReportRun {
        let request = ReportRequest {
            from: 0.0,
            duration: 86400.0,
            size: PixelSize::new(1024, 768),
        };
        ReportRun::new(
            1,
            request,
            PathBuf::from("/reports/2024-01-01_00-00-00"),
            types.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn walks_types_front_to_back() {
        let mut r = run(&["cpu", "mem"]);
        assert_eq!(r.total_count, 2);
        assert_eq!(r.next_type(), Some((1, "cpu".to_string())));
        assert_eq!(r.outstanding(), 1);
        assert!(!r.is_finished());
        assert_eq!(r.next_type(), Some((2, "mem".to_string())));
        assert_eq!(r.next_type(), None);
        assert_eq!(r.unissued(), 0);

        r.record_completion();
        assert!(!r.is_finished());
        r.record_completion();
        assert!(r.is_finished());
        // late duplicates cannot overshoot
        r.record_completion();
        assert_eq!(r.completed_count, 2);
    }

    #[test]
    fn empty_run_is_finished_immediately() {
        assert!(run(&[]).is_finished());
    }

    #[test]
    fn file_names_follow_position_and_type() {
        let r = run(&["cpu/load"]);
        assert_eq!(
            r.output_path(1, "cpu/load", "png"),
            PathBuf::from("/reports/2024-01-01_00-00-00/001_cpu_load.png")
        );
    }
}
