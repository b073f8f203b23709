// Command line front-end: renders one image or one report through the renderer.
// The lib.rs file carries everything else.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use plotgen_lib::{
    GeneratorConfig, GeneratorEvent, GeneratorHandle, ImageRequest, PixelSize, ReportRequest, TokioLauncher,
    spawn_generator,
};

const CLI_CALLER: i64 = 1;

#[derive(Parser, Debug)]
#[command(name = "plotgen", about = "Render time-series plots through rrdtool")]
struct Cli {
    /// JSON object mapping image type names to command templates
    #[arg(long)]
    types: PathBuf,

    /// Generator configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Working directory of the renderer
    #[arg(long)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single image and print its path
    Image {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        from: f64,
        #[arg(long)]
        duration: f64,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long)]
        full_size: bool,
    },
    /// Render every type into a new report directory and print it
    Report {
        #[arg(long)]
        from: f64,
        #[arg(long)]
        duration: f64,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr) // stdout carries the result
        .compact()
        .init();
}

/// Reads `{"type": "template" | {"command": ..., ...}}`.
fn load_types(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let command = match value {
                serde_json::Value::String(template) => template,
                other => other.to_string(),
            };
            (name, command)
        })
        .collect())
}

async fn wait_ready(events: &mut UnboundedReceiver<GeneratorEvent>) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            GeneratorEvent::ReadyChanged(true) => return Ok(()),
            GeneratorEvent::RendererError(message) => bail!("renderer failed to start: {message}"),
            other => debug!("Ignoring {:?} while starting", other),
        }
    }
    bail!("generator stopped before the renderer became ready")
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(workdir) = &cli.workdir {
        config.working_directory = workdir.clone();
    }
    let types = load_types(&cli.types)?;

    let (handle, mut events, task) = spawn_generator(config, Box::new(TokioLauncher::new()))?;
    let outcome = drive(&handle, &mut events, &types, cli.command).await;

    handle.shutdown().ok();
    if let Err(e) = task.await {
        warn!("Generator task ended abnormally: {}", e);
    }
    outcome
}

async fn drive(
    handle: &GeneratorHandle,
    events: &mut UnboundedReceiver<GeneratorEvent>,
    types: &BTreeMap<String, String>,
    command: Command,
) -> Result<()> {
    for (name, template) in types {
        handle
            .register_image_type(name, template)
            .await
            .with_context(|| format!("registering image type {name}"))?;
    }
    handle.set_default_single_line_colors()?;
    handle.start().await?;
    wait_ready(events).await?;
    info!("Renderer ready with {} image types", types.len());

    match command {
        Command::Image {
            type_name,
            from,
            duration,
            width,
            height,
            full_size,
        } => {
            handle.get_image(ImageRequest {
                caller: CLI_CALLER,
                type_name,
                from,
                duration,
                size: PixelSize::new(width, height),
                full_size,
                current_fname: String::new(),
            })?;
            while let Some(event) = events.recv().await {
                match event {
                    GeneratorEvent::NewImage { path, .. } => {
                        // the scratch directory goes away with the generator
                        let target = std::env::current_dir()?.join(
                            path.file_name().context("rendered image has no file name")?,
                        );
                        std::fs::copy(&path, &target)
                            .with_context(|| format!("copying {}", path.display()))?;
                        println!("{}", target.display());
                        return Ok(());
                    }
                    GeneratorEvent::ImageFailed { error, .. } => bail!("rendering failed: {error}"),
                    GeneratorEvent::RendererError(message) => warn!("{}", message),
                    _ => {}
                }
            }
            bail!("generator stopped before the image was rendered")
        }
        Command::Report {
            from,
            duration,
            width,
            height,
        } => {
            let directory = handle
                .make_report(ReportRequest {
                    from,
                    duration,
                    size: PixelSize::new(width, height),
                })
                .await?;
            info!("Writing report into {}", directory.display());
            let mut failures = 0usize;
            while let Some(event) = events.recv().await {
                match event {
                    GeneratorEvent::ReportComplete(done) => {
                        println!("{}", done.display());
                        if failures > 0 {
                            bail!("{failures} report image(s) failed");
                        }
                        return Ok(());
                    }
                    GeneratorEvent::RendererError(message) => {
                        failures += 1;
                        warn!("{}", message);
                    }
                    GeneratorEvent::ProgressChanged(p) if p >= 0.0 => debug!("Report {:.0}%", p * 100.0),
                    _ => {}
                }
            }
            bail!("generator stopped before the report completed")
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    info!("=== plotgen starting ===");

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
