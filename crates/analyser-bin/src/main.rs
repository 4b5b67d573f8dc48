//! `mech-analyser` entrypoint: capture a thermal printout over the serial
//! link, decode a captured PNG into a classified descriptor, or render a
//! tinted overlay preview of one.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_font::Font;
use core_overlay::Overlay;
use core_worker::{Request, Response, Worker};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "mech-analyser", version, about = "Thermal printhead burn capture and decoder")]
struct Args {
    /// Optional configuration file path (overrides discovery of `mech-analyser.toml`).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Capture a printout from the serial link for a fixed duration.
    Capture {
        /// Serial device override (defaults to the config file's `[serial]` section).
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
        /// Output PNG path; defaults to `<capture.output_dir>/capture.png`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Decode a captured printout PNG into a classified descriptor.
    Decode {
        input: PathBuf,
        /// Font JSON paths; defaults to the config file's `[fonts]` section.
        #[arg(long = "font")]
        fonts: Vec<PathBuf>,
        #[arg(long)]
        bold: bool,
        /// Write the descriptor as JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Render a tinted black/white preview of a printout PNG.
    RenderOverlay {
        input: PathBuf,
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    install_panic_hook();

    let config = core_config::load_from(args.config.clone())
        .context("failed to load configuration")?;

    match args.command {
        CliCommand::Capture {
            port,
            baud,
            duration_secs,
            output,
        } => run_capture(&config, port, baud, duration_secs, output),
        CliCommand::Decode {
            input,
            fonts,
            bold,
            output,
        } => run_decode(&config, input, fonts, bold, output),
        CliCommand::RenderOverlay { input, output } => run_render_overlay(input, output),
    }
}

fn configure_logging() -> Result<WorkerGuard> {
    let log_dir = Path::new(".");
    let file_appender = tracing_appender::rolling::never(log_dir, "mech-analyser.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn run_capture(
    config: &core_config::Config,
    port: Option<String>,
    baud: Option<u32>,
    duration_secs: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    let port = port.unwrap_or_else(|| config.file.serial.port.clone());
    let baud = baud.unwrap_or(config.file.serial.baud);
    let output =
        output.unwrap_or_else(|| PathBuf::from(&config.file.capture.output_dir).join("capture.png"));

    info!(target: "capture", %port, baud, duration_secs, output = %output.display(), "starting_capture");

    let transport = core_serial::SerialTransport::open(&port, baud)
        .with_context(|| format!("failed to open serial port {port}"))?;
    let worker = Worker::spawn(Box::new(transport));
    worker.send(Request::RecordingStart)?;

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }

    worker.send(Request::RecordingStop)?;
    worker.send(Request::PrintoutTake)?;
    let Response::Printout(printout) = worker.recv()?;
    worker.shutdown();

    match printout {
        Some(printout) => {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            printout.save(&output)?;
            info!(target: "capture", rows = printout.length(), output = %output.display(), "capture_saved");
        }
        None => warn!(target: "capture", "capture_produced_no_rows"),
    }

    Ok(())
}

fn load_fonts(config: &core_config::Config, overrides: Vec<PathBuf>, bold: bool) -> Result<Vec<Font>> {
    let paths: Vec<PathBuf> = if overrides.is_empty() {
        config
            .file
            .fonts
            .paths
            .iter()
            .map(|s| PathBuf::from(s.as_str()))
            .collect()
    } else {
        overrides
    };

    let bold = bold || config.file.fonts.bold;

    let mut fonts = Vec::with_capacity(paths.len());
    for path in paths {
        let font = Font::from_json(&path)
            .with_context(|| format!("failed to load font {}", path.display()))?;
        fonts.push(if bold { font.into_bold() } else { font });
    }
    Ok(fonts)
}

fn run_decode(
    config: &core_config::Config,
    input: PathBuf,
    fonts: Vec<PathBuf>,
    bold: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let printout = core_bitmap::Printout::load(&input)
        .with_context(|| format!("failed to load printout {}", input.display()))?;
    let fonts = load_fonts(config, fonts, bold)?;

    let descriptor = core_descriptor::PrintoutDescriptor::new(printout, fonts);
    let json = serde_json::to_string_pretty(descriptor.contents())?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            info!(target: "decode", output = %path.display(), "descriptor_written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_render_overlay(input: PathBuf, output: PathBuf) -> Result<()> {
    let printout = core_bitmap::Printout::load(&input)
        .with_context(|| format!("failed to load printout {}", input.display()))?;
    let overlay = Overlay::from_printout(&printout);
    overlay
        .save(&output)
        .with_context(|| format!("failed to save overlay {}", output.display()))?;
    info!(target: "render_overlay", output = %output.display(), "overlay_saved");
    Ok(())
}
