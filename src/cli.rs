//
// cli.rs
// Dicom-Harmonize
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the processing session.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::batch::{self, BatchTask};
use crate::config::SessionConfig;
use crate::image::PngVisualizer;
use crate::merge::MergeMode;
use crate::models::PixelBuffer;
use crate::protocol::ExportFormat;
use crate::session::ProcessingSession;
use crate::stats;
use crate::window::{DisplayRange, WindowSettings};

#[derive(Parser)]
#[command(name = "dicom-harmonize")]
#[command(about = "Harmonização de protocolos e pixels DICOM entre fabricantes", long_about = None)]
pub struct Cli {
    /// Session configuration (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Accept unknown manufacturers through the generic adapter
    #[arg(long, global = true)]
    pub fallback: bool,
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolved adapter, geometry and protocol summary
    Info { file: PathBuf },
    /// Export the normalized protocol
    Protocol {
        file: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply a window/level and write PNGs
    Window {
        file: PathBuf,
        #[arg(long)]
        width: f64,
        #[arg(long)]
        level: f64,
        #[arg(long, value_enum)]
        display: Option<DisplayOutput>,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Merge several same-shape series into one multi-channel buffer
    Merge {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = Mode::Stack)]
        mode: Mode,
        /// Comma separated, one per file (weighted mode)
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f32>>,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Experimental gray/white matter segmentation
    Segment {
        file: PathBuf,
        #[arg(long, requires = "window_level")]
        window_width: Option<f64>,
        #[arg(long, requires = "window_width")]
        window_level: Option<f64>,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Calculate statistics of the normalized pixels
    Stats {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate an intensity histogram of the normalized pixels
    Histogram {
        file: PathBuf,
        #[arg(long, default_value_t = 256)]
        bins: usize,
    },
    /// Batch processing over a directory
    Batch {
        #[arg(short, long)]
        directory: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, value_enum)]
        task: BatchOperation,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        #[arg(long)]
        width: Option<f64>,
        #[arg(long)]
        level: Option<f64>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Format {
    Json,
    Xml,
}

impl From<Format> for ExportFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::Json => ExportFormat::Json,
            Format::Xml => ExportFormat::Xml,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum DisplayOutput {
    Uint8,
    NormalizedFloat,
}

impl From<DisplayOutput> for DisplayRange {
    fn from(value: DisplayOutput) -> Self {
        match value {
            DisplayOutput::Uint8 => DisplayRange::Uint8,
            DisplayOutput::NormalizedFloat => DisplayRange::NormalizedFloat,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Mode {
    Stack,
    Weighted,
}

impl From<Mode> for MergeMode {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Stack => MergeMode::Stack,
            Mode::Weighted => MergeMode::Weighted,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum BatchOperation {
    Protocol,
    Window,
    Segment,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref(), cli.fallback)?;

    match cli.command {
        Commands::Info { file } => {
            let session = open(&file, config)?;
            print_info(&session);
        }
        Commands::Protocol {
            file,
            format,
            output,
        } => {
            let session = open(&file, config)?;
            let document = session.get_protocol_info(format.into())?;
            match output {
                Some(path) => std::fs::write(&path, document)
                    .with_context(|| format!("Failed to write {:?}", path))?,
                None => println!("{}", document),
            }
        }
        Commands::Window {
            file,
            width,
            level,
            display,
            output,
        } => {
            let mut config = config;
            if let Some(display) = display {
                config.display_range = display.into();
            }
            let mut session = open(&file, config)?;
            session.adjust_window(width, level)?;
            session.visualize_results(&PngVisualizer::new(&output, file_stem(&file)))?;
            println!("Windowed images written to {:?}", output);
        }
        Commands::Merge {
            files,
            mode,
            weights,
            output,
        } => {
            let mut session = open(&files[0], config.clone())?;
            let others = files[1..]
                .iter()
                .map(|path| {
                    let other = open(path, config.clone())?;
                    other
                        .pixel_data()
                        .cloned()
                        .ok_or_else(|| anyhow!("No pixel data for {:?}", path))
                })
                .collect::<anyhow::Result<Vec<PixelBuffer>>>()?;
            let merged = session.merge_channels(&others, mode.into(), weights.as_deref())?;
            session.visualize_results(&PngVisualizer::new(&output, file_stem(&files[0])))?;
            println!("Merged {} buffers into shape {:?}", files.len(), merged.shape());
        }
        Commands::Segment {
            file,
            window_width,
            window_level,
            output,
        } => {
            let mut config = config;
            if let (Some(width), Some(level)) = (window_width, window_level) {
                config.default_window = Some(WindowSettings::new(width, level));
            }
            let mut session = open(&file, config)?;
            let masks = session.segment_gray_white_matter()?;
            session.visualize_results(&PngVisualizer::new(&output, file_stem(&file)))?;
            println!("Segmentation (experimental) for {:?}", file);
            println!("  Gray matter pixels:  {}", masks.gray_count());
            println!("  White matter pixels: {}", masks.white_count());
        }
        Commands::Stats { file, json } => {
            let session = open(&file, config)?;
            let pixels = loaded_pixels(&session)?;
            let summary = stats::pixel_statistics(pixels);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Pixel statistics for {:?}", file);
                println!("  Shape: {:?}", summary.shape);
                println!("  Min: {:.2}", summary.min);
                println!("  Max: {:.2}", summary.max);
                println!("  Mean: {:.2}", summary.mean);
                if let Some(median) = summary.median {
                    println!("  Median: {:.2}", median);
                }
                println!("  Std Dev: {:.2}", summary.std_dev);
                println!("  Total pixels: {}", summary.total_pixels);
            }
        }
        Commands::Histogram { file, bins } => {
            if bins == 0 {
                bail!("Number of bins must be greater than zero");
            }
            let session = open(&file, config)?;
            let histogram = stats::histogram_for_buffer(loaded_pixels(&session)?, bins);
            let total: u64 = histogram.bins.iter().sum();
            println!(
                "Histogram for {:?} | bins: {} | total pixels: {}",
                file,
                histogram.bins.len(),
                total
            );
            println!("  Min: {:.2}", histogram.min);
            println!("  Max: {:.2}", histogram.max);
            let range = (histogram.max - histogram.min) / histogram.bins.len() as f32;
            for (idx, count) in histogram.bins.iter().take(16).enumerate() {
                let start = histogram.min + (idx as f32) * range;
                let end = start + range;
                println!("  Bin {:03}: [{:.2}, {:.2}] -> {}", idx, start, end, count);
            }
            if histogram.bins.len() > 16 {
                println!("  ... {} more bins omitted", histogram.bins.len() - 16);
            }
        }
        Commands::Batch {
            directory,
            output,
            task,
            format,
            width,
            level,
        } => {
            let task = match task {
                BatchOperation::Protocol => BatchTask::Protocol(format.into()),
                BatchOperation::Window => {
                    let (width, level) = width
                        .zip(level)
                        .ok_or_else(|| anyhow!("Window batches need both --width and --level"))?;
                    BatchTask::Window(WindowSettings::new(width, level))
                }
                BatchOperation::Segment => BatchTask::Segment,
            };
            let summary = batch::process_directory(&directory, &output, task, &config)?;
            println!(
                "Processed {} of {} file(s)",
                summary.processed,
                summary.total()
            );
            for failure in &summary.failed {
                println!("  Failed: {:?}: {}", failure.path, failure.error);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>, fallback: bool) -> anyhow::Result<SessionConfig> {
    let mut config = match path {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("Failed to read configuration {:?}", path))?,
        None => SessionConfig::default(),
    };
    if fallback {
        config.fallback_adapter = true;
    }
    Ok(config)
}

fn open(file: &Path, config: SessionConfig) -> anyhow::Result<ProcessingSession> {
    let mut session = ProcessingSession::new(config);
    session
        .load(file)
        .with_context(|| format!("Failed to load {:?}", file))?;
    Ok(session)
}

fn loaded_pixels(session: &ProcessingSession) -> anyhow::Result<&PixelBuffer> {
    session
        .pixel_data()
        .ok_or_else(|| anyhow!("No dataset loaded"))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn print_info(session: &ProcessingSession) {
    let (Some(state), Some(dataset)) = (session.state(), session.dataset()) else {
        return;
    };
    let geometry = dataset.geometry();
    println!("Source: {}", state.source);
    println!("Adapter: {}", state.adapter.name());
    println!(
        "Geometry: {} frame(s) of {}x{}",
        geometry.frames, geometry.rows, geometry.columns
    );
    if let Some((min, max)) = state.pixels.finite_range() {
        println!("Normalized range: [{:.2}, {:.2}]", min, max);
    }
    println!("Protocol parameters: {}", state.protocol.len());
    for (name, parameter) in state.protocol.iter() {
        let unit = parameter.unit.as_deref().unwrap_or("");
        let flag = if parameter.out_of_range() { "  (out of range)" } else { "" };
        println!("  {}: {} {}{}", name, parameter.value, unit, flag);
    }
}
