use std::path::{Path, PathBuf};

use beatscope_core::{AppConfig, TuningProfile};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod pipeline;
mod wav;

use pipeline::{AnalysisReport, Pipeline};

fn main() -> beatscope_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            tuning,
            fps,
        } => run_analyze(&input, output.as_deref(), &tuning, fps),
        Commands::Demo {
            bpm,
            seconds,
            tuning,
            fps,
        } => run_demo(bpm, seconds, &tuning, fps),
        Commands::Config { tuning } => run_config(&tuning),
    }
}

fn run_analyze(
    input: &Path,
    output: Option<&Path>,
    tuning: &TuningArgs,
    fps: u32,
) -> beatscope_core::Result<()> {
    tracing::info!(?input, ?output, "analysing audio file");

    let config = tuning.resolve()?;
    let audio = wav::read_mono(input)?;
    let mut pipeline = Pipeline::new(audio.sample_rate, &config, fps)?;
    let beats = pipeline.run(&audio.samples)?;

    let report = AnalysisReport {
        source: input.display().to_string(),
        duration_seconds: audio.duration_seconds(),
        frames_per_second: pipeline.frames_per_second(),
        summary: pipeline.summary().clone(),
        beats,
    };
    tracing::info!(
        beats = report.summary.beats,
        tempo_bpm = ?report.summary.tempo_bpm,
        "analysis finished"
    );

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_demo(bpm: f32, seconds: f32, tuning: &TuningArgs, fps: u32) -> beatscope_core::Result<()> {
    tracing::info!(bpm, seconds, "running synthetic click track");

    let config = tuning.resolve()?;
    let audio = wav::click_track(44_100, bpm, seconds, 0.25);
    let mut pipeline = Pipeline::new(audio.sample_rate, &config, fps)?;
    let beats = pipeline.run(&audio.samples)?;

    let summary = pipeline.summary();
    tracing::info!(
        beats = beats.len(),
        frames = summary.frames,
        tempo_bpm = ?summary.tempo_bpm,
        "demo finished"
    );
    Ok(())
}

fn run_config(tuning: &TuningArgs) -> beatscope_core::Result<()> {
    let config = tuning.resolve()?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spectrum analysis and beat detection for visualisers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect beats in a WAV file and emit a JSON report.
    Analyze {
        /// Path to the WAV file that should be analysed.
        input: PathBuf,
        /// Where to write the report. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Animation frames per second to simulate.
        #[arg(long, default_value_t = 60)]
        fps: u32,
    },
    /// Run the pipeline over a synthetic kick drum pattern.
    Demo {
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        #[arg(long, default_value_t = 8.0)]
        seconds: f32,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long, default_value_t = 60)]
        fps: u32,
    },
    /// Print the effective configuration as JSON.
    Config {
        #[command(flatten)]
        tuning: TuningArgs,
    },
}

#[derive(clap::Args, Debug)]
struct TuningArgs {
    /// JSON configuration file. Takes precedence over `--profile`.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Beat detector tuning profile (`responsive` or `steady`).
    #[arg(long, default_value_t = TuningProfile::Responsive)]
    profile: TuningProfile,
}

impl TuningArgs {
    fn resolve(&self) -> beatscope_core::Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load(path),
            None => Ok(AppConfig {
                beat: self.profile.beat_config(),
                ..Default::default()
            }),
        }
    }
}
