use clap::Parser;
use screenwatch::action::EnigoDriver;
use screenwatch::{
    CaptureManager, ConfigTree, Engine, EngineParts, EngineSettings, ItemPath, Rect,
    RebuildSummary,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

const STATUS_POLL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about = "Screenwatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Build the template cache, print the load report and exit.
    #[arg(long)]
    check: bool,
    /// Override the capture backend ("monitor" or "universal").
    #[arg(long)]
    capture: Option<String>,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
struct AreaConfig {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    settings: EngineSettings,
    tree: ConfigTree,
    area: Option<AreaConfig>,
    /// Run time; unset runs until capture halts.
    duration_secs: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SkippedRecord {
    path: ItemPath,
    reason: String,
}

#[derive(Debug, Serialize)]
struct RebuildRecord {
    generation: u64,
    loaded: usize,
    skipped: Vec<SkippedRecord>,
    elapsed_ms: u128,
}

impl From<RebuildSummary> for RebuildRecord {
    fn from(value: RebuildSummary) -> Self {
        Self {
            generation: value.generation,
            loaded: value.loaded,
            skipped: value
                .skipped
                .into_iter()
                .map(|(path, reason)| SkippedRecord { path, reason })
                .collect(),
            elapsed_ms: value.elapsed.as_millis(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("screenwatch=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let mut config: Config = serde_json::from_str(&config_text)?;
    if let Some(method) = cli.capture {
        config.settings.capture.method = method;
    }
    if config.settings.lifecycle.enabled {
        tracing::warn!("lifecycle recovery needs a window locator; disabled in the CLI");
        config.settings.lifecycle.enabled = false;
    }
    if config.tree.root_dir.is_relative() {
        if let Some(dir) = cli.config.parent() {
            config.tree.root_dir = dir.join(&config.tree.root_dir);
        }
    }

    let capture = CaptureManager::desktop(&config.settings.capture.method);
    let engine = Engine::new(EngineParts {
        settings: config.settings,
        tree: config.tree,
        capture,
        input: Box::new(EnigoDriver::new()?),
        activator: None,
        ocr: None,
        lifecycle: None,
    })?;

    if let Some(area) = &config.area {
        // The cache is built below with the resulting window scale.
        let _ = engine.set_recognition_area(
            Rect::new(area.x, area.y, area.width, area.height),
            None,
        )?;
    }
    let summary = loop {
        match engine.rebuild_now() {
            Err(screenwatch::EngineError::RebuildInProgress) => {
                std::thread::sleep(STATUS_POLL);
            }
            other => break other?,
        }
    };
    println!("{}", serde_json::to_string_pretty(&RebuildRecord::from(summary))?);
    if cli.check {
        return Ok(());
    }

    engine.start_monitoring()?;
    let started = Instant::now();
    let limit = config.duration_secs.map(Duration::from_secs_f64);
    while engine.is_running() && limit.map_or(true, |limit| started.elapsed() < limit) {
        std::thread::sleep(STATUS_POLL);
    }
    if engine.is_running() {
        engine.stop_monitoring()?;
    }
    println!("{}", serde_json::to_string_pretty(&engine.status())?);
    Ok(())
}
