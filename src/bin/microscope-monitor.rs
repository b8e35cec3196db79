//! microscope-monitor
//!
//! Headless host: builds the camera grid from the stored settings, keeps
//! every camera acquiring, logs per-camera statistics, and writes the
//! settings back on Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use microscope_core::config::MonitorConfig;
use microscope_core::plugins::PluginSet;
use microscope_core::settings::{SettingsStore, MAIN_WINDOW_GROUP};
use microscope_core::view::{CameraView, Container, ScaleHint, ViewFactory, WindowGeometry};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Display refresh period
const PUMP_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Parser)]
#[command(name = "microscope-monitor", version, about = "Monitor a grid of network cameras")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings file (defaults to the platform config directory)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `info` or `microscope_core=debug`
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Grid columns, overriding the stored value
    #[arg(long)]
    cols: Option<usize>,

    /// Grid rows, overriding the stored value
    #[arg(long)]
    rows: Option<usize>,

    /// Camera URLs for views 0, 1, ... overriding the stored values
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Camera to show in the main view: a settings group or a URL
    #[arg(long)]
    main: Option<String>,

    /// Seconds between statistics reports
    #[arg(long, default_value_t = 10)]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    microscope_core::init_logging(&args.log_level)?;

    let config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let settings_path = match args.settings.clone().or(config.settings_path.clone()) {
        Some(path) => path,
        None => SettingsStore::default_path()?,
    };
    let mut store = SettingsStore::load(&settings_path)
        .with_context(|| format!("failed to load settings {}", settings_path.display()))?;

    let plugins = PluginSet::standard().with_record_config(config.record.clone());
    let factory = ViewFactory::http(plugins, config.acquisition.clone())?;
    let mut container = Container::new(factory.clone())?;

    let geometry = {
        let mut root = store.scope();
        let mut window = root.group(MAIN_WINDOW_GROUP);
        container.read_settings(&mut window)?;
        WindowGeometry::read_settings(&window)
    };
    info!(
        "Window {}x{} at ({}, {})",
        geometry.size.width, geometry.size.height, geometry.pos.x, geometry.pos.y
    );

    apply_overrides(&args, &mut container)?;

    let mut main_view = match &args.main {
        Some(key) => {
            let mut view = factory.build_main()?;
            view.set_scale(Some(ScaleHint::new(0, 500)));
            view.load_from(&store, key)
                .with_context(|| format!("failed to load {} into the main view", key))?;
            Some(view)
        }
        None => None,
    };

    container.start(true)?;
    info!("Monitoring {} cameras, press Ctrl-C to stop", container.count());

    let mut pump = interval(PUMP_PERIOD);
    pump.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(Duration::from_secs(args.stats_interval.max(1)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = pump.tick() => {
                container.pump();
                if let Some(view) = main_view.as_mut() {
                    view.pump();
                }
                persist_requested(&mut container, &mut store);
            }
            _ = report.tick() => {
                for (index, view) in container.views().enumerate() {
                    log_stats(&format!("camera {}", index), view);
                }
                if let Some(view) = main_view.as_ref() {
                    log_stats("main", view);
                }
            }
        }
    }

    {
        let mut root = store.scope();
        let mut window = root.group(MAIN_WINDOW_GROUP);
        geometry.write_settings(&mut window);
        container.write_settings(&mut window);
    }
    store.save().context("failed to write settings")?;

    if let Some(mut view) = main_view {
        view.shutdown()?;
    }
    container.shutdown()?;
    Ok(())
}

fn apply_overrides(args: &Args, container: &mut Container) -> Result<()> {
    if args.cols.is_some() || args.rows.is_some() {
        let (cols, rows) = container.size();
        container.set_size(args.cols.unwrap_or(cols), args.rows.unwrap_or(rows));
    }
    if container.count() < args.urls.len() {
        let (cols, _) = container.size();
        container.set_size(cols, args.urls.len().div_ceil(cols));
    }
    container.layout()?;

    for (index, url) in args.urls.iter().enumerate() {
        if let Some(view) = container.camera_mut(index) {
            view.set_url(url)
                .with_context(|| format!("invalid URL for camera {}", index))?;
        }
    }
    Ok(())
}

/// Write settings for any view whose plugins asked for it
fn persist_requested(container: &mut Container, store: &mut SettingsStore) {
    let mut dirty = false;
    for view in container.views_mut() {
        if view.take_persist_request() {
            if let Err(e) = view.save_to(store) {
                warn!("Failed to record settings: {}", e);
            }
            dirty = true;
        }
    }
    if dirty {
        if let Err(e) = store.save() {
            warn!("Failed to write settings: {}", e);
        }
    }
}

fn log_stats(label: &str, view: &CameraView) {
    let stats = view.stats();
    info!(
        "{} [{}] {}: ticks={}, fetches={}, skipped={}, delivered={}, dropped={}, errors={}",
        label,
        view.state(),
        view.settings().url,
        stats.ticks,
        stats.fetch_attempts,
        stats.skipped_ticks,
        stats.frames_delivered,
        stats.frames_dropped,
        stats.errors
    );
}
