//! `locrec` - CLI for locrecorder
//!
//! Runs a tracking session and inspects the saved location history.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use locrecorder::cli::{
    ClearCommand, Cli, Command, ConfigCommand, ListCommand, OutputFormat, StatusCommand,
    TrackCommand,
};
use locrecorder::clock::MonotonicClock;
use locrecorder::live_status::{LiveStatus, LogLiveStatus, StatusFile};
use locrecorder::location::{LocationPoint, RawPosition};
use locrecorder::storage::{LocationStore, SqliteStore};
use locrecorder::watcher::ReplayWatcher;
use locrecorder::{init_logging, Config, Recorder, Tracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Track(cmd) => handle_track(&config, cmd).await,
        Command::List(cmd) => handle_list(&config, &cmd).await,
        Command::Count => handle_count(&config).await,
        Command::Clear(cmd) => handle_clear(&config, &cmd).await,
        Command::Status(cmd) => handle_status(&config, &cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_store(config: &Config) -> anyhow::Result<(Arc<SqliteStore>, LocationStore)> {
    let path = config.database_path();
    let kv = Arc::new(
        SqliteStore::open(&path)
            .with_context(|| format!("opening database {}", path.display()))?,
    );
    let locations = LocationStore::new(kv.clone(), config.storage.locations_key.clone());
    Ok((kv, locations))
}

async fn handle_track(config: &Config, cmd: TrackCommand) -> anyhow::Result<()> {
    let period = Duration::from_millis(cmd.fix_period_ms);
    let watcher = match (&cmd.replay, cmd.lat, cmd.lon) {
        (Some(path), _, _) => ReplayWatcher::from_file(path, period)
            .with_context(|| format!("loading replay {}", path.display()))?,
        (None, Some(lat), Some(lon)) => {
            ReplayWatcher::fixed(RawPosition::new(lat, lon, cmd.accuracy), period)
        }
        _ => bail!("track needs --replay FILE or --lat/--lon"),
    };
    let watcher = watcher.looping(!cmd.no_loop);

    let (_, locations) = open_store(config)?;
    let recorder = Arc::new(Recorder::new(
        config.recorder_options(),
        locations,
        Arc::new(MonotonicClock::new()),
    ));

    let surface: Arc<dyn LiveStatus> = if config.live_status.enabled {
        Arc::new(StatusFile::new(config.status_path()))
    } else {
        Arc::new(LogLiveStatus)
    };
    let tracker = Tracker::new(
        recorder.clone(),
        config.tracking.platform,
        config.watcher_config(),
    )
    .with_live_status(surface);
    if cmd.background {
        tracker.lifecycle().enter_background();
    }

    let mut updates = recorder.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => println!(
                    "#{}  {}  ({})",
                    update.saved_count,
                    format_position(&update.point),
                    update.point.date_string
                ),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!(
        "Tracking on {} every {}s (Ctrl-C to stop)",
        config.tracking.platform,
        config.interval().as_secs_f64()
    );

    let duration = cmd.duration_secs.map(Duration::from_secs);
    let shutdown = async move {
        match duration {
            Some(limit) => {
                tokio::select! {
                    () = tokio::time::sleep(limit) => {}
                    () = interrupted() => {}
                }
            }
            None => interrupted().await,
        }
    };

    let summary = tracker.run(watcher, shutdown).await?;

    drop(tracker);
    drop(recorder);
    let _ = printer.await;

    println!();
    println!("Saved {} new location(s)", summary.saved);
    println!("Total saved locations: {}", summary.location_count);
    if summary.failed_saves > 0 {
        println!("Failed saves: {}", summary.failed_saves);
    }
    Ok(())
}

async fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let (_, locations) = open_store(config)?;
    let points = locations.load().await.context("reading saved locations")?;
    let total = points.len();
    let limit = cmd.limit.unwrap_or(total);

    // Newest first, numbered by position in the history.
    let newest: Vec<(usize, &LocationPoint)> = points
        .iter()
        .enumerate()
        .rev()
        .take(limit)
        .map(|(i, p)| (i + 1, p))
        .collect();

    match cmd.format {
        OutputFormat::Json => {
            let selected: Vec<&LocationPoint> = newest.iter().map(|(_, p)| *p).collect();
            println!("{}", serde_json::to_string_pretty(&selected)?);
        }
        OutputFormat::Plain => {
            if newest.is_empty() {
                println!("No locations saved yet.");
            }
            for (n, point) in &newest {
                println!("#{n}  {}", format_position(point));
                println!("    {}", point.date_string);
                if let Some(accuracy) = point.display_accuracy() {
                    println!("    Accuracy: \u{b1}{accuracy:.0}m");
                }
            }
        }
        OutputFormat::Table => {
            println!(
                "{:>5}  {:>11}  {:>12}  {:>9}  DATE",
                "#", "LATITUDE", "LONGITUDE", "ACCURACY"
            );
            for (n, point) in &newest {
                let accuracy = point
                    .display_accuracy()
                    .map_or_else(|| "-".to_string(), |a| format!("{a:.0}m"));
                println!(
                    "{n:>5}  {:>11.6}  {:>12.6}  {accuracy:>9}  {}",
                    point.latitude, point.longitude, point.date_string
                );
            }
        }
    }
    Ok(())
}

async fn handle_count(config: &Config) -> anyhow::Result<()> {
    let (_, locations) = open_store(config)?;
    println!("{}", locations.count().await?);
    Ok(())
}

async fn handle_clear(config: &Config, cmd: &ClearCommand) -> anyhow::Result<()> {
    let (_, locations) = open_store(config)?;
    let count = locations.count().await?;
    if !cmd.yes {
        println!("This will delete {count} saved location(s).");
        println!("Use --yes to confirm.");
        return Ok(());
    }
    locations.clear().await.context("clearing saved locations")?;
    println!("Cleared {count} location(s).");
    Ok(())
}

async fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let (kv, locations) = open_store(config)?;
    let count = locations.count().await?;
    let stats = kv.stats()?;
    let live = StatusFile::new(config.status_path()).read().await?;

    if cmd.json {
        let status = serde_json::json!({
            "platform": config.tracking.platform,
            "interval_ms": config.tracking.interval_ms,
            "database_path": config.database_path(),
            "location_count": count,
            "storage": stats,
            "live_status": live,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("locrec status");
    println!("-------------");
    println!("Platform:      {}", config.tracking.platform);
    println!("Interval:      {}s", config.interval().as_secs_f64());
    println!("Database:      {}", config.database_path().display());
    println!("Locations:     {count}");
    println!("Database size: {} bytes", stats.db_size_bytes);
    if let Some(last) = &stats.last_write {
        println!("Last write:    {last}");
    }
    match live {
        Some(state) => {
            let tracking = if state.is_tracking { "active" } else { "stopped" };
            println!(
                "Tracking:      {tracking} (updated {}, {} saved)",
                state.last_update_time, state.location_count
            );
        }
        None => println!("Tracking:      never started"),
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                let watcher = config.watcher_config();
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:       {}", config.database_path().display());
                println!("  Locations key:       {}", config.storage.locations_key);
                println!();
                println!("[Tracking]");
                println!("  Interval (ms):       {}", config.tracking.interval_ms);
                println!("  Platform:            {}", config.tracking.platform);
                println!();
                println!("[Watcher]");
                println!("  Background title:    {}", watcher.background_title);
                println!("  Request permissions: {}", watcher.request_permissions);
                println!("  Accept stale fixes:  {}", watcher.stale);
                println!("  Distance filter (m): {}", watcher.distance_filter);
                println!();
                println!("[Live status]");
                println!("  Enabled:             {}", config.live_status.enabled);
                println!("  Status file:         {}", config.status_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let result = match &file {
                Some(path) => {
                    println!("Validating configuration: {}", path.display());
                    Config::load_file(path)
                }
                None => {
                    let path = Config::default_config_path();
                    println!("Validating configuration: {}", path.display());
                    Config::load_from(Some(path))
                }
            };
            match result {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C; stop with --duration-secs or a kill signal");
        std::future::pending::<()>().await;
    }
}

fn format_position(point: &LocationPoint) -> String {
    format!("{:.6}, {:.6}", point.latitude, point.longitude)
}
