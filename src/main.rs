use candle_mosaic::config::{self, AppConfig};
use candle_mosaic::db::Database;
use candle_mosaic::imaging::RustBackend;
use candle_mosaic::notify::{MOSAIC_TOPIC, Notifier};
use candle_mosaic::service::MosaicService;
use candle_mosaic::storage::FileStorage;
use candle_mosaic::worker::RenderWorker;
use candle_mosaic::{logging, output};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "candle-mosaic")]
#[command(about = "Photo mosaic engine for live events")]
#[command(long_about = "\
Photo mosaic engine for live events

Guests' photos become the cells of a large mosaic that approximates an
emblem image. Each new photo lands in the cell whose tone it matches best;
once every cell is taken, the longest-held cell is replaced.

Event directory layout (all paths configurable in mosaic.toml):

  event/
  ├── mosaic.toml                  # Optional config
  ├── mosaic.db                    # Photo catalog and saved settings
  ├── uploads/                     # Raw uploads, <id>_<name>
  │   └── processed/               # Square crops used as cells
  ├── self_uploads/                # Drop files here; picked up on sync
  └── static/
      ├── base/emblem.png          # Image the mosaic approximates
      └── output/current_mosaic.jpg

Run 'candle-mosaic gen-config' to generate a documented mosaic.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory holding mosaic.toml; relative paths resolve against it
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile uploads, processed crops, drop folder and catalog
    Sync,
    /// Ingest photo files and render the mosaic
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Repaint the mosaic from the current grid
    Render,
    /// Rebuild the grid and re-place every cataloged photo
    Regenerate,
    /// Show or change mosaic settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Show participant count and grid fill
    Stats,
    /// Delete every photo and render an empty mosaic
    Reset {
        /// Must be the word "reset"
        #[arg(long)]
        confirm: String,
    },
    /// Keep ingesting photos from the drop folder
    Watch {
        /// Seconds between drop folder polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Print a stock mosaic.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the active settings
    Show,
    /// Change settings; sizes are clamped to their allowed ranges
    Set {
        /// Cells across and down
        #[arg(long, num_args = 2, value_names = ["W", "H"])]
        grid: Option<Vec<u32>>,
        /// Mosaic size in pixels
        #[arg(long, num_args = 2, value_names = ["W", "H"])]
        output: Option<Vec<u32>>,
        #[arg(long)]
        emblem: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        subtitle: Option<String>,
        /// Re-place every existing photo after the change
        #[arg(long)]
        regenerate: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let app = config::load_config(&cli.config_dir)?;
    logging::init(&app.logging.level);
    info!(version = version_string(), config_dir = %cli.config_dir.display(), "starting");
    let service = Arc::new(build_service(&app, &cli.config_dir)?);
    match service.load_settings() {
        Ok(_) => {}
        // Settings commands must still work when the stored emblem is gone
        Err(e) if matches!(cli.command, Command::Settings(_)) => {
            warn!(error = %e, "mosaic grid unavailable");
        }
        Err(e) => return Err(e.into()),
    }

    match cli.command {
        Command::Sync => {
            let report = service.sync();
            output::print_sync_report(&report);
        }
        Command::Add { files } => {
            output::print_sync_report(&service.sync());
            let mut placed = 0;
            for (i, path) in files.iter().enumerate() {
                let name = path.display().to_string();
                match service.ingest_file(path) {
                    Ok(placement) => {
                        placed += 1;
                        println!("{}", output::format_placement(i + 1, &name, &placement));
                    }
                    Err(e) => {
                        println!("{}", output::format_failed_placement(i + 1, &name, &e.to_string()));
                    }
                }
            }
            if placed > 0 {
                output::print_render_report(&service.render()?);
            }
        }
        Command::Render => {
            output::print_render_report(&service.render()?);
        }
        Command::Regenerate => {
            output::print_regenerate_report(&service.regenerate()?);
        }
        Command::Settings(SettingsCommand::Show) => {
            output::print_settings(&service.settings());
        }
        Command::Settings(SettingsCommand::Set {
            grid,
            output: output_size,
            emblem,
            title,
            subtitle,
            regenerate,
        }) => {
            let mut next = service.settings();
            if let Some(pair) = grid.as_deref().and_then(as_pair) {
                next.grid_size = pair;
            }
            if let Some(pair) = output_size.as_deref().and_then(as_pair) {
                next.output_size = pair;
            }
            if let Some(emblem) = emblem {
                next.emblem_path = emblem;
            }
            if let Some(title) = title {
                next.title = title;
            }
            if let Some(subtitle) = subtitle {
                next.subtitle = subtitle;
            }
            next.regenerate_existing = regenerate;
            let rebuilt = service.update_settings(next.clamped())?;
            println!("{}", output::format_settings_applied(rebuilt));
            output::print_settings(&service.settings());
        }
        Command::Stats => {
            let participants = service.participant_count()?;
            output::print_stats(participants, &service.grid_snapshot()?);
        }
        Command::Reset { confirm } => {
            if confirm != "reset" {
                return Err("refusing to reset: pass --confirm reset".into());
            }
            output::print_render_report(&service.reset_all()?);
        }
        Command::Watch { interval } => {
            watch(service, Duration::from_secs(interval.max(1)))?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Startup wiring: database, file areas, notifier, engine.
fn build_service(app: &AppConfig, base: &Path) -> Result<MosaicService, Box<dyn std::error::Error>> {
    let database = Arc::new(Database::open(&config::resolve(base, &app.paths.database))?);
    let storage = FileStorage::new(
        config::resolve(base, &app.paths.upload_dir),
        config::resolve(base, &app.paths.processed_dir),
        config::resolve(base, &app.paths.drop_dir),
    )?;
    let notifier = Arc::new(Notifier::new(
        app.notify.history_size,
        app.notify.send_history,
    ));
    Ok(MosaicService::new(
        Arc::new(RustBackend::new()),
        database.clone(),
        database,
        storage,
        notifier,
        app.render_target(base),
        app.default_settings(base),
    ))
}

fn as_pair(values: &[u32]) -> Option<(u32, u32)> {
    match values {
        [a, b] => Some((*a, *b)),
        _ => None,
    }
}

/// Sync once, then ingest whatever lands in the drop folder until killed.
fn watch(service: Arc<MosaicService>, interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let events = service.notifier().subscribe(MOSAIC_TOPIC);
    let printer = std::thread::spawn(move || {
        for event in events {
            println!("{}", output::format_event(&event));
        }
    });

    output::print_sync_report(&service.sync());
    let worker = RenderWorker::spawn(service.clone());
    worker.request();

    let mut rejected = HashSet::new();
    let mut count = 0;
    loop {
        let poll = service.poll_drop_folder(&rejected);
        let ingested = poll.placed.len();
        for (name, placement) in &poll.placed {
            count += 1;
            println!("{}", output::format_placement(count, name, placement));
        }
        // Left in place for the operator; not retried this session
        for (name, e) in poll.failed {
            count += 1;
            println!("{}", output::format_failed_placement(count, &name, &e.to_string()));
            rejected.insert(name);
        }
        if ingested > 0 && !worker.request() {
            break;
        }
        std::thread::sleep(interval);
    }

    let renders = worker.shutdown();
    info!(renders, "watch stopped");
    drop(service);
    printer.join().ok();
    Ok(())
}
