use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use raw_gallery::config::{self, Config};
use raw_gallery::library::scan_images;
use raw_gallery::logging;
use raw_gallery::state::{CacheStore, StoreConfig};
use raw_gallery::viewport::VirtualGrid;
use raw_gallery::{Decoder, LoadCoordinator, PreloadOutcome};

/// Viewport used for the simulated scroll session
const SIMULATED_VIEWPORT: (f64, f64) = (1280.0, 800.0);

/// Warm the thumbnail cache for a photo folder
#[derive(Debug, Parser)]
#[command(name = "raw-gallery", version, about)]
struct Cli {
    /// Folder with photos
    folder: PathBuf,

    /// Include subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Scroll through the grid afterwards, preloading ahead of the viewport
    #[arg(long)]
    simulate_scroll: bool,

    /// Expire old thumbnails and trim the store to its budget
    #[arg(long)]
    cleanup: bool,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config::load();
    config.validate()?;

    let store = match config::default_store_path() {
        Some(path) => match CacheStore::open(&path, StoreConfig::from(&config.pipeline)) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                log::warn!("Thumbnail store unavailable, decoding without it: {}", e);
                None
            }
        },
        None => {
            log::warn!("No data directory; thumbnails won't persist");
            None
        }
    };
    let coordinator = LoadCoordinator::new(&config, store, Arc::new(Decoder::default()))?;

    let folder = cli.folder.clone();
    let paths = tokio::task::spawn_blocking(move || scan_images(&folder, cli.recursive)).await?;
    if paths.is_empty() {
        log::info!("Nothing to do in {}", cli.folder.display());
        return Ok(());
    }

    let started = Instant::now();
    let step = (paths.len() / 10).max(1);
    let results = coordinator
        .load_thumbnail_batch(&paths, |done, total| {
            if done % step == 0 || done == total {
                log::info!("⏳ {}/{} thumbnails", done, total);
            }
        })
        .await;
    let failed = results.iter().filter(|r| r.is_none()).count();
    log::info!(
        "✅ {} thumbnails in {:.1}s ({} failed)",
        paths.len() - failed,
        started.elapsed().as_secs_f64(),
        failed
    );

    if cli.simulate_scroll {
        simulate_scroll(&coordinator, &config, &paths).await;
    }

    if cli.cleanup {
        let report = coordinator.cleanup_cache().await;
        log::info!("🧹 Cleanup: {} expired, {} evicted", report.expired, report.evicted);
    }

    let stats = coordinator.cache_statistics().await;
    println!(
        "📊 Disk: {} thumbnails, {:.1}MB | Memory: {} bitmaps, {:.1}MB",
        stats.disk_count,
        stats.disk_bytes as f64 / 1024.0 / 1024.0,
        stats.mem_count,
        stats.mem_bytes as f64 / 1024.0 / 1024.0
    );
    Ok(())
}

/// Fling down the grid then back up, the way a user skims a folder
async fn simulate_scroll(coordinator: &LoadCoordinator, config: &Config, paths: &[PathBuf]) {
    let (width, height) = SIMULATED_VIEWPORT;
    let mut grid = VirtualGrid::new(config.viewport.clone(), width, height, paths.len());
    let frame = Duration::from_millis(16);
    let speeds = [600.0, 1200.0, 2400.0, -2400.0, -600.0];

    for speed in speeds {
        for _ in 0..30 {
            let offset = grid.offset() + speed * frame.as_secs_f64();
            if let Some(request) = grid.set_offset(offset) {
                let batch = request.paths(paths).to_vec();
                coordinator.preload_intelligent(batch, request.count).await;
            }
            let pass = grid.layout();
            log::trace!(
                "Offset {:.0}: {} realized, {} recycled",
                grid.offset(),
                pass.realized.len(),
                pass.recycled.len()
            );
            tokio::time::sleep(frame).await;
        }
    }

    match coordinator.wait_for_preload().await {
        Some(PreloadOutcome::Completed { loaded, skipped }) => {
            log::info!("🎞️ Last preload: {} loaded, {} already cached", loaded, skipped)
        }
        Some(PreloadOutcome::Cancelled) | None => {}
    }
}
