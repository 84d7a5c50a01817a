//! Command handlers for the remote-cache CLI
//!
//! Each handler builds the components it needs from the effective
//! [`AppConfig`], runs one operation and prints a short report.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::cache::{drain_events, CacheEvent, CacheManager, DeleteOutcome};
use crate::app::scene::{MemoryScene, NodeClass, SceneNode, StorageNode};
use crate::app::transfer::{DataIoManager, TransferId, TransferStatus};
use crate::app::uri;
use crate::app::worker::{drive_pending_transfers, TransferWorker};
use crate::cli::{ConfigAction, FetchArgs, ProgressConfig, ProgressDisplay};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Build a cache manager from the effective configuration
fn open_cache(config: &AppConfig) -> Result<CacheManager> {
    let (cache_config, _) = config.to_runtime_config();
    if !cache_config.is_enabled() {
        return Err(AppError::generic(
            "No cache directory configured; set [cache].directory or use --cache-dir",
        ));
    }
    Ok(CacheManager::new(cache_config)?)
}

/// Load the scene document or start from an empty scene
fn load_scene(scene: Option<&Path>) -> Result<MemoryScene> {
    match scene {
        Some(path) => {
            debug!("Loading scene from {}", path.display());
            Ok(MemoryScene::from_json_file(path)?)
        }
        None => Ok(MemoryScene::new()),
    }
}

fn print_modified_nodes(scene: &MemoryScene) {
    let ids = scene.modified_node_ids();
    if !ids.is_empty() {
        println!("Nodes flagged as modified: {}", ids.join(", "));
    }
}

fn report_cache_events(events: &[CacheEvent]) {
    for event in events {
        match event {
            CacheEvent::CacheLimitExceeded {
                current_mb,
                limit_mb,
            } => {
                println!(
                    "⚠️  Cache size {:.1} MB exceeds the limit of {} MB",
                    current_mb, limit_mb
                );
            }
            CacheEvent::InsufficientFreeBuffer {
                remaining_mb,
                buffer_mb,
            } => {
                println!(
                    "⚠️  Only {:.1} MB left below the limit (buffer is {} MB)",
                    remaining_mb, buffer_mb
                );
            }
            other => debug!("Cache event: {}", other.name()),
        }
    }
}

/// Handle the info command
pub async fn handle_info(config: &AppConfig) -> Result<()> {
    let cache = open_cache(config)?;
    let stats = cache.stats();

    println!("💾 Cache Information");
    println!("===================");
    println!("Location: {}", stats.cache_root.display());
    println!("Cached files: {}", stats.cached_files_count);
    println!("Cache size: {}", stats.format_cache_size());
    println!("Limit: {}", stats.format_limit());
    if stats.limit_mb > 0 {
        println!("Usage: {:.1}%", stats.usage_percentage());
        println!("Free buffer: {} MB", stats.free_buffer_mb);
        println!(
            "Free space below limit: {:.1} MB",
            stats.free_space_remaining_mb
        );
    }
    println!(
        "Force redownload: {}",
        if cache.enable_force_redownload() {
            "on"
        } else {
            "off"
        }
    );

    Ok(())
}

/// Handle the list command
pub async fn handle_list(config: &AppConfig, json: bool) -> Result<()> {
    let cache = open_cache(config)?;
    let files = cache.cached_files();

    if json {
        let rendered = serde_json::to_string_pretty(files)
            .map_err(|e| AppError::generic(format!("Failed to render file list: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    if files.is_empty() {
        println!("ℹ️  The cache is empty");
        return Ok(());
    }
    for file in files {
        println!("{}", file);
    }
    println!();
    println!("{} cached files", files.len());
    Ok(())
}

/// Handle the find command
pub async fn handle_find(config: &AppConfig, name: &str) -> Result<()> {
    let cache = open_cache(config)?;
    match cache.find_cached_file(name, cache.cache_root()) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => Err(AppError::generic(format!("{} is not in the cache", name))),
    }
}

/// Handle the delete command
pub async fn handle_delete(config: &AppConfig, target: &str, scene: Option<&Path>) -> Result<()> {
    let mut cache = open_cache(config)?;
    let mut scene = load_scene(scene)?;

    match cache.delete_from_cache(&mut scene, target) {
        DeleteOutcome::Deleted { path, nodes_marked } => {
            println!("🗑️  Deleted {}", path.display());
            debug!("{} nodes marked before deletion", nodes_marked);
            print_modified_nodes(&scene);
            Ok(())
        }
        DeleteOutcome::NotFound => Err(AppError::generic(format!(
            "{} is not in the cache",
            target
        ))),
        DeleteOutcome::RemovalFailed { path, reason, .. } => {
            print_modified_nodes(&scene);
            Err(AppError::generic(format!(
                "Failed to delete {}: {}",
                path.display(),
                reason
            )))
        }
    }
}

/// Ask for confirmation on stdin
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Handle the clear command
pub async fn handle_clear(config: &AppConfig, yes: bool, scene: Option<&Path>) -> Result<()> {
    let mut cache = open_cache(config)?;
    let mut scene = load_scene(scene)?;

    println!("🧹 Cache Cleanup");
    println!("===============");
    println!(
        "⚠️  This will remove ALL {} cached files in {}",
        cache.cached_files().len(),
        cache.cache_root().display()
    );

    if !yes && !confirm("Continue?")? {
        println!("Aborted");
        return Ok(());
    }

    cache.clear_cache(&mut scene)?;
    println!("✅ Cache cleared");
    print_modified_nodes(&scene);
    Ok(())
}

/// Handle the check command
pub async fn handle_check(config: &AppConfig) -> Result<()> {
    let mut cache = open_cache(config)?;
    let mut events = cache.subscribe();

    let over_limit = cache.cache_size_check();
    let low_buffer = cache.free_cache_buffer_check();
    report_cache_events(&drain_events(&mut events));

    if !over_limit && !low_buffer {
        let stats = cache.stats();
        println!(
            "✅ Cache OK: {} of {}",
            stats.format_cache_size(),
            stats.format_limit()
        );
    }
    Ok(())
}

/// Handle the fetch command
///
/// Every URI becomes one node of a throwaway scene whose read is queued on
/// the data I/O manager, then the worker drains the queue.
pub async fn handle_fetch(config: &AppConfig, args: FetchArgs, quiet: bool) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    let start_time = Instant::now();

    let (_, mut worker_config) = config.to_runtime_config();
    if let Some(workers) = args.workers {
        worker_config = worker_config.with_max_concurrent_transfers(workers);
    }
    let worker = Arc::new(TransferWorker::new(worker_config)?);

    let mut cache = open_cache(config)?;
    if args.force {
        cache.set_enable_force_redownload(true);
    }
    let mut cache_events = cache.subscribe();

    let mut io = DataIoManager::new(cache);
    if args.sync {
        io.configure(false);
    }

    let mut scene = MemoryScene::new();
    let mut labels: HashMap<TransferId, String> = HashMap::new();
    for (index, source) in args.uris.iter().enumerate() {
        let name = uri::bare_file_name(source).to_string();
        let node_id = scene.add_node(
            SceneNode::new(format!("fetch-{}", index + 1), NodeClass::Storable)
                .with_storage(StorageNode::with_uri(source.clone(), name.clone())),
        );
        match io.queue_read(&mut scene, &node_id) {
            Ok(transfer_id) => {
                labels.insert(transfer_id, name);
            }
            Err(e) => warn!("Skipping {}: {}", source, e),
        }
    }

    info!(
        "Fetching {} URIs into {}",
        labels.len(),
        io.cache().cache_root().display()
    );

    let progress_config = if quiet {
        ProgressConfig {
            enable_progress_bars: false,
        }
    } else {
        ProgressConfig::default()
    };
    let display = ProgressDisplay::start(&progress_config, io.subscribe(), labels)?;
    let executed = drive_pending_transfers(&mut io, &worker).await;
    display.finish().await;

    let stats = io.stats();
    println!();
    println!("📊 Fetch Summary");
    println!("================");
    println!("Transfers run: {}", executed);
    println!("Completed: {}", stats.completed);
    println!("Failed: {}", stats.failed);
    if stats.cancelled > 0 {
        println!("Cancelled: {}", stats.cancelled);
    }
    println!("Cache size: {:.1} MB", io.cache().current_cache_size_mb());
    println!("Total time: {:.1}s", start_time.elapsed().as_secs_f64());

    for transfer in io.transfers() {
        if transfer.status() != TransferStatus::Completed {
            println!(
                "❌ {} ({}): {}",
                transfer.source_uri().unwrap_or("?"),
                transfer.status(),
                transfer.error_message().unwrap_or("no details")
            );
        }
    }

    report_cache_events(&drain_events(&mut cache_events));

    if stats.failed > 0 {
        return Err(AppError::generic(format!(
            "{} of {} transfers failed",
            stats.failed, stats.total
        )));
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(config: &AppConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Init => {
            let path = AppConfig::get_default_config_path()?;
            if AppConfig::write_default_config(&path).await? {
                println!("✅ Created {}", path.display());
            } else {
                println!("ℹ️  {} already exists", path.display());
            }
            Ok(())
        }
    }
}
