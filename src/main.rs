// Main entry point
use clap::Parser;
use colored::Colorize;
use robobrain_cache::application;
use robobrain_cache::domain::traits::CacheStore;
use robobrain_cache::infrastructure::config::{self, load_config, Config};
use robobrain_cache::infrastructure::storage::db::SqliteStore;
use robobrain_cache::infrastructure::storage::sqlite::SqlitePools;
use robobrain_cache::interfaces::cli::Cli;
use robobrain_cache::presentation::report::{format_result, format_status};
use robobrain_cache::presentation::theme::Theme;
use robobrain_cache::state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;

    // Initialize logging
    if config.logging.enable {
        init_logging(&config.logging)?;
    }

    if cli.generate_config {
        config::generate_config_sample()?;
        return Ok(());
    }
    if cli.edit_config {
        if let Some(config_path) = config::get_config_path() {
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            tokio::task::spawn_blocking(move || {
                std::process::Command::new(editor).arg(&config_path).status()
            })
            .await??;
        } else {
            eprintln!("{}", "Config file not found".red());
        }
        return Ok(());
    }

    let state = build_state(config).await?;

    // Setup graceful shutdown handler
    let result = tokio::select! {
        result = run(&cli, &state) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, shutting down...");
            Ok(())
        }
    };

    state.shutdown();
    result
}

async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let sqlite = SqlitePools::new(config.sqlite_pool.to_pool_config());

    let store: Option<Arc<dyn CacheStore>> = if config.cache.persistent {
        let db_path = config::get_database_path(&config);
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match SqliteStore::open(sqlite.pool_for(&db_path)).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                // the cache still works in memory
                tracing::warn!(error = %e, path = %db_path.display(), "persistent cache unavailable");
                None
            }
        }
    } else {
        None
    };

    Ok(AppState::new(config, sqlite, store)?)
}

async fn run(cli: &Cli, state: &AppState) -> anyhow::Result<()> {
    let theme = Theme::new(state.config.read().await.enable_color);

    if cli.clear {
        let removed = state.cache.clear(true).await;
        println!("Cleared {} cached responses.", removed);
        return Ok(());
    }
    if let Some(path) = &cli.invalidate {
        application::fetch::invalidate_path(state, path).await?;
        println!("Invalidated {}", path);
        return Ok(());
    }
    if cli.purge_expired {
        let purged = state.cache.purge_expired().await;
        println!("Purged {} expired responses.", purged);
        return Ok(());
    }
    if cli.status {
        let report = application::status::collect_status(state).await?;
        print!("{}", format_status(&report, &theme));
        return Ok(());
    }

    if cli.paths.is_empty() {
        eprintln!("{}", "Please provide at least one API path".red());
        std::process::exit(1);
    }

    let mut failed = false;
    for _ in 0..cli.repeat.max(1) {
        let results = application::fetch::fetch_all(state, &cli.paths, cli.nocache).await;
        for result in &results {
            failed |= result.is_err();
            if cli.json {
                match result {
                    Ok(result) => println!("{}", serde_json::to_string_pretty(result)?),
                    Err(e) => eprintln!("{}", e.to_string().red()),
                }
            } else {
                print!("{}", format_result(result, &theme));
            }
        }
    }

    if !cli.json && cli.repeat > 1 {
        let stats = state.cache.stats();
        println!(
            "{} hits, {} misses ({:.1}%)",
            stats.hits,
            stats.misses,
            stats.hit_rate * 100.0
        );
    }

    if failed {
        state.shutdown();
        std::process::exit(2);
    }
    Ok(())
}

/// Initialize logging with path and level configuration
fn init_logging(logging: &config::Logging) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = match logging.level.as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" => "warn",
        "ERROR" => "error",
        _ => "warn",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = &logging.path {
        if !path.is_empty() {
            // Log to file
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .init();
            return Ok(());
        }
    }

    // Log to stderr (default)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
