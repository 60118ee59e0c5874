use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use vidgrab::cli::{Cli, Commands};
use vidgrab::core::{config, init_logger, log_startup_configuration};
use vidgrab::download::{Coordinator, YtDlp};
use vidgrab::storage::{start_stale_sweep_task, TempStorage};
use vidgrab::web::run_server;

/// Parses CLI arguments and dispatches to the subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, temp directory, bind address).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // .env must be loaded before any config value is read
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Run { port, bind }) => run(port, bind).await,
        Some(Commands::Check) => check().await,
        None => run(None, None).await,
    }
}

async fn run(port: Option<u16>, bind: Option<String>) -> Result<()> {
    log_startup_configuration();

    let storage = TempStorage::from_config();
    storage
        .ensure_dir()
        .with_context(|| format!("Failed to create temp downloads dir {}", storage.dir().display()))?;

    let max_age = config::cleanup::stale_max_age();
    start_stale_sweep_task(storage.clone(), max_age, config::cleanup::sweep_interval());

    let bind = bind.unwrap_or_else(|| config::BIND_ADDR.clone());
    let ip: IpAddr = bind.parse().with_context(|| format!("Invalid bind address: {}", bind))?;
    let addr = SocketAddr::new(ip, port.unwrap_or(*config::PORT));

    let coordinator = Coordinator::new(YtDlp::from_config(), storage);
    run_server(addr, coordinator, Path::new(config::PUBLIC_DIR.as_str())).await
}

async fn check() -> Result<()> {
    let ytdlp = YtDlp::from_config();
    let version = ytdlp
        .version()
        .await
        .with_context(|| format!("yt-dlp check failed for {}", ytdlp.bin().display()))?;
    log::info!("✅ {} works, version {}", ytdlp.bin().display(), version);
    Ok(())
}
