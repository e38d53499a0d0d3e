use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    mangabot_bot::{CompletionNotifier, EventRouter},
    mangabot_channels::{EventHandler, NotificationSink},
    mangabot_config::BotConfig,
    mangabot_downloads::{
        ArtifactStorage, CommandFetcher, DirectoryStore, DownloadWorker, JobQueue,
    },
    mangabot_onebot::{OneBotClient, OneBotOutbound},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "mangabot", version, about = "QQ manga download bot (OneBot v11)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: ./mangabot.toml, then ~/.config/mangabot/mangabot.toml).
    #[arg(long, global = true, env = "MANGABOT_CONFIG")]
    config: Option<PathBuf>,

    /// Download directory (overrides config and MANGA_DOWNLOAD_PATH).
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the OneBot endpoint and serve commands (default).
    Run,
    /// Print the effective configuration with secrets redacted.
    CheckConfig,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load(cli: &Cli) -> anyhow::Result<BotConfig> {
    let mut config = match &cli.config {
        Some(path) => mangabot_config::load_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => mangabot_config::discover_and_load(),
    };
    if let Some(dir) = &cli.download_dir {
        config.downloads.path = std::path::absolute(dir).unwrap_or_else(|_| dir.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load(&cli)?;
    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!("{config:#?}");
            Ok(())
        },
        Commands::Run => run(config).await,
    }
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        download_dir = %config.downloads.path.display(),
        "starting mangabot"
    );

    let store = DirectoryStore::new(&config.downloads.path);
    store.ensure_dir().with_context(|| {
        format!(
            "creating download directory {}",
            config.downloads.path.display()
        )
    })?;
    if config.downloads.cleanup_on_start {
        match store.cleanup_failed() {
            Ok(0) => {},
            Ok(removed) => info!(removed, "cleaned up unfinished downloads"),
            Err(e) => warn!(error = %e, "cleanup of unfinished downloads failed"),
        }
    }
    let storage: Arc<dyn ArtifactStorage> = Arc::new(store);

    let fetcher_config = &config.downloads.fetcher;
    if !fetcher_config.is_configured() {
        warn!("no fetcher program configured, download jobs will fail");
    }
    let fetcher = Arc::new(CommandFetcher::new(
        fetcher_config.program.clone(),
        fetcher_config.args.clone(),
        config.downloads.path.clone(),
    ));

    let queue = Arc::new(JobQueue::new());
    let outbound = OneBotOutbound::new();
    let sink: Arc<dyn NotificationSink> = Arc::new(outbound.clone());

    let notifier = CompletionNotifier::new(Arc::clone(&sink))
        .on_completion(config.downloads.notify_on_completion)
        .on_failure(config.downloads.notify_on_failure);
    let worker = DownloadWorker::new(Arc::clone(&queue), fetcher, Arc::clone(&storage))
        .with_listener(Arc::new(notifier))
        .with_poll_interval(Duration::from_millis(
            config.downloads.poll_interval_ms.max(10),
        ))
        .spawn();

    let router: Arc<dyn EventHandler> = Arc::new(
        EventRouter::new(config.access.clone(), Arc::clone(&queue), storage, sink)
            .with_version(env!("CARGO_PKG_VERSION")),
    );

    let cancel = CancellationToken::new();
    let client = OneBotClient::new(config.onebot.clone(), outbound, router).spawn(cancel.clone());

    shutdown_signal().await;
    info!("shutting down");

    worker.stop();
    cancel.cancel();
    if let Err(e) = client.await {
        warn!(error = %e, "OneBot client task failed");
    }
    worker.join().await;
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
