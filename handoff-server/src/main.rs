use clap::Parser;
use handoff_core::HandoffConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "handoff.toml")]
    config: String,

    /// Check store connectivity and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match HandoffConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging (RUST_LOG wins over service.log_level)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone()));
    fmt().with_env_filter(filter).init();

    let store = match handoff_core::create_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialise {} store: {}", config.store.backend, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.ping().await {
            Ok(v) => println!("✅ {} store reachable: {}", store.name(), v),
            Err(e) => {
                println!("❌ {} store check failed: {}", store.name(), e);
                std::process::exit(1);
            }
        }
        println!("✅ Handoff health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if config.retention.enabled {
        let retention_store = store.clone();
        let retention_config = config.retention.clone();
        let retention_shutdown = tx.subscribe();
        tokio::spawn(async move {
            handoff_server::subsystems::retention::run_retention_loop(
                retention_store,
                retention_config,
                retention_shutdown,
            )
            .await;
        });
    } else {
        tracing::info!("Retention sweeper disabled");
    }

    tracing::info!(
        store = store.name(),
        ttl_minutes = config.session.ttl_minutes,
        "Handoff relay starting"
    );
    handoff_server::http::start_http_server(store, config, tx.subscribe()).await?;

    Ok(())
}
