use std::sync::Arc;

use advisor_core::{AdvisorConfig, Assistant};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use advisor_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "advisor.toml")]
    config: String,

    /// Print component status and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match AdvisorConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let assistant = match Assistant::from_config(&config) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            eprintln!("Failed to initialise assistant: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let report = assistant.health();
        let mark = |ok: bool| if ok { "✅" } else { "⚠️ " };

        println!(
            "{} classifier model loaded: {}",
            mark(report.classifier_loaded),
            report.classifier_loaded
        );
        println!("✅ token counter: {}", report.token_counter);
        println!("✅ chat model: {}", report.chat_model);

        let interpreter_ok = std::process::Command::new(&report.interpreter)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !interpreter_ok {
            println!("❌ interpreter {} not runnable", report.interpreter);
            std::process::exit(1);
        }
        println!("✅ interpreter: {}", report.interpreter);

        println!("✅ Advisor health check passed");
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

    if config.http.enabled {
        let http_assistant = Arc::clone(&assistant);
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                advisor_server::http::start_http_server(http_assistant, http_config, http_shutdown)
                    .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, assistant, tx.subscribe()).await?;

    Ok(())
}
