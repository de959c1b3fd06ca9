use std::process;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use locaiver::cli::{format_dry_run, Args};
use locaiver::config::load_env_file;
use locaiver::server::{create_router, AppState};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = load_env_file(env_file) {
            error!(
                "Failed to load env file {} ({}): {}",
                env_file.display(),
                e.kind(),
                e
            );
            process::exit(1);
        }
    }

    let config = match args.backend_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration ({}): {}", e.kind(), e);
            process::exit(1);
        }
    };

    // Dry-run mode: print resolved settings and exit
    if args.dry_run {
        println!("{}", format_dry_run(&config, &args));
        return;
    }

    match config.base_url() {
        Some(url) => info!("Forwarding to backend at {}", url),
        None => warn!("BOT_URL is not set; backend requests will fail with 503"),
    }

    let state = AppState::new(config);
    let app = create_router(state);
    let addr = args.listen_addr();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        }
    };

    info!("Server listening on {}", addr);
    info!("Endpoints:");
    info!("  GET  /health              - Health check");
    info!("  GET  /status              - Gateway status");
    info!("  POST /api/{{form,chat,chat-fin,edit,save,video}} - Backend proxy");
    info!("  GET  /api/chat/initial    - Initial greeting");
    info!("  GET  /api/storyboard      - Storyboard");
    info!("  POST /api/video/pipeline  - Run the full video pipeline");

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
