use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    parse_flag, BackendConfig, ConfigError, BACKEND_URL_ENV, DEBUG_PROXY_ENV, DEFAULT_STAGE_ROUTE,
};

#[derive(Parser, Debug)]
#[command(name = "locaiver")]
#[command(about = "Gateway between the locaiver frontend and its generation backend")]
#[command(version)]
pub struct Args {
    /// Backend base URL; requests fail with 503 when unset
    #[arg(long, env = BACKEND_URL_ENV, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Include upstream failure detail in error responses
    #[arg(long, env = DEBUG_PROXY_ENV, value_parser = FalseyValueParser::new())]
    pub debug_proxy: bool,

    /// Per-request timeout for backend calls, in seconds
    #[arg(long, env = "PROXY_TIMEOUT_SECS", default_value = "600")]
    pub timeout: u64,

    /// Backend route that executes a video stage
    #[arg(long, env = "STAGE_ROUTE", default_value = DEFAULT_STAGE_ROUTE)]
    pub stage_route: String,

    /// Address to bind the HTTP server to
    #[arg(long, env = "BIND_ADDR", value_name = "ADDR")]
    pub bind_addr: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to a .env file to load before resolving settings
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Dry-run mode: validate settings and print them without serving
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Resolve the backend configuration.
    ///
    /// Values loaded from `--env-file` after parsing are picked up through
    /// the process environment when the flag itself was not given.
    pub fn backend_config(&self) -> Result<BackendConfig, ConfigError> {
        let backend_url = self
            .backend_url
            .clone()
            .or_else(|| std::env::var(BACKEND_URL_ENV).ok());
        let debug = self.debug_proxy
            || std::env::var(DEBUG_PROXY_ENV)
                .map(|v| parse_flag(&v))
                .unwrap_or(false);

        Ok(BackendConfig::new(backend_url.as_deref())?
            .with_debug(debug)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_stage_route(self.stage_route.clone()))
    }

    pub fn listen_addr(&self) -> String {
        let bind_addr = self.bind_addr.as_deref().unwrap_or("0.0.0.0");
        let port = self.port.unwrap_or(8080);
        format!("{}:{}", bind_addr, port)
    }
}

// ============================================================================
// SBIO: Pure display logic (no I/O - returns formatted strings)
// ============================================================================

/// Format a dry-run summary of the resolved settings.
/// Pure function - returns a formatted string.
pub fn format_dry_run(config: &BackendConfig, args: &Args) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "locaiver v{} - Dry Run Mode\n\n",
        env!("CARGO_PKG_VERSION")
    ));
    output.push_str(&format!("Listen:      {}\n", args.listen_addr()));
    match config.base_url() {
        Some(url) => output.push_str(&format!("Backend:     {}\n", url)),
        None => output.push_str("Backend:     (not configured, requests will fail with 503)\n"),
    }
    output.push_str(&format!("Timeout:     {}s\n", config.timeout.as_secs()));
    output.push_str(&format!("Stage route: {}\n", config.stage_route));
    output.push_str(&format!(
        "Debug proxy: {}\n",
        if config.debug { "on" } else { "off" }
    ));

    output
}
