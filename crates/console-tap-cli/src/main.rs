//! Attach to a page's DevTools endpoint and append every console call to a
//! file, reconnecting whenever the page goes away.
//!
//! Run with: cargo run -p console-tap-cli -- --target localhost:4000
//!
//! The page's browser must be started with `--remote-debugging-port=9222`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use console_tap_cdp::{CdpTransport, DEFAULT_ENDPOINT};
use console_tap_core::{
    MaterializerConfig, TapConfig, TargetDescriptor,
    config::{DEFAULT_OUTPUT_PATH, DEFAULT_TARGET_ADDRESS},
};
use console_tap_sink::{SinkQueue, WriterSink};
use console_tap_supervisor::ConnectionSupervisor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Output path that selects standard output instead of a file.
const STDOUT_PATH: &str = "-";

#[derive(Debug, Parser)]
#[command(name = "console-tap", version, about)]
struct Args {
    /// Substring of the page URL to attach to
    #[arg(long, env = "CONSOLE_TAP_TARGET", default_value = DEFAULT_TARGET_ADDRESS)]
    target: String,

    /// Exact target id; overrides --target
    #[arg(long, env = "CONSOLE_TAP_TARGET_ID")]
    target_id: Option<String>,

    /// DevTools HTTP endpoint
    #[arg(long, env = "CONSOLE_TAP_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// File records are appended to ("-" for stdout)
    #[arg(long, env = "CONSOLE_TAP_OUTPUT", default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Milliseconds between connection checks
    #[arg(long, env = "CONSOLE_TAP_INTERVAL_MS", default_value_t = 5000)]
    interval_ms: u64,

    /// Nesting depth at which objects stop being expanded
    #[arg(long, env = "CONSOLE_TAP_MAX_DEPTH", default_value_t = 10)]
    max_depth: usize,

    /// Property fetches allowed while expanding one console call
    #[arg(long, env = "CONSOLE_TAP_MAX_FETCHES", default_value_t = 1000)]
    max_fetches: usize,

    /// Timeout for fetching one object's properties
    #[arg(long, env = "CONSOLE_TAP_FETCH_TIMEOUT_MS", default_value_t = 5000)]
    fetch_timeout_ms: u64,

    /// Timeout for one whole connection attempt
    #[arg(long, env = "CONSOLE_TAP_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    connect_timeout_ms: u64,
}

impl Args {
    fn to_config(&self) -> TapConfig {
        TapConfig {
            target: TargetDescriptor {
                id: self.target_id.clone(),
                address: self.target.clone(),
            },
            poll_interval: Duration::from_millis(self.interval_ms.max(1)),
            output_path: self.output.clone(),
            materializer: MaterializerConfig {
                max_depth: self.max_depth,
                fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
                max_fetches: self.max_fetches,
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

/// DevTools requests share the per-fetch bound; the whole attempt has its own.
fn build_transport(endpoint: &str, config: &TapConfig) -> anyhow::Result<CdpTransport> {
    CdpTransport::new(endpoint, config.materializer.fetch_timeout)
        .context("failed to build DevTools client")
}

async fn open_sink(path: &Path) -> anyhow::Result<WriterSink> {
    if path.as_os_str() == STDOUT_PATH {
        return Ok(WriterSink::stdout());
    }
    WriterSink::open_file(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.to_config();

    let sink = open_sink(&config.output_path).await?;
    let (queue, worker) = SinkQueue::spawn(sink);

    let transport = build_transport(&args.endpoint, &config)?;
    tracing::info!(
        endpoint = %transport.endpoint(),
        output = %config.output_path.display(),
        "Watching for {}",
        config.target
    );

    let supervisor = ConnectionSupervisor::new(transport, &config, queue);
    supervisor
        .run(config.poll_interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let stats = worker.close().await;
    tracing::info!(written = stats.written, failed = stats.failed, "Shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = Args::try_parse_from(["console-tap"]).unwrap();
        assert_eq!(args.to_config(), TapConfig::default());
        assert_eq!(args.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_flags_map_to_config() {
        let args = Args::try_parse_from([
            "console-tap",
            "--target",
            "localhost:3000",
            "--target-id",
            "ABC",
            "--output",
            "-",
            "--interval-ms",
            "250",
            "--max-depth",
            "3",
            "--max-fetches",
            "50",
            "--fetch-timeout-ms",
            "100",
            "--connect-timeout-ms",
            "2000",
        ])
        .unwrap();
        let config = args.to_config();

        assert_eq!(config.target.id.as_deref(), Some("ABC"));
        assert_eq!(config.target.address, "localhost:3000");
        assert_eq!(config.output_path, PathBuf::from(STDOUT_PATH));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.materializer.max_depth, 3);
        assert_eq!(config.materializer.max_fetches, 50);
        assert_eq!(config.materializer.fetch_timeout, Duration::from_millis(100));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_request_timeout_follows_fetch_timeout() {
        let args = Args::try_parse_from([
            "console-tap",
            "--fetch-timeout-ms",
            "750",
            "--connect-timeout-ms",
            "20000",
        ])
        .unwrap();
        let config = args.to_config();

        let transport = build_transport(&args.endpoint, &config).unwrap();
        assert_eq!(transport.request_timeout(), Duration::from_millis(750));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let args = Args::try_parse_from(["console-tap", "--interval-ms", "0"]).unwrap();
        assert_eq!(args.to_config().poll_interval, Duration::from_millis(1));
    }
}
