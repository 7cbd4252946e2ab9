//! teeproxy: send every request to a primary backend and a copy to a shadow.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!   Client Request   │  ┌────────┐   ┌──────────┐   ┌────────────┐  │
//!   ─────────────────┼─▶│listener│──▶│   tee    │──▶│  primary   │──┼──▶ Primary
//!                    │  └────────┘   │ handler  │   │  dispatch  │  │    Backend
//!   Client Response  │               │          │◀──┴────────────┘  │
//!   ◀────────────────┼───────────────┤          │                   │
//!                    │               │          │   ┌────────────┐  │
//!                    │               │          │──▶│   shadow   │──┼──▶ Shadow
//!                    │               └────┬─────┘   │ (detached) │  │    Backend
//!                    │                    │         └─────┬──────┘  │
//!                    │                    ▼               ▼         │
//!                    │              ┌──────────────────────────┐    │
//!                    │              │  session affinity cache  │    │
//!                    │              └──────────────────────────┘    │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use teeproxy::config::{read_config, validate_config, TeeConfig};
use teeproxy::lifecycle::signals::shutdown_signal;
use teeproxy::net::Listener;
use teeproxy::observability::{logging, metrics};
use teeproxy::{Shutdown, TeeServer};

#[derive(Parser, Debug)]
#[command(name = "teeproxy")]
#[command(about = "Duplicate HTTP traffic to a primary and a shadow backend", long_about = None)]
struct Cli {
    /// TOML config file; flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to accept requests on.
    #[arg(short, long)]
    listen: Option<String>,

    /// Where production traffic goes.
    #[arg(short = 'a', long)]
    primary: Option<String>,

    /// Where shadow traffic goes. Its responses are discarded.
    #[arg(short = 'b', long)]
    shadow: Option<String>,

    /// Connect timeout in seconds for production traffic.
    #[arg(long, alias = "a.timeout")]
    primary_timeout: Option<u64>,

    /// Connect timeout in seconds for shadow traffic.
    #[arg(long, alias = "b.timeout")]
    shadow_timeout: Option<u64>,

    /// Session cookie correlated between the two backends.
    #[arg(long)]
    cookie_name: Option<String>,

    /// Log shadow failures that are otherwise ignored.
    #[arg(long)]
    debug: bool,
}

/// Long flags that may also be spelled with a single dash (`-a.timeout 5`).
const SINGLE_DASH_FLAGS: [&str; 3] = ["a.timeout", "b.timeout", "debug"];

/// Rewrite single-dash spellings of [`SINGLE_DASH_FLAGS`] to their `--` form.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let single_dash = arg.to_str().is_some_and(|s| {
                s.strip_prefix('-')
                    .filter(|rest| !rest.starts_with('-'))
                    .is_some_and(|rest| {
                        let name = rest.split_once('=').map_or(rest, |(name, _)| name);
                        SINGLE_DASH_FLAGS.contains(&name)
                    })
            });
            if single_dash {
                let mut long = OsString::from("-");
                long.push(&arg);
                long
            } else {
                arg
            }
        })
        .collect()
}

impl Cli {
    fn apply(self, config: &mut TeeConfig) {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(primary) = self.primary {
            config.primary.address = primary;
        }
        if let Some(shadow) = self.shadow {
            config.shadow.address = shadow;
        }
        if let Some(secs) = self.primary_timeout {
            config.primary.timeout_secs = secs;
        }
        if let Some(secs) = self.shadow_timeout {
            config.shadow.timeout_secs = secs;
        }
        if let Some(name) = self.cookie_name {
            config.session.cookie_name = name;
        }
        if self.debug {
            config.observability.debug = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => TeeConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability);
    tracing::info!("teeproxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        primary = %config.primary.address,
        primary_timeout_secs = config.primary.timeout_secs,
        shadow = %config.shadow.address,
        shadow_timeout_secs = config.shadow.timeout_secs,
        cookie_name = %config.session.cookie_name,
        debug = config.observability.debug,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server = TeeServer::new(config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    shutdown.trigger_on(shutdown_signal()).await;
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
