use std::path::PathBuf;

use clap::Parser;

use cas_gate::auth::csrf;
use cas_gate::config::{load_config, validated, GateConfig};
use cas_gate::lifecycle::signals;
use cas_gate::observability::{logging, metrics};
use cas_gate::routing::template::escape_html;
use cas_gate::{Content, Dispatcher, GateError, HttpServer, Params, RequestContext};

#[derive(Parser)]
#[command(name = "cas-gate")]
#[command(about = "CAS-authenticated web endpoint", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => validated(GateConfig::default())?,
    };

    logging::init(&config.observability.log_level);
    tracing::info!("cas-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        app = %config.application.name,
        public_host = %config.application.public_host,
        cas = %config.cas.server_url,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let dispatcher = Dispatcher::from_config(&config, Box::new(whoami))?;
    let server = HttpServer::new(config, dispatcher);
    signals::trigger_on_ctrl_c(server.shutdown_handle());

    server.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Default application: a home page naming the signed-in user.
fn whoami(ctx: &mut RequestContext, identity: &str, _params: &Params) -> Result<Content, GateError> {
    if !ctx.path().ends_with('/') {
        return Err(GateError::not_found(format!("Not found: {}", ctx.path())));
    }

    let form = ctx.csrf_token().map(csrf::hidden_field).unwrap_or_default();
    Ok(Content::Text(format!(
        "<!doctype html><title>Signed in</title><p>Signed in as <b>{}</b></p><form method=\"post\">{}<button>Refresh</button></form>",
        escape_html(identity),
        form
    )))
}
