use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_runtime::{Runtime, WorkflowRegistry};
use relay_server::{RelayServer, Settings};
use relay_telemetry::LogFormat;

mod workflows;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Serve Relay workflows over WebSocket", long_about = None)]
struct Cli {
    /// JSON settings file, merged over the built-in defaults.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// `json` or `pretty`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    cli.apply(&mut settings);

    let telemetry = settings
        .logging
        .to_telemetry_config()
        .context("invalid logging settings")?;
    let _telemetry = relay_telemetry::init_telemetry(telemetry);

    let mut registry = WorkflowRegistry::new();
    workflows::register_all(&mut registry);
    let runtime = Arc::new(Runtime::new(Arc::new(registry), settings.runtime.clone()));

    let server = RelayServer::new(settings.server.clone(), runtime);
    let listener = server
        .bind()
        .await
        .with_context(|| format!("binding {}", settings.server.bind_addr()))?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
        }
        shutdown.shutdown();
    });

    server.serve(listener).await.context("server failed")?;
    Ok(())
}
