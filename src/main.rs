//! kbulk server entry point.
//!
//! Serves the module commands to RESP clients and forwards everything else
//! to the configured host, or runs the self-test once with `--self-test`.

use clap::Parser;
use kbulk::connection::{accept_loop, ConnectionStats};
use kbulk::module::{CommandKind, Module};
use kbulk::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_level);

    let module = Arc::new(Module::load(&config.namespace)?);
    let source = config.host_source();
    info!(
        namespace = module.namespace(),
        version = module.version(),
        host = %source,
        "Module loaded"
    );

    if config.self_test {
        return run_self_test(&module, &source).await;
    }

    let stats = Arc::new(ConnectionStats::new());
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("kbulk v{} listening on {}", kbulk::VERSION, config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, source, Arc::clone(&module), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        module_commands = stats.module_commands.load(Ordering::Relaxed),
        forwarded = stats.forwarded_commands.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Runs `<ns>.test` once and turns an error reply into a failing exit.
async fn run_self_test(module: &Module, source: &kbulk::HostSource) -> anyhow::Result<()> {
    let spec = module
        .spec(CommandKind::SelfTest)
        .ok_or_else(|| anyhow::anyhow!("self-test command is not registered"))?;

    let mut host = source.open().await?;
    let reply = module.run(&mut host, spec, &[]).await;
    println!("{}", reply);

    if reply.is_error() {
        anyhow::bail!("{} failed against {}", spec.name, source);
    }
    Ok(())
}
