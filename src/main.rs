//! Palaryn MCP bridge - stdio entry point

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use palaryn_mcp::{
    Result,
    cli::Cli,
    config::Config,
    gateway::HttpGateway,
    server::McpServer,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let server = match build_server(&cli) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Startup failed");
            eprintln!("Palaryn MCP server fatal error: {e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Palaryn MCP server started (stdio, {} tools)",
        server.tool_count()
    );

    match server.serve_stdio().await {
        Ok(()) => {
            info!("Stdin closed, shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            eprintln!("Palaryn MCP server fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Load and validate configuration, then wire the gateway into the server
fn build_server(cli: &Cli) -> Result<McpServer> {
    let mut config = Config::load(cli.config.as_deref())?;

    if cli.require_init {
        config.server.require_initialization = true;
    }
    if cli.no_ssrf_protection {
        warn!("--no-ssrf-protection set: outbound requests are not checked for internal targets");
        config.security.ssrf.enabled = false;
    }
    config.validate()?;

    info!(
        name = %config.server.name,
        require_initialization = config.server.require_initialization,
        max_in_flight = config.server.max_in_flight,
        ssrf = config.security.ssrf.enabled,
        dlp = config.security.dlp.enabled,
        "Starting Palaryn MCP server"
    );

    let gateway = HttpGateway::new(&config)?;
    Ok(McpServer::new(&config.server, Arc::new(gateway)))
}
