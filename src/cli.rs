//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Palaryn MCP bridge - HTTP fetch tools behind an SSRF/policy/DLP gateway,
/// served over stdio
#[derive(Parser, Debug)]
#[command(name = "palaryn-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PALARYN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PALARYN_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PALARYN_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Reject tool methods until the client sends `notifications/initialized`
    #[arg(long)]
    pub require_init: bool,

    /// Disable SSRF protection (development only)
    #[arg(long)]
    pub no_ssrf_protection: bool,
}
