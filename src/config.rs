//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::security::{DlpScanner, SecurityConfig};
use crate::{Error, Result, SERVER_NAME};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// MCP server configuration
    pub server: ServerConfig,
    /// Outbound HTTP configuration
    pub gateway: GatewayConfig,
    /// Security layer configuration
    pub security: SecurityConfig,
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name used in logs
    pub name: String,
    /// Reject `tools/*` until the client sends `notifications/initialized`
    pub require_initialization: bool,
    /// Maximum concurrently executing requests
    pub max_in_flight: usize,
    /// How long to wait for in-flight requests after stdin closes
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Optional instructions returned from `initialize`
    pub instructions: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            require_initialization: false,
            max_in_flight: 64,
            shutdown_timeout: Duration::from_secs(10),
            instructions: None,
        }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Total request timeout (connect, send, receive body)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// TCP/TLS connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// User-Agent header sent upstream
    pub user_agent: String,
    /// Bytes of response body kept; the rest is discarded and flagged
    pub max_response_bytes: usize,
    /// Redirect hops followed (0 disables redirects)
    pub max_redirects: usize,
    /// URL schemes the tools may fetch
    pub allowed_schemes: Vec<String>,
    /// Explicit upstream proxy. Proxy environment variables are ignored.
    pub proxy: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("{SERVER_NAME}/{}", env!("CARGO_PKG_VERSION")),
            max_response_bytes: 1024 * 1024,
            max_redirects: 5,
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            proxy: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // PALARYN_GATEWAY__TIMEOUT=5s -> gateway.timeout
        figment = figment.merge(Env::prefixed("PALARYN_").split("__").ignore(&[
            "config",
            "log_level",
            "log_format",
        ]));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} in the user agent and DLP patterns
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.gateway.user_agent = expand_string(&re, &self.gateway.user_agent);
        for pattern in &mut self.security.dlp.patterns {
            pattern.pattern = expand_string(&re, &pattern.pattern);
        }
        Ok(())
    }

    /// Check values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_in_flight == 0 {
            return Err(Error::Config("server.max_in_flight must be at least 1".to_string()));
        }
        if self.gateway.max_response_bytes == 0 {
            return Err(Error::Config(
                "gateway.max_response_bytes must be at least 1".to_string(),
            ));
        }
        if self.gateway.allowed_schemes.is_empty() {
            return Err(Error::Config("gateway.allowed_schemes must not be empty".to_string()));
        }
        if let Some(scheme) = self
            .gateway
            .allowed_schemes
            .iter()
            .find(|s| !matches!(s.as_str(), "http" | "https"))
        {
            return Err(Error::Config(format!(
                "Unsupported scheme in gateway.allowed_schemes: {scheme}"
            )));
        }
        DlpScanner::from_config(&self.security.dlp)?;
        Ok(())
    }
}

/// Expand environment variables in a string
fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Serde adapter for human-readable durations (`30s`, `5m`, `250ms`)
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a duration string; a bare number is seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        let s = match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => return Ok(Duration::from_secs(secs)),
            Raw::Text(s) => s,
        };
        let s = s.trim();

        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = mins.trim().parse::<u64>().map_err(serde::de::Error::custom)?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| serde::de::Error::custom("duration too large"))
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DlpAction;
    use std::io::Write;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    // ── Defaults ──────────────────────────────────────────────────────

    #[test]
    fn defaults_are_permissive_and_protected() {
        let config = Config::default();
        assert!(!config.server.require_initialization);
        assert_eq!(config.server.max_in_flight, 64);
        assert_eq!(config.gateway.max_redirects, 5);
        assert!(config.gateway.user_agent.starts_with("palaryn-mcp-bridge/"));
        assert!(config.security.ssrf.enabled);
        assert!(config.security.sanitize_input);
        assert_eq!(config.security.dlp.action, DlpAction::Report);
        config.validate().unwrap();
    }

    // ── Loading ───────────────────────────────────────────────────────

    #[test]
    fn load_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/palaryn.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn load_yaml_sections() {
        let file = write_yaml(
            r"
server:
  require_initialization: true
  max_in_flight: 8
  shutdown_timeout: 250ms
gateway:
  timeout: 5s
  max_response_bytes: 2048
security:
  ssrf:
    allowed_hosts: ['127.0.0.1']
  policy:
    deny_hosts: ['*.internal.corp']
  dlp:
    action: block
",
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.server.require_initialization);
        assert_eq!(config.server.max_in_flight, 8);
        assert_eq!(config.server.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(config.gateway.timeout, Duration::from_secs(5));
        assert_eq!(config.gateway.max_response_bytes, 2048);
        assert_eq!(config.gateway.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.security.ssrf.allowed_hosts, vec!["127.0.0.1"]);
        assert!(config.security.ssrf.resolve_dns);
        assert_eq!(config.security.policy.deny_hosts, vec!["*.internal.corp"]);
        assert_eq!(config.security.dlp.action, DlpAction::Block);
    }

    #[test]
    fn load_expands_env_in_dlp_patterns() {
        let file = write_yaml(
            r"
security:
  dlp:
    patterns:
      - name: tenant
        pattern: 'tenant-${PALARYN_TEST_UNSET_TENANT:-acme}-\d+'
",
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.security.dlp.patterns[0].pattern, r"tenant-acme-\d+");
    }

    // ── Validation ────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_zero_in_flight() {
        let mut config = Config::default();
        config.server.max_in_flight = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_in_flight"));
    }

    #[test]
    fn validate_rejects_unknown_scheme() {
        let mut config = Config::default();
        config.gateway.allowed_schemes.push("ftp".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("ftp"));
    }

    #[test]
    fn validate_rejects_bad_dlp_regex() {
        let mut config = Config::default();
        config.security.dlp.patterns.push(crate::security::dlp::DlpPattern {
            name: "bad".to_string(),
            pattern: "[".to_string(),
        });
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    // ── Env expansion ─────────────────────────────────────────────────

    #[test]
    fn expand_string_uses_default_when_unset() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        assert_eq!(
            expand_string(&re, "ua/${PALARYN_TEST_NEVER_SET:-1.0}"),
            "ua/1.0"
        );
        assert_eq!(expand_string(&re, "x${PALARYN_TEST_NEVER_SET}y"), "xy");
        assert_eq!(expand_string(&re, "plain"), "plain");
    }

    #[test]
    fn load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "PALARYN_TEST_ENV_FILE_KEY=from_env_file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![
                "/nonexistent/path/.env".to_string(),
                env_path.to_string_lossy().to_string(),
            ],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("PALARYN_TEST_ENV_FILE_KEY").unwrap(), "from_env_file");
    }

    // ── humantime_serde ───────────────────────────────────────────────

    #[test]
    fn durations_parse_all_units() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(with = "humantime_serde")]
            d: Duration,
        }
        let parse = |v: serde_json::Value| {
            serde_json::from_value::<Wrapper>(serde_json::json!({ "d": v })).unwrap().d
        };
        assert_eq!(parse("250ms".into()), Duration::from_millis(250));
        assert_eq!(parse("30s".into()), Duration::from_secs(30));
        assert_eq!(parse("2m".into()), Duration::from_secs(120));
        assert_eq!(parse("7".into()), Duration::from_secs(7));
        assert_eq!(parse(9.into()), Duration::from_secs(9));
    }

    #[test]
    fn oversized_minutes_are_rejected() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            #[serde(with = "humantime_serde")]
            #[allow(dead_code)]
            d: Duration,
        }
        let err = serde_json::from_value::<Wrapper>(serde_json::json!({ "d": format!("{}m", u64::MAX) }))
            .unwrap_err();
        assert!(err.to_string().contains("duration too large"));
    }
}
