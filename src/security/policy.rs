//! Request policies for the fetch gateway.
//!
//! Decides whether an outbound request may proceed based on the tool that
//! issued it, the HTTP method and the target host. Every evaluation yields a
//! [`PolicyVerdict`] that is reported in the gateway metadata, allowed or not.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Methods permitted when no explicit list is configured.
const DEFAULT_ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Request policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Enable policy enforcement.
    pub enabled: bool,
    /// Default action when no rule matches.
    pub default_action: PolicyAction,
    /// Tools always allowed (exact names or `prefix*`). Takes precedence
    /// over `deny_tools`.
    pub allow_tools: Vec<String>,
    /// Tools refused (exact names or `prefix*`).
    pub deny_tools: Vec<String>,
    /// HTTP methods that may be sent upstream.
    pub allowed_methods: Vec<String>,
    /// Hosts always allowed (exact host, `*.suffix` or `*`). Takes
    /// precedence over `deny_hosts`.
    pub allow_hosts: Vec<String>,
    /// Hosts refused (exact host, `*.suffix` or `*`).
    pub deny_hosts: Vec<String>,
    /// Log denied requests (for auditing).
    pub log_denied: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_action: PolicyAction::Allow,
            allow_tools: Vec::new(),
            deny_tools: Vec::new(),
            allowed_methods: DEFAULT_ALLOWED_METHODS.iter().map(|m| (*m).to_string()).collect(),
            allow_hosts: Vec::new(),
            deny_hosts: Vec::new(),
            log_denied: true,
        }
    }
}

/// What to do when a request matches no rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Allow the request.
    Allow,
    /// Deny the request.
    Deny,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    /// Request may proceed
    Allow,
    /// Request is refused
    Deny,
}

/// Decision plus the reason and the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    /// Allow or deny
    pub decision: Decision,
    /// Machine-readable reason (`host_denied`, `default_allow`, ...)
    pub reason: String,
    /// The configured pattern that matched, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl PolicyVerdict {
    /// An allow verdict.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
            rule: None,
        }
    }

    /// A deny verdict.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
            rule: None,
        }
    }

    /// Attach the matching rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Whether the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Exact names plus `prefix*` patterns.
#[derive(Debug, Default)]
struct NameSet {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl NameSet {
    fn compile(patterns: &[String]) -> Self {
        let mut set = Self::default();
        for pattern in patterns {
            if let Some(prefix) = pattern.strip_suffix('*') {
                set.prefixes.push(prefix.to_string());
            } else {
                set.exact.insert(pattern.clone());
            }
        }
        set
    }

    fn find(&self, name: &str) -> Option<String> {
        if self.exact.contains(name) {
            return Some(name.to_string());
        }
        self.prefixes
            .iter()
            .find(|prefix| name.starts_with(prefix.as_str()))
            .map(|prefix| format!("{prefix}*"))
    }
}

/// Host patterns: exact (case-insensitive), `*.suffix` or `*`.
#[derive(Debug, Default)]
struct HostSet {
    exact: HashSet<String>,
    suffixes: Vec<String>,
    any: bool,
}

impl HostSet {
    fn compile(patterns: &[String]) -> Self {
        let mut set = Self::default();
        for pattern in patterns {
            let pattern = pattern.trim().to_ascii_lowercase();
            if pattern == "*" {
                set.any = true;
            } else if let Some(suffix) = pattern.strip_prefix("*.") {
                set.suffixes.push(suffix.to_string());
            } else {
                set.exact.insert(pattern);
            }
        }
        set
    }

    fn find(&self, host: &str) -> Option<String> {
        if self.any {
            return Some("*".to_string());
        }
        if self.exact.contains(host) {
            return Some(host.to_string());
        }
        self.suffixes
            .iter()
            .find(|suffix| {
                host.len() > suffix.len()
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
            })
            .map(|suffix| format!("*.{suffix}"))
    }
}

/// Compiled request policy for efficient runtime evaluation.
#[derive(Debug)]
pub struct RequestPolicy {
    enabled: bool,
    default_action: PolicyAction,
    allow_tools: NameSet,
    deny_tools: NameSet,
    allowed_methods: HashSet<String>,
    allow_hosts: HostSet,
    deny_hosts: HostSet,
    log_denied: bool,
}

impl RequestPolicy {
    /// Compile a policy from configuration.
    #[must_use]
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            enabled: config.enabled,
            default_action: config.default_action,
            allow_tools: NameSet::compile(&config.allow_tools),
            deny_tools: NameSet::compile(&config.deny_tools),
            allowed_methods: config
                .allowed_methods
                .iter()
                .map(|m| m.trim().to_ascii_uppercase())
                .collect(),
            allow_hosts: HostSet::compile(&config.allow_hosts),
            deny_hosts: HostSet::compile(&config.deny_hosts),
            log_denied: config.log_denied,
        }
    }

    /// Evaluate a request.
    ///
    /// Evaluation order:
    /// 1. If policy is disabled, allow.
    /// 2. If the tool is denied (and not explicitly allowed), deny.
    /// 3. If the method is not in the allowed set, deny.
    /// 4. If the host is explicitly allowed, allow (takes precedence).
    /// 5. If the host is denied, deny.
    /// 6. If the tool is explicitly allowed, allow.
    /// 7. Fall back to the default action.
    #[must_use]
    pub fn evaluate(&self, tool: &str, method: &str, host: &str) -> PolicyVerdict {
        if !self.enabled {
            return PolicyVerdict::allow("policy_disabled");
        }

        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let tool_allowed = self.allow_tools.find(tool);

        if tool_allowed.is_none()
            && let Some(rule) = self.deny_tools.find(tool)
        {
            return self.denied(tool, method, &host, PolicyVerdict::deny("tool_denied").with_rule(rule));
        }

        if !self.allowed_methods.contains(&method.to_ascii_uppercase()) {
            return self.denied(tool, method, &host, PolicyVerdict::deny("method_not_allowed"));
        }

        if let Some(rule) = self.allow_hosts.find(&host) {
            return PolicyVerdict::allow("host_allowed").with_rule(rule);
        }

        if let Some(rule) = self.deny_hosts.find(&host) {
            return self.denied(tool, method, &host, PolicyVerdict::deny("host_denied").with_rule(rule));
        }

        if let Some(rule) = tool_allowed {
            return PolicyVerdict::allow("tool_allowed").with_rule(rule);
        }

        match self.default_action {
            PolicyAction::Allow => PolicyVerdict::allow("default_allow"),
            PolicyAction::Deny => self.denied(tool, method, &host, PolicyVerdict::deny("default_deny")),
        }
    }

    fn denied(&self, tool: &str, method: &str, host: &str, verdict: PolicyVerdict) -> PolicyVerdict {
        if self.log_denied {
            tracing::warn!(
                tool = tool,
                method = method,
                host = host,
                reason = %verdict.reason,
                rule = verdict.rule.as_deref().unwrap_or(""),
                "Request denied by policy"
            );
        }
        verdict
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}
