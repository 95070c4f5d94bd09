//! Data-loss-prevention scanning of fetched content.
//!
//! Regex detectors for credentials and personal data, with optional
//! validators (Luhn for card numbers, area/group/serial rules for SSNs) to
//! keep false positives down. The gateway reports, redacts or blocks based
//! on [`DlpAction`].

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What to do when a detector fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DlpAction {
    /// Annotate the metadata only
    #[default]
    Report,
    /// Replace matches with `[REDACTED:<kind>]`
    Redact,
    /// Withhold the body and deny the call
    Block,
}

/// An operator-supplied detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlpPattern {
    /// Finding kind reported in metadata
    pub name: String,
    /// Regular expression
    pub pattern: String,
}

/// DLP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DlpConfig {
    /// Enable scanning.
    pub enabled: bool,
    /// Action on detection.
    pub action: DlpAction,
    /// Include the built-in detectors.
    pub builtin: bool,
    /// Extra detectors.
    pub patterns: Vec<DlpPattern>,
}

impl Default for DlpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action: DlpAction::Report,
            builtin: true,
            patterns: Vec::new(),
        }
    }
}

/// Post-match check on a candidate.
type Validator = fn(&str) -> bool;

const BUILTIN_DETECTORS: &[(&str, &str, Option<Validator>)] = &[
    ("aws_access_key_id", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b", None),
    ("private_key", r"-----BEGIN (?:[A-Z0-9]+ )*PRIVATE KEY-----", None),
    (
        "github_token",
        r"\b(?:gh[pousr]_[A-Za-z0-9]{36,255}|github_pat_[A-Za-z0-9_]{22,255})\b",
        None,
    ),
    ("slack_token", r"\bxox[abposr]-[A-Za-z0-9-]{10,}\b", None),
    ("jwt", r"\beyJ[A-Za-z0-9_-]{5,}\.eyJ[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{5,}", None),
    ("us_ssn", r"\b\d{3}-\d{2}-\d{4}\b", Some(valid_ssn)),
    ("credit_card", r"\b\d(?:[ -]?\d){12,18}\b", Some(luhn_valid)),
    ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", None),
];

/// Luhn checksum over the digits of `candidate`.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                *d
            }
        })
        .sum();
    sum % 10 == 0
}

/// SSN structural rules: area not 000/666/9xx, group not 00, serial not 0000.
fn valid_ssn(candidate: &str) -> bool {
    let mut parts = candidate.split('-');
    let (Some(area), Some(group), Some(serial)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

struct Detector {
    kind: String,
    regex: Regex,
    validator: Option<Validator>,
}

impl Detector {
    fn matches<'t>(&'t self, text: &'t str) -> impl Iterator<Item = regex::Match<'t>> + 't {
        self.regex
            .find_iter(text)
            .filter(|m| self.validator.is_none_or(|validate| validate(m.as_str())))
    }
}

/// Count of matches for one detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlpFinding {
    /// Detector name
    pub kind: String,
    /// Number of matches
    pub count: usize,
}

/// Result of scanning one body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlpReport {
    /// Whether anything was found
    pub detected: bool,
    /// Configured action
    pub action: DlpAction,
    /// Per-detector counts, in detector order
    pub findings: Vec<DlpFinding>,
}

impl DlpReport {
    /// Comma-separated finding kinds, for messages and logs.
    #[must_use]
    pub fn kinds(&self) -> String {
        self.findings
            .iter()
            .map(|f| f.kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compiled DLP scanner.
pub struct DlpScanner {
    enabled: bool,
    action: DlpAction,
    detectors: Vec<Detector>,
}

impl DlpScanner {
    /// Compile a scanner from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a configured pattern is not a valid regex.
    pub fn from_config(config: &DlpConfig) -> Result<Self> {
        let mut detectors = Vec::new();

        if config.builtin {
            for (kind, pattern, validator) in BUILTIN_DETECTORS {
                let regex = Regex::new(pattern)
                    .map_err(|e| Error::Config(format!("built-in DLP pattern '{kind}': {e}")))?;
                detectors.push(Detector {
                    kind: (*kind).to_string(),
                    regex,
                    validator: *validator,
                });
            }
        }

        for extra in &config.patterns {
            let regex = Regex::new(&extra.pattern).map_err(|e| {
                Error::Config(format!("Invalid DLP pattern '{}': {e}", extra.name))
            })?;
            detectors.push(Detector {
                kind: extra.name.clone(),
                regex,
                validator: None,
            });
        }

        Ok(Self {
            enabled: config.enabled,
            action: config.action,
            detectors,
        })
    }

    /// Whether scanning is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured action.
    #[must_use]
    pub fn action(&self) -> DlpAction {
        self.action
    }

    /// Scan text and count matches per detector.
    #[must_use]
    pub fn scan(&self, text: &str) -> DlpReport {
        let findings: Vec<DlpFinding> = self
            .detectors
            .iter()
            .filter_map(|detector| {
                let count = detector.matches(text).count();
                (count > 0).then(|| DlpFinding {
                    kind: detector.kind.clone(),
                    count,
                })
            })
            .collect();

        DlpReport {
            detected: !findings.is_empty(),
            action: self.action,
            findings,
        }
    }

    /// Replace every validated match with `[REDACTED:<kind>]`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for detector in &self.detectors {
            let replacement = format!("[REDACTED:{}]", detector.kind);
            let mut redacted = String::with_capacity(out.len());
            let mut last = 0;
            let mut replaced = false;
            for m in detector.matches(&out) {
                redacted.push_str(&out[last..m.start()]);
                redacted.push_str(&replacement);
                last = m.end();
                replaced = true;
            }
            if !replaced {
                continue;
            }
            redacted.push_str(&out[last..]);
            out = redacted;
        }
        out
    }
}

impl std::fmt::Debug for DlpScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DlpScanner")
            .field("enabled", &self.enabled)
            .field("action", &self.action)
            .field("detectors", &self.detectors.len())
            .finish()
    }
}
