//! Production gateway: security checks, then a real HTTP fetch.

use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName,
    HeaderValue, LOCATION, PROXY_AUTHORIZATION, TRANSFER_ENCODING, WWW_AUTHENTICATE,
};
use reqwest::{Client, Method, Proxy, Response, StatusCode, redirect};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::metadata::{GatewayMetadata, MetadataStatus, render_result};
use super::{FetchGateway, FetchRequest, RequestBody};
use crate::config::{Config, GatewayConfig};
use crate::protocol::ToolsCallResult;
use crate::security::{
    DlpAction, DlpScanner, PolicyVerdict, RateLimiter, RequestPolicy, SsrfGuard, SsrfViolation,
    sanitize,
};
use crate::Result;

/// Resolver for the HTTP client: every connection, including redirect
/// hops, dials only addresses that passed the SSRF guard.
struct GuardedResolver {
    guard: SsrfGuard,
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            match guard.resolve(&host, 0).await {
                Ok(addrs) => Ok(Box::new(addrs.into_iter()) as Addrs),
                Err(violation) => {
                    warn!(host = %host, %violation, "Connection refused by SSRF guard");
                    Err(Box::new(violation) as Box<dyn StdError + Send + Sync>)
                }
            }
        })
    }
}

/// Why a call did not produce a body.
#[derive(Debug)]
struct Denial {
    status: MetadataStatus,
    /// Replaces the metadata policy verdict when set
    verdict: Option<PolicyVerdict>,
    message: String,
}

impl Denial {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: MetadataStatus::Error,
            verdict: Some(PolicyVerdict::deny("invalid_request")),
            message: message.into(),
        }
    }

    fn blocked(verdict: PolicyVerdict, message: impl Into<String>) -> Self {
        Self {
            status: MetadataStatus::Blocked,
            verdict: Some(verdict),
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: MetadataStatus::Error,
            verdict: None,
            message: message.into(),
        }
    }
}

/// Gateway that enforces the security layer and performs the request with
/// `reqwest`.
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
    sanitize_input: bool,
    ssrf: SsrfGuard,
    policy: RequestPolicy,
    dlp: DlpScanner,
    rate_limiter: RateLimiter,
}

impl HttpGateway {
    /// Build the gateway and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if a DLP pattern is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let ssrf = SsrfGuard::from_config(&config.security.ssrf);
        if !ssrf.is_enabled() {
            warn!("SSRF protection is disabled; requests may reach internal networks");
        }

        let mut builder = Client::builder();
        builder = match &config.gateway.proxy {
            // The proxy resolves upstream names; hops are still checked
            // before each request
            Some(proxy) => builder.proxy(Proxy::all(proxy.as_str())?),
            None if ssrf.resolves_dns() => builder.no_proxy().dns_resolver(GuardedResolver {
                guard: ssrf.clone(),
            }),
            None => builder.no_proxy(),
        };

        // Redirects are followed in `send`, where every hop is re-checked
        let client = builder
            .timeout(config.gateway.timeout)
            .connect_timeout(config.gateway.connect_timeout)
            .user_agent(config.gateway.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            config: config.gateway.clone(),
            sanitize_input: config.security.sanitize_input,
            ssrf,
            policy: RequestPolicy::from_config(&config.security.policy),
            dlp: DlpScanner::from_config(&config.security.dlp)?,
            rate_limiter: RateLimiter::new(&config.security.rate_limit),
        })
    }

    /// Steps 1-7 of the pipeline. `Ok` carries the body text for block 0.
    async fn execute(
        &self,
        tool: &str,
        request: FetchRequest,
        meta: &mut GatewayMetadata,
    ) -> std::result::Result<String, Denial> {
        // 1. Validate
        let Some(raw_url) = request.url else {
            return Err(Denial::invalid("Missing required argument: url"));
        };
        if let Some(problem) = request.invalid_argument {
            return Err(Denial::invalid(problem));
        }

        // 2. Sanitize
        let (headers, body) = if self.sanitize_input {
            sanitize_inputs(&raw_url, request.headers, request.body).map_err(|e| {
                Denial::blocked(PolicyVerdict::deny("unsafe_input"), format!("Request rejected: {e}"))
            })?
        } else {
            (request.headers, request.body)
        };

        let url = self.validate_url(&raw_url)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Denial::invalid(format!("Invalid HTTP method: {}", request.method)))?;
        let mut header_map = build_headers(&headers)?;

        // 3. Rate limit
        if !self.rate_limiter.try_acquire() {
            return Err(Denial::blocked(
                PolicyVerdict::deny("rate_limited"),
                "Request blocked: rate limit exceeded",
            ));
        }

        // 4. Policy
        let host = url.host_str().unwrap_or_default();
        let verdict = self.policy.evaluate(tool, method.as_str(), host);
        meta.policy = verdict.clone();
        if !verdict.is_allowed() {
            let message = format!("Request blocked by policy: {}", verdict.reason);
            return Err(Denial::blocked(verdict, message));
        }

        // 5. SSRF
        if let Err(violation) = self.ssrf.check(&url).await {
            return Err(ssrf_denial(&violation, "ssrf_blocked"));
        }

        // 6. Fetch
        let body = match body {
            None => None,
            Some(RequestBody::Text(text)) => Some(text.into_bytes()),
            Some(RequestBody::Json(value)) => {
                let encoded = serde_json::to_vec(&value)
                    .map_err(|e| Denial::invalid(format!("Body is not serializable: {e}")))?;
                if !header_map.contains_key(CONTENT_TYPE) {
                    header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(encoded)
            }
        };

        let mut response = self.send(tool, method, url, header_map, body, meta).await?;

        meta.http_status = Some(response.status().as_u16());
        meta.content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let limit = self.config.max_response_bytes;
        let mut bytes = Vec::new();
        let mut truncated = false;
        let redirected = meta.final_url.is_some();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.send_failure(&e, redirected))?
        {
            let remaining = limit - bytes.len();
            if chunk.len() > remaining {
                bytes.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        if truncated {
            debug!(limit, "Response body truncated");
        }

        meta.body_bytes = Some(bytes.len());
        meta.truncated = Some(truncated);
        meta.body_sha256 = Some(hex::encode(Sha256::digest(&bytes)));
        let mut text = String::from_utf8_lossy(&bytes).into_owned();

        // 7. DLP
        if self.dlp.is_enabled() {
            let report = self.dlp.scan(&text);
            meta.dlp = Some(report.clone());
            if report.detected {
                match self.dlp.action() {
                    DlpAction::Report => {
                        warn!(findings = %report.kinds(), "Sensitive data detected in response");
                    }
                    DlpAction::Redact => {
                        info!(findings = %report.kinds(), "Redacting sensitive data in response");
                        text = self.dlp.redact(&text);
                    }
                    DlpAction::Block => {
                        let kinds = report.kinds();
                        return Err(Denial::blocked(
                            PolicyVerdict::deny("dlp_blocked").with_rule(kinds.clone()),
                            format!("Response blocked: sensitive data detected ({kinds})"),
                        ));
                    }
                }
            }
        }

        Ok(text)
    }

    fn validate_url(&self, raw: &str) -> std::result::Result<Url, Denial> {
        let url = Url::parse(raw).map_err(|e| Denial::invalid(format!("Invalid URL '{raw}': {e}")))?;

        if !self.config.allowed_schemes.iter().any(|s| s == url.scheme()) {
            return Err(Denial::invalid(format!(
                "URL scheme '{}' is not allowed",
                url.scheme()
            )));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Denial::invalid("URLs with embedded credentials are not allowed"));
        }
        if url.host().is_none() {
            return Err(Denial::invalid("URL has no host"));
        }
        Ok(url)
    }

    /// Send the request, following up to `max_redirects` redirects.
    ///
    /// Each hop passes the same scheme, policy and SSRF checks as the
    /// original URL. The redirect response itself is returned once the
    /// limit is reached.
    async fn send(
        &self,
        tool: &str,
        mut method: Method,
        mut url: Url,
        mut headers: HeaderMap,
        mut body: Option<Vec<u8>>,
        meta: &mut GatewayMetadata,
    ) -> std::result::Result<Response, Denial> {
        let deadline = Instant::now() + self.config.timeout;
        let mut hops = 0usize;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out());
            }

            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .timeout(remaining);
            if let Some(bytes) = &body {
                builder = builder.body(bytes.clone());
            }
            let response = builder
                .send()
                .await
                .map_err(|e| self.send_failure(&e, hops > 0))?;

            let status = response.status();
            if !is_followed_redirect(status) {
                return Ok(response);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            else {
                return Ok(response);
            };
            if hops >= self.config.max_redirects {
                debug!(
                    max_redirects = self.config.max_redirects,
                    "Redirect limit reached, returning redirect response"
                );
                return Ok(response);
            }

            let next = url
                .join(&location)
                .map_err(|e| Denial::failed(format!("Invalid redirect location '{location}': {e}")))?;

            // 303 always becomes GET; 301/302 turn POST into GET
            if (status == StatusCode::SEE_OTHER && method != Method::HEAD)
                || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
                    && method == Method::POST)
            {
                method = Method::GET;
                body = None;
                for name in [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_ENCODING, TRANSFER_ENCODING] {
                    headers.remove(name);
                }
            }
            if next.origin() != url.origin() {
                for name in [AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE] {
                    headers.remove(name);
                }
            }

            self.check_hop(tool, &method, &next).await?;
            debug!(from = %url, to = %next, status = status.as_u16(), "Following redirect");

            hops += 1;
            meta.final_url = Some(next.to_string());
            url = next;
        }
    }

    /// Gate a redirect target like a fresh request.
    async fn check_hop(&self, tool: &str, method: &Method, next: &Url) -> std::result::Result<(), Denial> {
        let scheme = next.scheme();
        if !self.config.allowed_schemes.iter().any(|s| s == scheme) {
            return Err(Denial::blocked(
                PolicyVerdict::deny("scheme_not_allowed").with_rule(scheme),
                format!("Request blocked: redirect to disallowed scheme '{scheme}'"),
            ));
        }

        let host = next.host_str().unwrap_or_default();
        let verdict = self.policy.evaluate(tool, method.as_str(), host);
        if !verdict.is_allowed() {
            let message = format!("Redirect to {host} blocked by policy: {}", verdict.reason);
            return Err(Denial::blocked(verdict, message));
        }

        self.ssrf
            .check(next)
            .await
            .map_err(|violation| ssrf_denial(&violation, "ssrf_redirect_blocked"))
    }

    /// Classify a transport failure, surfacing connect-time SSRF refusals.
    fn send_failure(&self, err: &reqwest::Error, redirected: bool) -> Denial {
        if let Some(violation) = find_ssrf_violation(err) {
            let reason = if redirected { "ssrf_redirect_blocked" } else { "ssrf_blocked" };
            return ssrf_denial(violation, reason);
        }

        if err.is_timeout() {
            self.timed_out()
        } else if err.is_connect() {
            Denial::failed(format!("Failed to connect to upstream: {err}"))
        } else {
            Denial::failed(format!("Upstream request failed: {err}"))
        }
    }

    fn timed_out(&self) -> Denial {
        Denial::failed(format!(
            "Upstream request timed out after {}",
            format_duration(self.config.timeout)
        ))
    }
}

#[async_trait]
impl FetchGateway for HttpGateway {
    async fn invoke(&self, tool_name: &str, request: FetchRequest) -> ToolsCallResult {
        let started = Instant::now();
        let mut meta = GatewayMetadata::new(
            tool_name,
            &request.method,
            request.url.as_deref(),
            PolicyVerdict::allow("default_allow"),
        );

        let text = match self.execute(tool_name, request, &mut meta).await {
            Ok(body) => body,
            Err(denial) => {
                meta.status = denial.status;
                if let Some(verdict) = denial.verdict {
                    meta.policy = verdict;
                }
                denial.message
            }
        };
        meta.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match meta.status {
            MetadataStatus::Ok => info!(
                request_id = %meta.request_id,
                tool = tool_name,
                method = %meta.method,
                url = meta.url.as_deref().unwrap_or(""),
                http_status = meta.http_status.unwrap_or_default(),
                body_bytes = meta.body_bytes.unwrap_or_default(),
                duration_ms = meta.duration_ms,
                "Tool call completed"
            ),
            MetadataStatus::Blocked => warn!(
                request_id = %meta.request_id,
                tool = tool_name,
                url = meta.url.as_deref().unwrap_or(""),
                reason = %meta.policy.reason,
                "Tool call blocked"
            ),
            MetadataStatus::Error => warn!(
                request_id = %meta.request_id,
                tool = tool_name,
                url = meta.url.as_deref().unwrap_or(""),
                error = %text,
                "Tool call failed"
            ),
        }

        render_result(text, &meta)
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Find an [`SsrfViolation`] raised by [`GuardedResolver`] in an error chain.
fn find_ssrf_violation(err: &reqwest::Error) -> Option<&SsrfViolation> {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(violation) = cause.downcast_ref::<SsrfViolation>() {
            return Some(violation);
        }
        // io::Error hides a custom payload from `source()`
        if let Some(inner) = cause.downcast_ref::<io::Error>().and_then(io::Error::get_ref)
            && let Some(violation) = inner.downcast_ref::<SsrfViolation>()
        {
            return Some(violation);
        }
        source = cause.source();
    }
    None
}

fn ssrf_denial(violation: &SsrfViolation, reason: &str) -> Denial {
    if violation.is_block() {
        Denial::blocked(
            PolicyVerdict::deny(reason).with_rule("ssrf"),
            format!("Request blocked: {violation}"),
        )
    } else {
        Denial::failed(format!("Request failed: {violation}"))
    }
}

fn sanitize_inputs(
    url: &str,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
) -> Result<(Vec<(String, String)>, Option<RequestBody>)> {
    sanitize::reject_null_bytes("url", url)?;

    let headers = headers
        .into_iter()
        .map(|(name, value)| {
            sanitize::reject_null_bytes("header name", &name)?;
            let value = sanitize::sanitize_header_value(&name, &value)?;
            Ok((name, value))
        })
        .collect::<Result<Vec<_>>>()?;

    let body = match body {
        Some(RequestBody::Text(text)) => {
            sanitize::reject_null_bytes("body", &text)?;
            Some(RequestBody::Text(text))
        }
        Some(RequestBody::Json(value)) => Some(RequestBody::Json(sanitize::sanitize_json_value(&value)?)),
        None => None,
    };

    Ok((headers, body))
}

fn build_headers(headers: &[(String, String)]) -> std::result::Result<HeaderMap, Denial> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Denial::invalid(format!("Invalid header name: {name}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| Denial::invalid(format!("Invalid value for header '{name}'")))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("config", &self.config)
            .field("ssrf", &self.ssrf)
            .field("policy", &self.policy)
            .field("dlp", &self.dlp)
            .finish_non_exhaustive()
    }
}
