//! HTTP transport for MCP servers
//!
//! Handles connecting to MCP servers over Streamable HTTP.
//! Headers are layered as: configured headers, then `${VAR}` expansion, then
//! for OAuth servers the cached bearer token from the server's provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use skillmux_core::expand::expand_map_values;
use skillmux_core::{redact_url, ClientIdentity, McpError, McpResult, TransportType};
use tracing::{debug, error, info, warn};

use super::Transport;
use crate::pool::instance::{McpClientHandler, McpConnection, RmcpConnection};
use crate::pool::oauth::OAuthProvider;

/// HTTP transport for Streamable HTTP MCP servers
pub struct HttpTransport {
    identity: ClientIdentity,
    url: String,
    headers: HashMap<String, String>,
    auth_provider: Option<Arc<dyn OAuthProvider>>,
    handler: McpClientHandler,
    connect_timeout: Duration,
    close_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        identity: ClientIdentity,
        url: String,
        headers: HashMap<String, String>,
        auth_provider: Option<Arc<dyn OAuthProvider>>,
        handler: McpClientHandler,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            url,
            headers,
            auth_provider,
            handler,
            connect_timeout,
            close_timeout,
        }
    }

    /// Build the header map from configured headers, with placeholders expanded.
    ///
    /// Errors name the offending header but never echo its value.
    fn build_default_headers(&self) -> McpResult<HeaderMap> {
        let mut header_map = HeaderMap::new();
        for (key, value) in expand_map_values(&self.headers) {
            let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                McpError::Configuration(format!(
                    "Invalid header name '{}' for MCP server \"{}\": {}",
                    key, self.identity.server_name, e
                ))
            })?;
            let header_value = HeaderValue::from_str(&value).map_err(|_| {
                McpError::Configuration(format!(
                    "Invalid header value for '{}' on MCP server \"{}\"",
                    key, self.identity.server_name
                ))
            })?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }

    /// Add the cached OAuth bearer token, if the provider has one.
    ///
    /// A failing lookup is logged and the connection proceeds without it.
    async fn apply_oauth_token(&self, header_map: &mut HeaderMap) {
        let Some(provider) = &self.auth_provider else {
            return;
        };

        match provider.tokens().await {
            Ok(Some(token)) => {
                if token.is_expired() {
                    debug!(
                        server = %self.identity.server_name,
                        "[HttpTransport] Cached OAuth token is expired, sending it anyway"
                    );
                }
                match HeaderValue::from_str(&format!("Bearer {}", token.access_token)) {
                    Ok(value) => {
                        header_map.insert(AUTHORIZATION, value);
                    }
                    Err(_) => warn!(
                        server = %self.identity.server_name,
                        "[HttpTransport] OAuth token is not a valid header value, skipping"
                    ),
                }
            }
            Ok(None) => {
                debug!(
                    server = %self.identity.server_name,
                    "[HttpTransport] No cached OAuth token"
                );
            }
            Err(e) => {
                warn!(
                    server = %self.identity.server_name,
                    error = %e,
                    "[HttpTransport] OAuth token lookup failed, connecting without it"
                );
            }
        }
    }

    fn build_http_client(&self, header_map: HeaderMap) -> McpResult<reqwest::Client> {
        reqwest::Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(|e| self.connection_error(format!("failed to build HTTP client: {}", e)))
    }

    /// Redact our URL wherever it appears in `text`.
    ///
    /// Client library errors quote the request URL, sometimes in normalized form.
    fn scrub(&self, text: &str) -> String {
        scrub_url(text, &self.url)
    }

    fn connection_error(&self, cause: impl std::fmt::Display) -> McpError {
        let cause = self.scrub(&cause.to_string());
        McpError::Connection(format!(
            "Failed to connect to MCP server \"{}\" (skill \"{}\").\n\
             URL: {}\n\
             Reason: {}\n\
             \n\
             Hints:\n\
             - Check that the URL is correct and the server is running\n\
             - Check network access, proxies and firewalls\n\
             - If the server requires authentication, check the configured headers or oauth",
            self.identity.server_name,
            self.identity.skill_name,
            redact_url(&self.url),
            cause
        ))
    }
}

/// Replace `url`, raw or in `url::Url`'s normalized form, with its redacted form.
pub(crate) fn scrub_url(text: &str, url: &str) -> String {
    let mut scrubbed = text.replace(url, &redact_url(url));
    if let Ok(parsed) = url::Url::parse(url) {
        let normalized = parsed.to_string();
        if normalized != url {
            scrubbed = scrubbed.replace(&normalized, &redact_url(&normalized));
        }
    }
    scrubbed
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> McpResult<Arc<dyn McpConnection>> {
        let redacted = redact_url(&self.url);

        if let Err(e) = url::Url::parse(&self.url) {
            return Err(McpError::Configuration(format!(
                "Invalid URL for MCP server \"{}\" in skill \"{}\": {} ({})",
                self.identity.server_name, self.identity.skill_name, redacted, e
            )));
        }

        info!(
            pool_key = %self.identity.pool_key(),
            url = %redacted,
            "[HttpTransport] Connecting to HTTP server"
        );

        let mut header_map = self.build_default_headers()?;
        self.apply_oauth_token(&mut header_map).await;

        if !header_map.is_empty() {
            debug!(
                server = %self.identity.server_name,
                header_count = header_map.len(),
                "[HttpTransport] Applying headers to connection"
            );
        }

        let client = self.build_http_client(header_map)?;
        let transport_config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, transport_config);

        // Dropping the handshake future on failure or timeout drops the transport.
        let client = match tokio::time::timeout(
            self.connect_timeout,
            self.handler.clone().serve(transport),
        )
        .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                error!(
                    server = %self.identity.server_name,
                    url = %redacted,
                    error = %self.scrub(&e.to_string()),
                    "[HttpTransport] HTTP connection failed"
                );
                return Err(self.connection_error(format!("MCP handshake failed: {}", e)));
            }
            Err(_) => {
                error!(
                    server = %self.identity.server_name,
                    url = %redacted,
                    timeout = ?self.connect_timeout,
                    "[HttpTransport] HTTP connection timed out"
                );
                return Err(self.connection_error(format!(
                    "connection timed out after {:?}",
                    self.connect_timeout
                )));
            }
        };

        info!(
            pool_key = %self.identity.pool_key(),
            "[HttpTransport] HTTP server connected"
        );

        Ok(Arc::new(
            RmcpConnection::new(
                self.identity.server_name.clone(),
                TransportType::Http,
                client,
                self.close_timeout,
            )
            .with_url(self.url.clone()),
        ))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn description(&self) -> String {
        format!("http:{}", redact_url(&self.url))
    }
}
