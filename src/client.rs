use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::utils::parse_headers_with_escapes;

/// Configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub skip_tls_verify: bool,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(30),
            skip_tls_verify: false,
            resolve_target_addr: None,
            custom_headers: None,
        }
    }
}

/// Result of building the client, includes parsed headers for logging.
pub struct ClientBuildResult {
    pub client: reqwest::Client,
    pub parsed_headers: HeaderMap,
}

/// Builds the shared reqwest client used by every scenario.
pub fn build_client(
    config: &ClientConfig,
) -> Result<ClientBuildResult, Box<dyn std::error::Error + Send + Sync>> {
    let mut client_builder = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout);

    info!(
        timeout = ?config.request_timeout,
        max_idle_per_host = config.pool_max_idle_per_host,
        idle_timeout = ?config.pool_idle_timeout,
        "Connection pool configured"
    );

    // DNS Override Configuration
    if let Some(ref resolve_str) = config.resolve_target_addr {
        if !resolve_str.is_empty() {
            client_builder = configure_dns_override(client_builder, resolve_str)?;
        } else {
            warn!("RESOLVE_TARGET_ADDR is set but empty, no DNS override will be applied");
        }
    }

    // Custom Headers Configuration
    let parsed_headers = configure_custom_headers(config.custom_headers.as_deref())?;
    if !parsed_headers.is_empty() {
        client_builder = client_builder.default_headers(parsed_headers.clone());
        info!(count = parsed_headers.len(), "Configured custom default headers");
    }

    let client = if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?
    } else {
        client_builder.build()?
    };

    Ok(ClientBuildResult {
        client,
        parsed_headers,
    })
}

fn configure_dns_override(
    client_builder: reqwest::ClientBuilder,
    resolve_str: &str,
) -> Result<reqwest::ClientBuilder, Box<dyn std::error::Error + Send + Sync>> {
    let (hostname, socket_addr) = parse_dns_override(resolve_str)?;
    info!(
        hostname = %hostname,
        addr = %socket_addr,
        "Configured DNS override"
    );
    Ok(client_builder.resolve(&hostname, socket_addr))
}

/// Parses `hostname:ip:port`.
fn parse_dns_override(
    resolve_str: &str,
) -> Result<(String, SocketAddr), Box<dyn std::error::Error + Send + Sync>> {
    let parts: Vec<&str> = resolve_str.split(':').map(str::trim).collect();
    let [hostname, ip, port] = parts.as_slice() else {
        return Err(format!(
            "RESOLVE_TARGET_ADDR ('{}') is not in the expected format 'hostname:ip:port'",
            resolve_str
        )
        .into());
    };

    for (part, label) in [(hostname, "hostname"), (ip, "IP address"), (port, "port")] {
        if part.is_empty() {
            return Err(format!(
                "RESOLVE_TARGET_ADDR: {} part cannot be empty. Format: 'hostname:ip:port'",
                label
            )
            .into());
        }
    }

    let port: u16 = port.parse().map_err(|e| {
        format!(
            "Failed to parse port '{}' in RESOLVE_TARGET_ADDR: {}. Must be a valid u16",
            port, e
        )
    })?;

    let socket_addr: SocketAddr = format!("{}:{}", ip, port).parse().map_err(|e| {
        format!(
            "Failed to parse IP '{}' in RESOLVE_TARGET_ADDR: {}",
            ip, e
        )
    })?;

    Ok((hostname.to_string(), socket_addr))
}

fn configure_custom_headers(
    custom_headers_str: Option<&str>,
) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
    let mut parsed_headers = HeaderMap::new();

    let headers_str = match custom_headers_str {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(parsed_headers),
    };

    for header_pair_str in parse_headers_with_escapes(headers_str) {
        let header_pair_str = header_pair_str.trim();
        if header_pair_str.is_empty() {
            continue;
        }

        let Some((name_str, value_str)) = header_pair_str.split_once(':') else {
            return Err(format!(
                "Invalid header format in CUSTOM_HEADERS: '{}'. Expected 'Name:Value'.",
                header_pair_str
            )
            .into());
        };

        let name_str = name_str.trim();
        let value_str = value_str.trim();

        if name_str.is_empty() {
            return Err(format!(
                "Invalid header format: Header name cannot be empty in '{}'.",
                header_pair_str
            )
            .into());
        }

        let header_name = HeaderName::from_str(name_str)
            .map_err(|e| format!("Invalid header name: {}. Name: '{}'", e, name_str))?;
        let header_value = HeaderValue::from_str(value_str).map_err(|e| {
            format!(
                "Invalid header value for '{}': {}. Value: '{}'",
                name_str, e, value_str
            )
        })?;

        parsed_headers.insert(header_name, header_value);
    }

    Ok(parsed_headers)
}
