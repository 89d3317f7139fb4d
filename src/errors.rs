//! Error categorization for failed checks.
//!
//! A failed step is either an unexpected HTTP status or a transport error.
//! Both are classified so the failure breakdown in the report and in
//! Prometheus says *why* requests failed, not only how many.

use std::fmt;

/// Categories of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    /// A 2xx/3xx status outside the step's accepted set
    UnexpectedStatus,

    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize a status code that the step did not accept.
    pub fn from_status_code(status_code: u16) -> Self {
        match status_code {
            200..=399 => ErrorCategory::UnexpectedStatus,
            400..=499 => ErrorCategory::ClientError,
            500..=599 => ErrorCategory::ServerError,
            _ => ErrorCategory::OtherError,
        }
    }

    /// Categorize a reqwest transport error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return ErrorCategory::TimeoutError;
        }
        if error.is_connect() || error.is_request() || error.is_body() || error.is_decode() {
            return ErrorCategory::NetworkError;
        }
        if error.is_redirect() {
            return ErrorCategory::ClientError;
        }
        Self::from_message(&error.to_string())
    }

    /// Fallback classification from an error message.
    fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("certificate") || message.contains("tls") || message.contains("ssl") {
            ErrorCategory::TlsError
        } else if message.contains("timeout") || message.contains("timed out") {
            ErrorCategory::TimeoutError
        } else if message.contains("dns") || message.contains("connect") {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::UnexpectedStatus => "unexpected_status",
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::UnexpectedStatus => "Unexpected Success/Redirect Status",
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Reason phrase for status codes the finance API returns.
pub fn status_reason(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}
