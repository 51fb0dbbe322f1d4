//! # Server Address Validation
//!
//! Pure checks applied before a shared-store address is persisted or a
//! realtime channel is opened.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "192.168.1.50:3001"         → http://192.168.1.50:3001    (scheme)   │
//! │  "http://pos-server:3001/"   → http://pos-server:3001      (slash)    │
//! │  "http://169.254.10.5:3001"  → LinkLocalAddress            (reject)   │
//! │  "http://[fe80::1]:3001"     → LinkLocalAddress            (reject)   │
//! │  "ftp://host"                → UnsupportedScheme           (reject)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Link-local addresses are picked up by interface auto-detection but are
//! never routable between machines.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::ValidationError;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Returns true for 169.254.0.0/16 and fe80::/10.
pub fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_link_local_v4(v4),
        IpAddr::V6(v6) => is_link_local_v6(v6),
    }
}

fn is_link_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_link_local()
}

fn is_link_local_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_link_local_v4(v4);
    }
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// True when the URL's host is a link-local literal.
pub fn is_link_local_url(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => is_link_local_v4(ip),
        Some(Host::Ipv6(ip)) => is_link_local_v6(ip),
        _ => false,
    }
}

/// Parses and normalizes a shared-store base address.
///
/// A missing scheme defaults to `http://`. Paths, queries and trailing
/// slashes are dropped so the result is a bare origin.
pub fn parse_server_address(raw: &str) -> ValidationResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "server address".to_string(),
        });
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|e| ValidationError::InvalidFormat {
        field: "server address".to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::Required {
            field: "server host".to_string(),
        });
    }

    if is_link_local_url(&url) {
        return Err(ValidationError::LinkLocalAddress {
            address: trimmed.to_string(),
        });
    }

    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Normalized base address as a string without trailing slash.
pub fn normalize_server_address(raw: &str) -> ValidationResult<String> {
    let url = parse_server_address(raw)?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Realtime channel URL for a base address: `http` → `ws`, `https` → `wss`.
pub fn realtime_url(base: &str, path: &str) -> ValidationResult<Url> {
    let mut url = parse_server_address(base)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| ValidationError::UnsupportedScheme {
            scheme: scheme.to_string(),
        })?;
    url.set_path(path);
    Ok(url)
}

/// Default address for a terminal hosting the shared store itself.
pub fn loopback_address(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}
