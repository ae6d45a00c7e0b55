//! Network settings for a runtime instance

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol the instance serves locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Desired network placement of one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Requested port. Zero lets the engine choose; the bound port is
    /// reported back in the readiness message.
    pub port: u16,
    /// Bind address.
    pub host: String,
    pub protocol: Protocol,
    /// Origin to forward unmatched requests to, e.g. `example.com`.
    pub upstream: Option<String>,
    /// Port of the engine's debug-protocol listing endpoint.
    pub inspector_port: u16,
}

impl NetworkConfig {
    /// Full upstream origin including scheme, when an upstream is set.
    pub fn upstream_url(&self) -> Option<String> {
        self.upstream
            .as_ref()
            .map(|host| format!("{}://{}", self.protocol.scheme(), host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url_includes_scheme() {
        let net = NetworkConfig {
            port: 8787,
            host: "127.0.0.1".to_string(),
            protocol: Protocol::Https,
            upstream: Some("example.com".to_string()),
            inspector_port: 9229,
        };
        assert_eq!(net.upstream_url().as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_protocol_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Protocol::Http).unwrap(), "\"http\"");
    }
}
