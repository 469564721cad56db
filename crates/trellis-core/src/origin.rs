//! Handshake origin access control.

/// Allow-list applied to the WebSocket handshake's `Origin` header.
///
/// An empty list, or a list containing `"*"`, accepts any origin.
/// Otherwise the origin's host must match an entry exactly; scheme and
/// port are ignored.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Policy that accepts every origin.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allow_all(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Check an `Origin` header value against the allow-list.
    pub fn allows(&self, origin: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        let host = host_of(origin);
        self.allowed.iter().any(|o| o == "*" || o == host)
    }
}

/// Extract the host portion of an origin value such as
/// `https://example.com:8443`.
fn host_of(origin: &str) -> &str {
    let rest = match origin.find("://") {
        Some(idx) => &origin[idx + 3..],
        None => origin,
    };
    let rest = rest.split('/').next().unwrap_or(rest);
    rest.split(':').next().unwrap_or(rest)
}
