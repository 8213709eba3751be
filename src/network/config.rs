use std::collections::HashMap;
use url::Url;

/// Process-wide networking configuration, passed explicitly.
///
/// Set once at startup and handed to request descriptors at construction
/// time; nothing in the core reads global mutable state. The host is required
/// up front so a configured descriptor can never observe a missing domain.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    host: Url,
    headers: HashMap<String, String>,
}

impl NetworkConfig {
    pub fn new(host: Url) -> Self {
        NetworkConfig {
            host,
            headers: HashMap::new(),
        }
    }

    /// Default headers attached to every request built from this
    /// configuration (e.g. auth tokens, client version).
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn host(&self) -> &Url {
        &self.host
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}
