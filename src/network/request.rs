use crate::errors::{Error, ErrorKind, RequestError, Result};
use crate::network::config::NetworkConfig;
use crate::network::constants::{ACCEPT_HEADER, CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE};
use std::collections::HashMap;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Options,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Trace,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Trace => reqwest::Method::TRACE,
            HttpMethod::Connect => reqwest::Method::CONNECT,
        }
    }
}

/// Transport-agnostic request built from a [`RequestConvertible`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            entry.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }
}

/// Capability any request-like value must implement to be consumed by network
/// operations.
///
/// A descriptor either yields an absolute URL directly or a domain plus a
/// relative `uri`, combined by the provided [`absolute_url`]
/// (RequestConvertible::absolute_url).
pub trait RequestConvertible: Send + Sync {
    /// Relative path (plus query) under [`domain`](RequestConvertible::domain).
    fn uri(&self) -> String;

    fn method(&self) -> HttpMethod;

    fn domain(&self) -> Result<Url>;

    /// Credential headers attached to every request.
    fn credentials(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Additional headers; `None` attaches nothing beyond credentials and the
    /// JSON defaults.
    fn headers(&self) -> Option<HashMap<String, String>> {
        None
    }

    /// Encodes the request body, if any.
    fn encode(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn absolute_url(&self) -> Result<Url> {
        let domain = self.domain()?;
        let uri = self.uri();
        domain
            .join(&uri)
            .map_err(|_| RequestError::InvalidAbsoluteUrl(format!("{domain}{uri}")).into())
    }

    /// Builds the transport request: credentials, additional headers, JSON
    /// defaults (only when no content type was set), then the body.
    fn to_http_request(&self) -> Result<HttpRequest> {
        let mut request = HttpRequest {
            url: self.absolute_url()?,
            method: self.method(),
            headers: Vec::new(),
            body: None,
        };

        for (name, value) in self.credentials() {
            request.set_header(&name, &value);
        }
        if let Some(headers) = self.headers() {
            for (name, value) in headers {
                request.set_header(&name, &value);
            }
        }

        if request.header(CONTENT_TYPE_HEADER).is_none() {
            request.set_header(CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE);
            request.set_header(ACCEPT_HEADER, JSON_CONTENT_TYPE);
        }

        request.body = self.encode()?;
        Ok(request)
    }
}

/// Basic JSON API descriptor carrying an explicit [`NetworkConfig`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    config: NetworkConfig,
    uri: String,
    method: HttpMethod,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(config: NetworkConfig, method: HttpMethod, uri: impl Into<String>) -> Self {
        ApiRequest {
            config,
            uri: uri.into(),
            method,
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl RequestConvertible for ApiRequest {
    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn method(&self) -> HttpMethod {
        self.method
    }

    fn domain(&self) -> Result<Url> {
        Ok(self.config.host().clone())
    }

    fn headers(&self) -> Option<HashMap<String, String>> {
        if self.config.headers().is_empty() {
            None
        } else {
            Some(self.config.headers().clone())
        }
    }

    fn encode(&self) -> Result<Option<Vec<u8>>> {
        match &self.body {
            Some(body) => serde_json::to_vec(body)
                .map(Some)
                .map_err(|e| Error::new(ErrorKind::Request, Some(e))),
            None => Ok(None),
        }
    }
}
