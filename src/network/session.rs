use crate::errors::{Error, ErrorKind, Result};
use crate::network::request::HttpRequest;
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Raw transport response before the operation applies status validation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Transport session issuing data requests.
///
/// May be shared across many network operations; each operation owns only its
/// in-flight call. A non-2xx status is not a transport error; the operation
/// decides what is acceptable.
#[async_trait]
pub trait Session: Send + Sync {
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse>;
}

/// Completion events of a background upload, delivered by the session's own
/// task instead of a direct completion closure.
#[derive(Debug)]
pub enum UploadEvent {
    /// First response bytes arrived.
    Received(Vec<u8>),
    /// The upload task completed, possibly with a transport error.
    Completed(Option<Error>),
    /// All deferred background work for the session has settled.
    Drained,
}

/// Background-capable transport session for multipart uploads.
///
/// Uploads are identified by session so a host can hand deferred completion
/// back to the right consumer; the body is read from disk, never from memory.
#[async_trait]
pub trait UploadSession: Send + Sync {
    /// Session identifier; `None` means the session cannot run background
    /// uploads.
    fn identifier(&self) -> Option<String>;

    /// Starts an upload reading the encoded body from `body_file` and returns
    /// the event stream for its completion.
    async fn upload(
        &self,
        request: HttpRequest,
        body_file: PathBuf,
    ) -> Result<mpsc::Receiver<UploadEvent>>;
}

/// [`Session`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpSession {
    client: reqwest::Client,
}

impl HttpSession {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create http client");
        HttpSession { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpSession { client }
    }
}

impl Default for HttpSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::new(ErrorKind::Network, Some(e)))?;

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::new(ErrorKind::Network, Some(e)))?
            .to_vec();

        debug!("session performed {} -> {}", request.url, status_code);
        Ok(TransportResponse {
            status_code,
            headers,
            body,
        })
    }
}

/// [`UploadSession`] backed by a `reqwest` client and an explicit identifier.
///
/// Emits `Received`, `Completed`, then `Drained` from a spawned task, matching
/// the delegate-callback order of a background transport.
#[derive(Clone)]
pub struct BackgroundHttpSession {
    client: reqwest::Client,
    identifier: String,
}

impl BackgroundHttpSession {
    pub fn new() -> Self {
        Self::with_identifier(Uuid::new_v4().to_string())
    }

    pub fn with_identifier(identifier: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create http client");
        BackgroundHttpSession { client, identifier }
    }

    async fn perform_upload(
        client: reqwest::Client,
        request: HttpRequest,
        body_file: PathBuf,
    ) -> Result<Vec<u8>> {
        // Background uploads read the encoded body from disk.
        let body = tokio::fs::read(&body_file).await?;

        let mut builder = client.request(request.method.into(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| Error::new(ErrorKind::Network, Some(e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::new(ErrorKind::Network, Some(e)))?;
        Ok(bytes.to_vec())
    }
}

impl Default for BackgroundHttpSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadSession for BackgroundHttpSession {
    fn identifier(&self) -> Option<String> {
        Some(self.identifier.clone())
    }

    async fn upload(
        &self,
        request: HttpRequest,
        body_file: PathBuf,
    ) -> Result<mpsc::Receiver<UploadEvent>> {
        let (tx, rx) = mpsc::channel(8);
        let client = self.client.clone();
        let identifier = self.identifier.clone();

        tokio::spawn(async move {
            match Self::perform_upload(client, request, body_file).await {
                Ok(bytes) => {
                    let _ = tx.send(UploadEvent::Received(bytes)).await;
                    let _ = tx.send(UploadEvent::Completed(None)).await;
                }
                Err(e) => {
                    let _ = tx.send(UploadEvent::Completed(Some(e))).await;
                }
            }
            debug!("upload session {} drained", identifier);
            let _ = tx.send(UploadEvent::Drained).await;
        });

        Ok(rx)
    }
}
