use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error detail type shared across the crate.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Operation,
    Request,
    Network,
    Multipart,
    Decode,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Operation => write!(f, "operation"),
            ErrorKind::Request => write!(f, "request"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Multipart => write!(f, "multipart"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Io => write!(f, "io"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
    pub message: Option<String>,
}

/// Crate-wide error value.
///
/// The inner payload is reference-counted so results can be copied along an
/// operation chain: a predecessor's failure output becomes the successor's
/// input without re-wrapping.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Arc::new(ErrorInner {
                kind,
                source: source.map(|e| Arc::from(e.into())),
                message: None,
            }),
        }
    }

    pub fn with_message<E>(kind: ErrorKind, message: String, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Arc::new(ErrorInner {
                kind,
                source: source.map(|e| Arc::from(e.into())),
                message: Some(message),
            }),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn is_operation(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Operation)
    }

    pub fn is_request(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Request)
    }

    pub fn is_network(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Network)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Multipart)
    }

    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Decode)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.get_ref::<OperationError>(), Some(OperationError::Cancelled))
    }

    pub fn is_empty_input(&self) -> bool {
        matches!(self.get_ref::<OperationError>(), Some(OperationError::EmptyInput))
    }

    pub fn is_empty_output(&self) -> bool {
        matches!(self.get_ref::<OperationError>(), Some(OperationError::EmptyOutput))
    }

    /// Downcasts the underlying source to a concrete error type.
    pub fn get_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner
            .source
            .as_ref()
            .and_then(|s| (&**s as &(dyn StdError + 'static)).downcast_ref::<E>())
    }

    // Sentinel and terminal constructors used by the operation state machine.
    pub fn empty_input() -> Error {
        OperationError::EmptyInput.into()
    }

    pub fn empty_output() -> Error {
        OperationError::EmptyOutput.into()
    }

    pub fn cancelled() -> Error {
        OperationError::Cancelled.into()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("opflow::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl From<OperationError> for Error {
    fn from(err: OperationError) -> Self {
        Error::new(ErrorKind::Operation, Some(err))
    }
}

impl From<RequestError> for Error {
    fn from(err: RequestError) -> Self {
        Error::new(ErrorKind::Request, Some(err))
    }
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        Error::new(ErrorKind::Network, Some(err))
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        Error::new(ErrorKind::Multipart, Some(err))
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::new(ErrorKind::Decode, Some(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, Some(err))
    }
}

/// Lifecycle errors of the core unit of work.
///
/// `EmptyInput`/`EmptyOutput` are the default sentinels an operation holds
/// until something real is written; reading them back means the operation was
/// inspected before it ran. `Cancelled` is produced only by `cancel()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("empty input")]
    EmptyInput,
    #[error("empty output")]
    EmptyOutput,
    #[error("cancelled")]
    Cancelled,
}

/// Request descriptor construction failures.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("invalid absolute url: {0}")]
    InvalidAbsoluteUrl(String),
    #[error("invalid domain url")]
    InvalidDomainUrl,
}

/// Transport-level failures surfaced by network operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("unacceptable status code: {0}")]
    UnacceptableStatusCode(u16),
    #[error("invalid response")]
    InvalidResponse(#[source] BoxError),
}

/// Body segment of a multipart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartSegment {
    Boundary,
    ContentType,
    ContentDisposition,
}

impl fmt::Display for MultipartSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultipartSegment::Boundary => write!(f, "boundary"),
            MultipartSegment::ContentType => write!(f, "content type"),
            MultipartSegment::ContentDisposition => write!(f, "content disposition"),
        }
    }
}

/// Multipart upload misconfiguration and body encoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("no session identifier")]
    NoSessionIdentifier,
    #[error("multipart data nil")]
    MultipartDataNil,
    #[error("multipart body encoding failed: {0} segment")]
    Encoding(MultipartSegment),
}

/// Decode failures, including key-path narrowing.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty data")]
    EmptyData,
    #[error("json decode failed")]
    Json(#[source] serde_json::Error),
}
