use crate::errors::{MultipartError, MultipartSegment, Result};
use crate::network::constants::{self, CONTENT_TYPE_HEADER};
use crate::network::request::RequestConvertible;
use crate::network::session::{UploadEvent, UploadSession};
use crate::operation::{Operation, Work};
use async_trait::async_trait;
use log::{debug, warn};
use metrics::counter;
use std::sync::Arc;
use uuid::Uuid;

/// Out-of-band file payload of a multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartData {
    /// Raw file bytes.
    pub file: Vec<u8>,
    /// Form field name (e.g. `image`).
    pub name: String,
    /// File name reported to the server.
    pub filename: String,
    /// MIME type of the file (e.g. `image/jpeg`).
    pub mime_type: String,
}

/// Assembles the RFC 7578 body:
///
/// ```text
/// --{boundary}\r\n
/// Content-Disposition: form-data; name="{name}"; filename="{filename}"\r\n
/// Content-Type: {mimeType}\r\n\r\n
/// {file bytes}
/// \r\n--{boundary}--\r\n
/// ```
pub fn http_body(boundary: &str, data: &MultipartData) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(data.file.len() + 256);
    body.extend_from_slice(&body_prefix(boundary, data)?);
    body.extend_from_slice(&data.file);
    body.extend_from_slice(&body_postfix(boundary)?);
    Ok(body)
}

fn body_prefix(boundary: &str, data: &MultipartData) -> Result<Vec<u8>> {
    let mut prefix = Vec::new();

    let boundary_line = constants::multipart::boundary_header_delimiter(boundary);
    prefix.extend_from_slice(&encoded(
        boundary_line,
        &[boundary],
        MultipartSegment::Boundary,
    )?);

    let content_disposition =
        constants::multipart::content_disposition(&data.name, &data.filename);
    prefix.extend_from_slice(&encoded(
        content_disposition,
        &[&data.name, &data.filename],
        MultipartSegment::ContentDisposition,
    )?);

    let content_type = constants::multipart::mime_content_type(&data.mime_type);
    prefix.extend_from_slice(&encoded(
        content_type,
        &[&data.mime_type],
        MultipartSegment::ContentType,
    )?);

    Ok(prefix)
}

fn body_postfix(boundary: &str) -> Result<Vec<u8>> {
    let postfix = constants::multipart::boundary_footer_delimiter(boundary);
    encoded(postfix, &[boundary], MultipartSegment::Boundary)
}

/// Encodes one template line, rejecting parameters that would corrupt the
/// framing (embedded CR/LF, quotes, or an empty boundary token).
fn encoded(line: String, params: &[&str], segment: MultipartSegment) -> Result<Vec<u8>> {
    let corrupt = params.iter().any(|p| {
        p.is_empty() || p.contains('\r') || p.contains('\n') || p.contains('"')
    });
    if corrupt {
        return Err(MultipartError::Encoding(segment).into());
    }
    Ok(line.into_bytes())
}

/// Terminal operation uploading a single file as `multipart/form-data`.
///
/// The payload does not flow through `input`; it is supplied at construction.
/// The assembled body is written to a temporary file before the upload task
/// starts: background-capable uploads must read from disk, not memory.
pub struct MultipartNetworkOperation {
    session: Arc<dyn UploadSession>,
    data: Option<MultipartData>,
    background_completion: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl MultipartNetworkOperation {
    pub fn new(session: Arc<dyn UploadSession>, data: Option<MultipartData>) -> Self {
        MultipartNetworkOperation {
            session,
            data,
            background_completion: None,
        }
    }

    /// Callback fired when the session reports its deferred background work
    /// has fully settled, used to signal the host environment.
    pub fn with_background_completion<F>(mut self, completion: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.background_completion = Some(Arc::new(completion));
        self
    }

    /// Builds an operation seeded with the given descriptor as its input.
    pub fn operation<R>(
        self,
        request: R,
    ) -> Operation<R, Vec<u8>>
    where
        R: RequestConvertible + Clone + 'static,
    {
        let op = Operation::new(self);
        op.set_input(Ok(request));
        op
    }
}

#[async_trait]
impl<R> Work<R, Vec<u8>> for MultipartNetworkOperation
where
    R: RequestConvertible + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "MultipartNetworkOperation"
    }

    async fn main(&self, op: &Operation<R, Vec<u8>>) {
        let request = match op.input() {
            Ok(request) => request,
            Err(e) => {
                op.set_output(Err(e));
                op.finish();
                return;
            }
        };

        // Background uploads are identified by session.
        let identifier = match self.session.identifier() {
            Some(identifier) => identifier,
            None => {
                op.set_output(Err(MultipartError::NoSessionIdentifier.into()));
                op.finish();
                return;
            }
        };

        let data = match &self.data {
            Some(data) => data,
            None => {
                op.set_output(Err(MultipartError::MultipartDataNil.into()));
                op.finish();
                return;
            }
        };

        let mut http = match request.to_http_request() {
            Ok(http) => http,
            Err(e) => {
                op.set_output(Err(e));
                op.finish();
                return;
            }
        };

        // Boundary per request; any collision-resistant token works.
        let boundary = Uuid::new_v4().to_string();
        let body = match http_body(&boundary, data) {
            Ok(body) => body,
            Err(e) => {
                op.set_output(Err(e));
                op.finish();
                return;
            }
        };

        let body_file = std::env::temp_dir().join(&identifier);
        if let Err(e) = tokio::fs::write(&body_file, &body).await {
            op.set_output(Err(e.into()));
            op.finish();
            return;
        }

        http.set_header(
            CONTENT_TYPE_HEADER,
            &constants::multipart::content_type(&boundary),
        );

        let mut events = match self.session.upload(http, body_file).await {
            Ok(events) => events,
            Err(e) => {
                op.set_output(Err(e));
                op.finish();
                return;
            }
        };
        counter!("opflow_multipart_uploads_total").increment(1);

        // First received chunk completes the operation; later events are only
        // consumed so the drained signal still reaches the host.
        let mut finished = false;
        loop {
            tokio::select! {
                _ = op.cancellation(), if !finished => {
                    debug!("multipart operation cancelled in flight");
                    op.finish();
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(UploadEvent::Received(bytes)) => {
                            if !finished {
                                op.set_output(Ok(bytes));
                                op.finish();
                                finished = true;
                            }
                        }
                        Some(UploadEvent::Completed(error)) => {
                            if !finished {
                                if let Some(e) = error {
                                    warn!("multipart upload failed: {e}");
                                    op.set_output(Err(e));
                                }
                                op.finish();
                                finished = true;
                            }
                        }
                        Some(UploadEvent::Drained) => {
                            if let Some(completion) = &self.background_completion {
                                completion();
                            }
                        }
                        None => {
                            if !finished {
                                op.finish();
                            }
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Error, ErrorKind, RequestError};
    use crate::network::config::NetworkConfig;
    use crate::network::request::{ApiRequest, HttpMethod, HttpRequest};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use url::Url;

    fn request() -> ApiRequest {
        let config = NetworkConfig::new(Url::parse("https://api.example.com").unwrap());
        ApiRequest::new(config, HttpMethod::Post, "/v1/upload")
    }

    fn image_data() -> MultipartData {
        MultipartData {
            file: b"\xff\xd8\xff\xe0raw jpeg bytes".to_vec(),
            name: "image".to_string(),
            filename: "image.jpeg".to_string(),
            mime_type: "image/jpeg".to_string(),
        }
    }

    // Scripted upload session: replays a fixed event sequence and records the
    // request and body file it was given.
    struct MockUploadSession {
        identifier: Option<String>,
        events: Mutex<Vec<UploadEvent>>,
        seen: Mutex<Option<(HttpRequest, PathBuf)>>,
    }

    impl MockUploadSession {
        fn new(identifier: Option<&str>, events: Vec<UploadEvent>) -> Self {
            MockUploadSession {
                identifier: identifier.map(String::from),
                events: Mutex::new(events),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl UploadSession for MockUploadSession {
        fn identifier(&self) -> Option<String> {
            self.identifier.clone()
        }

        async fn upload(
            &self,
            request: HttpRequest,
            body_file: PathBuf,
        ) -> crate::errors::Result<mpsc::Receiver<UploadEvent>> {
            *self.seen.lock().unwrap() = Some((request, body_file));
            let (tx, rx) = mpsc::channel(8);
            let events: Vec<UploadEvent> = self.events.lock().unwrap().drain(..).collect();
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(event).await;
                }
            });
            Ok(rx)
        }
    }

    #[test]
    fn body_round_trip_matches_template_verbatim() {
        let data = image_data();
        let boundary = "6781880645075605171";
        let body = http_body(boundary, &data).unwrap();

        let prefix = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"image.jpeg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n"
        );
        let postfix = format!("\r\n--{boundary}--\r\n");

        assert!(body.starts_with(prefix.as_bytes()));
        assert!(body.ends_with(postfix.as_bytes()));

        // The file bytes between prefix and postfix are recovered exactly.
        let recovered = &body[prefix.len()..body.len() - postfix.len()];
        assert_eq!(recovered, data.file.as_slice());
    }

    #[test]
    fn corrupting_disposition_parameter_fails_with_segment_error() {
        let mut data = image_data();
        data.filename = "evil\r\n.jpeg".to_string();
        let err = http_body("b", &data).unwrap_err();
        assert!(matches!(
            err.get_ref::<MultipartError>(),
            Some(MultipartError::Encoding(MultipartSegment::ContentDisposition))
        ));
    }

    #[test]
    fn corrupting_mime_type_fails_with_content_type_segment() {
        let mut data = image_data();
        data.mime_type = "image/jpeg\r\nX-Smuggled: yes".to_string();
        let err = http_body("b", &data).unwrap_err();
        assert!(matches!(
            err.get_ref::<MultipartError>(),
            Some(MultipartError::Encoding(MultipartSegment::ContentType))
        ));
    }

    #[test]
    fn empty_boundary_fails_with_boundary_segment() {
        let err = http_body("", &image_data()).unwrap_err();
        assert!(matches!(
            err.get_ref::<MultipartError>(),
            Some(MultipartError::Encoding(MultipartSegment::Boundary))
        ));
    }

    #[tokio::test]
    async fn upload_success_delivers_first_received_chunk() {
        let session = Arc::new(MockUploadSession::new(
            Some("session-1"),
            vec![
                UploadEvent::Received(b"ack".to_vec()),
                UploadEvent::Completed(None),
                UploadEvent::Drained,
            ],
        ));
        let op = MultipartNetworkOperation::new(session.clone(), Some(image_data()))
            .operation(request());

        op.start().await;

        assert!(op.is_finished());
        assert_eq!(op.output().unwrap(), b"ack".to_vec());

        // The body was written to disk under the session identifier and the
        // request carries the boundary-bearing content type.
        let (http, body_file) = session.seen.lock().unwrap().clone().unwrap();
        assert_eq!(body_file, std::env::temp_dir().join("session-1"));
        let content_type = http.header(CONTENT_TYPE_HEADER).unwrap().to_string();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string();

        let written = std::fs::read(&body_file).unwrap();
        assert!(written.starts_with(format!("--{boundary}\r\n").as_bytes()));
        assert!(written.ends_with(format!("\r\n--{boundary}--\r\n").as_bytes()));
        let _ = std::fs::remove_file(&body_file);
    }

    #[tokio::test]
    async fn completed_error_becomes_failure_output() {
        let session = Arc::new(MockUploadSession::new(
            Some("session-2"),
            vec![
                UploadEvent::Completed(Some(Error::with_message(
                    ErrorKind::Network,
                    "upload interrupted".to_string(),
                    None::<crate::errors::BoxError>,
                ))),
                UploadEvent::Drained,
            ],
        ));
        let op = MultipartNetworkOperation::new(session, Some(image_data()))
            .operation(request());

        op.start().await;

        assert!(op.is_finished());
        assert!(op.output().unwrap_err().is_network());
    }

    #[tokio::test]
    async fn drained_event_signals_background_completion() {
        let session = Arc::new(MockUploadSession::new(
            Some("session-3"),
            vec![
                UploadEvent::Received(b"ok".to_vec()),
                UploadEvent::Completed(None),
                UploadEvent::Drained,
            ],
        ));
        let drained = Arc::new(AtomicUsize::new(0));
        let probe = drained.clone();
        let op = MultipartNetworkOperation::new(session, Some(image_data()))
            .with_background_completion(move || {
                probe.fetch_add(1, Ordering::SeqCst);
            })
            .operation(request());

        op.start().await;

        // The drained signal arrives after the operation already finished.
        assert!(op.is_finished());
        assert_eq!(drained.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_session_identifier_fails() {
        let session = Arc::new(MockUploadSession::new(None, Vec::new()));
        let op = MultipartNetworkOperation::new(session, Some(image_data()))
            .operation(request());

        op.start().await;

        let err = op.output().unwrap_err();
        assert!(matches!(
            err.get_ref::<MultipartError>(),
            Some(MultipartError::NoSessionIdentifier)
        ));
    }

    #[tokio::test]
    async fn missing_payload_fails_with_multipart_data_nil() {
        let session = Arc::new(MockUploadSession::new(Some("session-4"), Vec::new()));
        let op: Operation<ApiRequest, Vec<u8>> =
            MultipartNetworkOperation::new(session, None).operation(request());

        op.start().await;

        let err = op.output().unwrap_err();
        assert!(matches!(
            err.get_ref::<MultipartError>(),
            Some(MultipartError::MultipartDataNil)
        ));
    }

    #[tokio::test]
    async fn descriptor_failure_propagates_before_upload_starts() {
        #[derive(Clone)]
        struct NoDomain;
        impl RequestConvertible for NoDomain {
            fn uri(&self) -> String {
                "/up".to_string()
            }
            fn method(&self) -> HttpMethod {
                HttpMethod::Post
            }
            fn domain(&self) -> crate::errors::Result<Url> {
                Err(RequestError::InvalidDomainUrl.into())
            }
        }

        let session = Arc::new(MockUploadSession::new(Some("session-5"), Vec::new()));
        let op = MultipartNetworkOperation::new(session.clone(), Some(image_data()))
            .operation(NoDomain);

        op.start().await;

        assert!(op.output().unwrap_err().is_request());
        assert!(session.seen.lock().unwrap().is_none());
    }
}
