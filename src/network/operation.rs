use crate::errors::NetworkError;
use crate::network::constants::VALID_STATUS_CODES;
use crate::network::request::RequestConvertible;
use crate::network::session::Session;
use crate::operation::{Operation, Work};
use async_trait::async_trait;
use log::debug;
use metrics::counter;
use std::sync::Arc;

/// Terminal operation turning a request descriptor into raw response bytes.
///
/// Status codes outside `[200, 300)` fail with `UnacceptableStatusCode`;
/// transport failures fail with `InvalidResponse`. The transport session may
/// be shared; cancellation mid-flight abandons this operation's own call.
pub struct NetworkOperation {
    session: Arc<dyn Session>,
}

impl NetworkOperation {
    pub fn new(session: Arc<dyn Session>) -> Self {
        NetworkOperation { session }
    }

    /// Builds an operation seeded with the given descriptor as its input.
    pub fn operation<R>(session: Arc<dyn Session>, request: R) -> Operation<R, Vec<u8>>
    where
        R: RequestConvertible + Clone + 'static,
    {
        let op = Operation::new(NetworkOperation::new(session));
        op.set_input(Ok(request));
        op
    }
}

#[async_trait]
impl<R> Work<R, Vec<u8>> for NetworkOperation
where
    R: RequestConvertible + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "NetworkOperation"
    }

    async fn main(&self, op: &Operation<R, Vec<u8>>) {
        let request = match op.input() {
            Ok(request) => request,
            Err(e) => {
                // A failed predecessor's output flows through untouched.
                op.set_output(Err(e));
                op.finish();
                return;
            }
        };

        let http = match request.to_http_request() {
            Ok(http) => http,
            Err(e) => {
                op.set_output(Err(e));
                op.finish();
                return;
            }
        };

        counter!("opflow_network_requests_total").increment(1);

        tokio::select! {
            _ = op.cancellation() => {
                // cancel() already computed the output; resolve the transient
                // cancelled state to finished.
                debug!("network operation cancelled in flight");
                op.finish();
            }
            result = self.session.perform(http) => {
                match result {
                    Ok(response) => {
                        if !VALID_STATUS_CODES.contains(&response.status_code) {
                            counter!("opflow_network_failures_total", "reason" => "status").increment(1);
                            op.set_output(Err(
                                NetworkError::UnacceptableStatusCode(response.status_code).into(),
                            ));
                        } else {
                            op.set_output(Ok(response.body));
                        }
                    }
                    Err(e) => {
                        counter!("opflow_network_failures_total", "reason" => "transport").increment(1);
                        op.set_output(Err(NetworkError::InvalidResponse(Box::new(e)).into()));
                    }
                }
                op.finish();
            }
        }
    }
}
