//! the network edge of a stream session.

use std::io::Read;

use crate::config::ChatClientConfig;
use crate::error::TransportError;
use crate::types::ChatRequestBody;

/// status plus a blocking reader over the (possibly streamed) body.
pub struct TransportResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self { status, body: Box::new(body) }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// opens a completion request. runs on a blocking worker thread, never on
/// the thread that owns the conversation store.
pub trait ChatTransport: Send + Sync + 'static {
    fn open(&self, request: &ChatRequestBody) -> Result<TransportResponse, TransportError>;
}

impl<F> ChatTransport for F
where
    F: Fn(&ChatRequestBody) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
{
    fn open(&self, request: &ChatRequestBody) -> Result<TransportResponse, TransportError> {
        self(request)
    }
}

/// ureq agent shared by the transport and the collaborator api. status codes
/// are returned, not raised, so error bodies can be inspected.
pub(crate) fn build_agent(config: &ChatClientConfig) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_connect(config.connect_timeout())
        .build();
    ureq::Agent::new_with_config(config)
}

/// `POST {base_url}{completions_path}` with a json body, sse response.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    url: String,
}

impl UreqTransport {
    pub fn new(config: &ChatClientConfig) -> Self {
        Self {
            agent: build_agent(config),
            url: config.completions_url(),
        }
    }
}

impl ChatTransport for UreqTransport {
    fn open(&self, request: &ChatRequestBody) -> Result<TransportResponse, TransportError> {
        let response = self
            .agent
            .post(&self.url)
            .header("accept", "text/event-stream")
            .send_json(request)?;
        let status = response.status().as_u16();
        Ok(TransportResponse::new(status, response.into_body().into_reader()))
    }
}
