use async_trait::async_trait;
use loadcheck_http::{ErrorKind, HttpClient, HttpRequest, HttpResponse};

use crate::iteration::IterationContext;

/// A failed exchange: no response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<loadcheck_http::Error> for TransportError {
    fn from(err: loadcheck_http::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Sends one request and returns the complete response.
///
/// Implementations are shared by every virtual user and handle their own pooling.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        HttpClient::send(self, req).await.map_err(TransportError::from)
    }
}

/// The unit of work a virtual user repeats.
///
/// One instance is shared by all virtual users; per-iteration state lives in the
/// [`IterationContext`].
#[async_trait]
pub trait Scenario: Send + Sync {
    async fn run(&self, ctx: &IterationContext) -> anyhow::Result<()>;
}
