use async_trait::async_trait;
use preview_proto::{QueryRequest, QueryResponse, ReviveRequest, ReviveResponse};
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Transport onto the buffer server's two endpoints.
///
/// Timeout semantics live in the implementation: a request that never
/// resolves stalls the poll loop until the transport itself gives up, at
/// which point the failure surfaces here as an `Err`.
#[async_trait]
pub trait PreviewTransport: Send + Sync {
    /// Polls the query endpoint for content newer than the given marker.
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError>;

    /// Offers a revival token to the revival endpoint.
    async fn revive(&self, request: &ReviveRequest) -> Result<ReviveResponse, TransportError>;
}
