use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use preview_proto::{QueryRequest, QueryResponse, ReviveRequest, ReviveResponse};

use super::{PreviewTransport, TransportError};

/// Scripted transport for tests: responses are consumed front to back, and
/// every request the session issues is recorded for assertions.
#[derive(Default)]
pub struct MockTransport {
    queries: Mutex<VecDeque<Result<QueryResponse, TransportError>>>,
    revives: Mutex<VecDeque<Result<ReviveResponse, TransportError>>>,
    seen_queries: Mutex<Vec<QueryRequest>>,
    seen_revives: Mutex<Vec<ReviveRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_query(&self, response: Result<QueryResponse, TransportError>) {
        self.queries.lock().unwrap().push_back(response);
    }

    pub fn push_revive(&self, response: Result<ReviveResponse, TransportError>) {
        self.revives.lock().unwrap().push_back(response);
    }

    pub fn queries_seen(&self) -> Vec<QueryRequest> {
        self.seen_queries.lock().unwrap().clone()
    }

    pub fn revives_seen(&self) -> Vec<ReviveRequest> {
        self.seen_revives.lock().unwrap().clone()
    }
}

#[async_trait]
impl PreviewTransport for MockTransport {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError> {
        self.seen_queries.lock().unwrap().push(request.clone());
        self.queries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unavailable("query script exhausted".into())))
    }

    async fn revive(&self, request: &ReviveRequest) -> Result<ReviveResponse, TransportError> {
        self.seen_revives.lock().unwrap().push(request.clone());
        self.revives
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unavailable("revive script exhausted".into())))
    }
}
