use async_trait::async_trait;
use preview_proto::{QueryRequest, QueryResponse, ReviveRequest, ReviveResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{PreviewTransport, TransportError};

pub const QUERY_PATH: &str = "/api/query";
pub const REVIVE_PATH: &str = "/api/revive";

/// reqwest-backed transport speaking JSON to the buffer server.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// View URL bound to a buffer identity, used by the page after revival.
    pub fn view_url(&self, buffer_id: &preview_proto::BufferId) -> String {
        format!("{}/view/{}", self.base_url, buffer_id)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let res = self.http.post(url).json(body).send().await?;

        if res.status().is_success() {
            Ok(res.json::<T>().await?)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(TransportError::UnexpectedStatus { status, body })
        }
    }
}

#[async_trait]
impl PreviewTransport for HttpTransport {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError> {
        self.post_json(QUERY_PATH, request).await
    }

    async fn revive(&self, request: &ReviveRequest) -> Result<ReviveResponse, TransportError> {
        self.post_json(REVIVE_PATH, request).await
    }
}
