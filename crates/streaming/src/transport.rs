//! Network transport for map queries.
//!
//! The session manager only depends on [`QueryTransport`]; retries, proxies
//! and timeouts are the transport's business. Dropping a returned future must
//! abort the underlying request.

use std::future::Future;
use std::pin::Pin;

use scene::display::DisplaySet;

use crate::protocol::{MAP_QUERY_PATH, MapQuery, ProtocolError, decode_response};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The server answered with a non-success status.
    Status { status: u16, body: String },
    /// The request never produced a response.
    Network(String),
    /// The response body could not be decoded.
    Decode(ProtocolError),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Status { status, body } => write!(f, "server returned {status}: {body}"),
            TransportError::Network(msg) => write!(f, "network error: {msg}"),
            TransportError::Decode(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// Executes one map query and returns the decoded result set.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait QueryTransport: Send + Sync {
    fn fetch(&self, query: MapQuery) -> BoxFuture<'_, Result<DisplaySet, TransportError>>;
}

/// HTTP transport against the listing service.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// `base_url` is the service root, e.g. `http://127.0.0.1:9200`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{MAP_QUERY_PATH}", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl QueryTransport for HttpTransport {
    fn fetch(&self, query: MapQuery) -> BoxFuture<'_, Result<DisplaySet, TransportError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(&self.endpoint)
                .query(&query.to_query_pairs())
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            decode_response(query.mode, &body).map_err(TransportError::Decode)
        })
    }
}
