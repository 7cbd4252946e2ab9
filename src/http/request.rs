//! Request duplication.
//!
//! # Responsibilities
//! - Drain the inbound body exactly once
//! - Produce two independently owned request copies (primary, shadow)
//! - Normalize both copies to HTTP/1.1 for the outbound connections
//!
//! # Design Decisions
//! - Both bodies are separate allocations, not views of one buffer
//! - Header maps are deep copies, so rewriting the shadow's cookies can never
//!   leak into the primary request
//! - A body that cannot be read fails the duplication as a whole

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderValue, HOST};
use hyper::{Method, Request, Uri, Version};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to turn an inbound request into two copies.
#[derive(Debug, Error)]
pub enum DuplicationError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(#[source] BoxError),
}

/// One self-contained copy of an inbound request.
#[derive(Debug, Clone)]
pub struct DuplicatedRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub host: Option<String>,
    pub content_length: Option<u64>,
    pub body: Bytes,
}

impl DuplicatedRequest {
    /// Build the outbound request written to a backend connection.
    ///
    /// The URI is reduced to origin form (`/path?query`); the backend is
    /// addressed by the connection, not by the request line.
    pub fn into_outbound(self) -> Result<Request<Full<Bytes>>, hyper::http::Error> {
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut builder = Request::builder()
            .method(self.method)
            .uri(path)
            .version(self.version);

        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
            if let Some(host) = &self.host {
                if let Ok(value) = HeaderValue::from_str(host) {
                    headers.insert(HOST, value);
                }
            }
        }

        builder.body(Full::new(self.body))
    }
}

/// Split `request` into a (primary, shadow) pair.
///
/// The body is read once, bounded by `max_body_bytes`, and copied into two
/// buffers. The original body is consumed either way.
pub async fn duplicate<B>(
    request: Request<B>,
    max_body_bytes: usize,
) -> Result<(DuplicatedRequest, DuplicatedRequest), DuplicationError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let (parts, body) = request.into_parts();

    let collected = Limited::new(body, max_body_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                DuplicationError::TooLarge {
                    limit: max_body_bytes,
                }
            } else {
                DuplicationError::Body(e)
            }
        })?
        .to_bytes();

    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));

    let content_length = parts
        .headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let copy = |body: Bytes| DuplicatedRequest {
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        version: Version::HTTP_11,
        headers: parts.headers.clone(),
        host: host.clone(),
        content_length,
        body,
    };

    let primary = copy(Bytes::copy_from_slice(&collected));
    let shadow = copy(Bytes::copy_from_slice(&collected));
    Ok((primary, shadow))
}
