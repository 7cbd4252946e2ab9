//! Backend responses and their relay to the client.
//!
//! # Design Decisions
//! - A backend response is fully buffered before anything is relayed
//! - Status and every header (including repeated `Set-Cookie`) are copied
//!   verbatim; nothing is added or stripped

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode, Version};

/// A complete response read from one backend.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    /// Turn the backend response into the response written to the client.
    pub fn into_client_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
