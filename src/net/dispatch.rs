//! Single-shot request dispatch to one backend.
//!
//! # Responsibilities
//! - Open a fresh TCP connection per request, bounded by the target's timeout
//! - Write one HTTP/1.1 request and read the complete response
//! - Tear the connection down on return, success or failure
//!
//! # Design Decisions
//! - No pooling: primary and shadow traffic never share connection state
//! - Only connection establishment has a deadline; a backend that accepts
//!   and then stalls holds the caller for as long as it stalls

use std::io;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::BackendConfig;
use crate::http::request::DuplicatedRequest;
use crate::http::response::BackendResponse;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A backend address plus its connect timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub timeout: Duration,
}

impl Target {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

impl From<&BackendConfig> for Target {
    fn from(config: &BackendConfig) -> Self {
        Self::new(config.address.clone(), config.timeout())
    }
}

/// Failure of one dispatch, scoped to the target that caused it.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to send to {target}: {source}")]
    Send {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to receive from {target}: {source}")]
    Receive {
        target: String,
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Connect { .. } => "connect",
            DispatchError::Send { .. } => "send",
            DispatchError::Receive { .. } => "receive",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            DispatchError::Connect { target, .. }
            | DispatchError::Send { target, .. }
            | DispatchError::Receive { target, .. } => target,
        }
    }
}

/// Owns the task driving an outbound connection and aborts it when dropped,
/// which closes the socket.
struct ConnectionDriver(JoinHandle<()>);

impl Drop for ConnectionDriver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Send `request` to `target` over a new connection and read the full response.
pub async fn dispatch(
    target: &Target,
    request: DuplicatedRequest,
) -> Result<BackendResponse, DispatchError> {
    let connect_error = |source: io::Error| DispatchError::Connect {
        target: target.address.clone(),
        source,
    };
    let send_error = |source: BoxError| DispatchError::Send {
        target: target.address.clone(),
        source,
    };
    let receive_error = |source: BoxError| DispatchError::Receive {
        target: target.address.clone(),
        source,
    };

    let stream = match time::timeout(target.timeout, TcpStream::connect(&target.address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(connect_error(e)),
        Err(_) => {
            return Err(connect_error(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", target.timeout),
            )))
        }
    };
    let _ = stream.set_nodelay(true);

    let outbound = request.into_outbound().map_err(|e| send_error(e.into()))?;

    let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| send_error(e.into()))?;

    let address = target.address.clone();
    let _driver = ConnectionDriver(tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::trace!(target_address = %address, error = %e, "Outbound connection ended with error");
        }
    }));

    // hyper reports write and read failures through the same future; parse
    // and truncation errors can only come from the response side.
    let response = sender.send_request(outbound).await.map_err(|e| {
        if e.is_parse() || e.is_incomplete_message() || e.is_timeout() {
            receive_error(e.into())
        } else {
            send_error(e.into())
        }
    })?;

    let (parts, body) = response.into_parts();
    let body: Bytes = body
        .collect()
        .await
        .map_err(|e| receive_error(e.into()))?
        .to_bytes();

    Ok(BackendResponse {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
        body,
    })
}
