//! The detached shadow dispatch.
//!
//! A shadow unit owns its request copy and talks back only through the
//! session cache. Whatever happens inside it, including a panic, ends at the
//! task boundary and never reaches the client-facing request.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::http::request::DuplicatedRequest;
use crate::net::dispatch::{dispatch, DispatchError, Target};
use crate::observability::metrics;
use crate::session::cookie::find_response_cookie;
use crate::session::SessionCache;

/// Everything a shadow unit needs, detached from the request that spawned it.
#[derive(Debug, Clone)]
pub(crate) struct ShadowContext {
    pub target: Target,
    pub sessions: SessionCache,
    pub cookie_name: String,
    pub debug: bool,
    pub in_flight: Arc<AtomicUsize>,
}

/// How a shadow dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShadowOutcome {
    /// The cache now maps `primary` to `shadow`.
    Correlated { primary: String, shadow: String },
    /// The primary response carried no session cookie.
    NoReferenceCookie,
    /// The shadow response carried no session cookie.
    NoShadowCookie,
}

impl ShadowOutcome {
    fn label(&self) -> &'static str {
        match self {
            ShadowOutcome::Correlated { .. } => "correlated",
            ShadowOutcome::NoReferenceCookie | ShadowOutcome::NoShadowCookie => "discarded",
        }
    }
}

/// Decrements the in-flight count when the unit ends, however it ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Start a shadow unit. Returns immediately; the unit is never awaited.
///
/// `reference_token` is the session token the primary backend just issued,
/// if any.
pub(crate) fn spawn(ctx: ShadowContext, request: DuplicatedRequest, reference_token: Option<String>) {
    let unit_ctx = ctx.clone();
    spawn_contained(ctx, async move { run(&unit_ctx, request, reference_token).await });
}

/// Run `unit` on its own task, counted as in flight until it ends.
///
/// Errors and panics stop at this boundary: they are recorded, logged when
/// debug is on, and go no further.
fn spawn_contained<F>(ctx: ShadowContext, unit: F) -> JoinHandle<()>
where
    F: Future<Output = Result<ShadowOutcome, DispatchError>> + Send + 'static,
{
    let guard = InFlightGuard::enter(&ctx.in_flight);
    tokio::spawn(async move {
        let _guard = guard;
        let result = AssertUnwindSafe(unit).catch_unwind().await;

        match result {
            Ok(Ok(outcome)) => {
                metrics::record_shadow(outcome.label());
                tracing::debug!(target_address = %ctx.target.address, ?outcome, "Shadow dispatch finished");
            }
            Ok(Err(e)) => {
                metrics::record_shadow(e.kind());
                if ctx.debug {
                    tracing::warn!(target_address = %e.target(), kind = e.kind(), error = %e, "Shadow dispatch failed");
                }
            }
            Err(panic) => {
                metrics::record_shadow("panic");
                if ctx.debug {
                    tracing::warn!(
                        target_address = %ctx.target.address,
                        panic = %panic_message(panic.as_ref()),
                        "Recovered from panic in shadow dispatch"
                    );
                }
            }
        }
    })
}

/// Dispatch to the shadow target and record any new session correlation.
pub(crate) async fn run(
    ctx: &ShadowContext,
    request: DuplicatedRequest,
    reference_token: Option<String>,
) -> Result<ShadowOutcome, DispatchError> {
    let response = dispatch(&ctx.target, request).await?;

    let Some(primary) = reference_token else {
        return Ok(ShadowOutcome::NoReferenceCookie);
    };
    let Some(cookie) = find_response_cookie(&response.headers, &ctx.cookie_name) else {
        return Ok(ShadowOutcome::NoShadowCookie);
    };

    let shadow = cookie.value().to_owned();
    ctx.sessions.insert(primary.clone(), shadow.clone());
    tracing::debug!(primary = %primary, shadow = %shadow, "Session correlation stored");
    Ok(ShadowOutcome::Correlated { primary, shadow })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    fn context(target: Target, sessions: SessionCache) -> ShadowContext {
        ShadowContext {
            target,
            sessions,
            cookie_name: "PHPSESSID".into(),
            debug: true,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn request() -> DuplicatedRequest {
        DuplicatedRequest {
            method: hyper::Method::GET,
            uri: "/".parse().unwrap(),
            version: hyper::Version::HTTP_11,
            headers: Default::default(),
            host: None,
            content_length: None,
            body: bytes::Bytes::new(),
        }
    }

    /// Answers every connection with `response` once the request head is in.
    async fn backend(response: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn panicking_unit_is_contained() {
        let ctx = context(
            Target::new("127.0.0.1:1", Duration::from_millis(100)),
            SessionCache::new(Duration::from_secs(60)),
        );
        let in_flight = Arc::clone(&ctx.in_flight);

        let explode = true;
        let handle = spawn_contained(ctx.clone(), async move {
            if explode {
                panic!("shadow exploded");
            }
            Ok(ShadowOutcome::NoReferenceCookie)
        });
        assert!(handle.await.is_ok(), "panic must not escape the shadow task");
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);

        // The runtime keeps serving units after the panic.
        let handle = spawn_contained(ctx, async { Ok(ShadowOutcome::NoShadowCookie) });
        assert!(handle.await.is_ok());
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn correlation_survives_unbounded_ttl() {
        let addr = backend("HTTP/1.1 200 OK\r\nSet-Cookie: PHPSESSID=qqq\r\nContent-Length: 0\r\n\r\n").await;
        let ctx = context(
            Target::new(addr.to_string(), Duration::from_secs(1)),
            SessionCache::new(Duration::from_secs(u64::MAX)),
        );

        let outcome = run(&ctx, request(), Some("xyz".into())).await.unwrap();
        assert_eq!(
            outcome,
            ShadowOutcome::Correlated {
                primary: "xyz".into(),
                shadow: "qqq".into()
            }
        );
        assert_eq!(ctx.sessions.get("xyz").as_deref(), Some("qqq"));
    }

    #[tokio::test]
    async fn unreachable_shadow_leaves_cache_untouched() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ctx = context(
            Target::new(addr.to_string(), Duration::from_millis(500)),
            SessionCache::new(Duration::from_secs(60)),
        );

        let err = run(&ctx, request(), Some("xyz".into())).await.unwrap_err();
        assert_eq!(err.kind(), "connect");
        assert!(ctx.sessions.is_empty());
    }
}
