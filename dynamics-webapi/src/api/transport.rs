//! HTTP transport
//!
//! The core composes everything up to a [`TransportRequest`] and parses
//! everything after a [`TransportResponse`]. [`ReqwestTransport`] is the
//! default implementation; tests plug in their own.

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Method;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use super::config::ProxyConfig;
use super::error::{Result, WebApiError};
use super::headers::Headers;

/// Cancellation handle shared between the caller and an in-flight request
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once `abort` has been called
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// One finished HTTP request, ready to send
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request; non-2xx statuses are returned, not raised
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Run `transport.execute` unless the signal fires first
pub async fn execute_with_abort(
    transport: &dyn Transport,
    request: TransportRequest,
    signal: Option<&AbortSignal>,
) -> Result<TransportResponse> {
    let Some(signal) = signal else {
        return transport.execute(request).await;
    };

    if signal.is_aborted() {
        return Err(WebApiError::Aborted);
    }

    tokio::select! {
        response = transport.execute(request) => response,
        _ = signal.aborted() => {
            debug!("Request aborted while in flight");
            Err(WebApiError::Aborted)
        }
    }
}

/// reqwest-backed transport with a shared keep-alive connection pool
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().tcp_keepalive(Duration::from_secs(60));

        if let Some(proxy) = proxy {
            let mut reqwest_proxy = reqwest::Proxy::all(&proxy.url)
                .map_err(|e| WebApiError::invalid_request("ReqwestTransport::new", format!("invalid proxy url: {}", e)))?;
            if let Some(username) = &proxy.username {
                reqwest_proxy =
                    reqwest_proxy.basic_auth(username, proxy.password.as_deref().unwrap_or_default());
            }
            builder = builder.proxy(reqwest_proxy);
        }

        let client = builder
            .build()
            .map_err(|e| WebApiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        trace!("{} {}", request.method, request.uri);

        let mut builder = self.client.request(request.method.clone(), &request.uri);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(e, request.timeout))?;

        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?
            .to_vec();

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Option<Duration>) -> WebApiError {
    if err.is_timeout() {
        WebApiError::Timeout(timeout.unwrap_or_default())
    } else {
        WebApiError::Network(err.to_string())
    }
}
