//! The send primitive and its default implementation.
//!
//! # Design
//! Everything above this module talks to a `Transport`: one buffered `send`
//! and one streaming `download`. Swapping the transport (a scripted one in
//! tests, a platform client elsewhere) leaves request building, conversion
//! and error mapping untouched.
//!
//! `UreqTransport` runs ureq's blocking client on tokio's blocking pool,
//! borrowing the shared background runtime when the caller is not inside
//! tokio. Each
//! request gets its own agent carrying the descriptor's timeout, and status
//! codes are returned as data so the pipeline decides what counts as failure.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{TransportError, TransportFailure};
use crate::http::{Headers, HttpResponse, Method, RequestDescriptor};
use crate::request::runtime_handle;

/// Receives `(bytes_written_so_far, expected_total)` after every write.
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Outcome of a download that reached the server.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    pub status: u16,
    pub headers: Headers,
    pub bytes_written: u64,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and buffer the whole response body.
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportFailure>;

    /// Send `request` and stream the response body into `destination`.
    async fn download(
        &self,
        request: &RequestDescriptor,
        destination: &Path,
        progress: ProgressFn,
    ) -> Result<DownloadResponse, TransportFailure>;
}

const CHUNK_SIZE: usize = 8 * 1024;

/// Blocking ureq client driven from tokio's blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportFailure> {
        let request = request.clone();
        blocking(move || execute(&request)).await
    }

    async fn download(
        &self,
        request: &RequestDescriptor,
        destination: &Path,
        progress: ProgressFn,
    ) -> Result<DownloadResponse, TransportFailure> {
        let request = request.clone();
        let destination = destination.to_path_buf();
        let abandoned = Arc::new(AtomicBool::new(false));
        let _guard = AbandonOnDrop(abandoned.clone());
        blocking(move || execute_download(&request, destination, progress, &abandoned)).await
    }
}

/// Run `work` on a blocking pool. Outside tokio the shared background
/// runtime supplies the pool, so any executor can await the result.
async fn blocking<T, F>(work: F) -> Result<T, TransportFailure>
where
    F: FnOnce() -> Result<T, TransportFailure> + Send + 'static,
    T: Send + 'static,
{
    let handle = runtime_handle(None).map_err(TransportFailure::before_response)?;
    handle
        .spawn_blocking(work)
        .await
        .map_err(|e| TransportFailure::before_response(TransportError::Other(e.to_string())))?
}

/// Raises the flag when the awaiting future goes away, telling the blocking
/// writer to stop.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn agent(request: &RequestDescriptor) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(request.timeout))
        .build()
        .new_agent()
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &Headers) -> ureq::RequestBuilder<B> {
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

/// Issue the request and return the raw ureq response.
fn call(request: &RequestDescriptor) -> Result<ureq::http::Response<ureq::Body>, TransportFailure> {
    let agent = agent(request);
    let url = request.url.as_str();
    let body = request.body.as_ref();

    tracing::debug!(method = %request.method, url, "dispatching request");

    let result = match request.method {
        Method::Get => without_body(with_headers(agent.get(url), &request.headers), body),
        Method::Delete => without_body(with_headers(agent.delete(url), &request.headers), body),
        Method::Head => without_body(with_headers(agent.head(url), &request.headers), body),
        Method::Post => with_body(with_headers(agent.post(url), &request.headers), body),
        Method::Put => with_body(with_headers(agent.put(url), &request.headers), body),
        Method::Patch => with_body(with_headers(agent.patch(url), &request.headers), body),
    };
    result.map_err(|e| TransportFailure::before_response(map_ureq_error(e)))
}

fn without_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithoutBody>,
    body: Option<&Bytes>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.force_send_body().send(bytes.as_ref()),
        None => builder.call(),
    }
}

fn with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&Bytes>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes.as_ref()),
        None => builder.send_empty(),
    }
}

fn response_headers(response: &ureq::http::Response<ureq::Body>) -> Headers {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn execute(request: &RequestDescriptor) -> Result<HttpResponse, TransportFailure> {
    let response = call(request)?;
    let status = response.status().as_u16();
    let headers = response_headers(&response);

    let mut buf = Vec::new();
    let mut reader = response.into_body().into_reader();
    if let Err(e) = reader.read_to_end(&mut buf) {
        return Err(TransportFailure {
            error: map_io_error(e),
            status: Some(status),
            partial: (!buf.is_empty()).then(|| Bytes::from(buf)),
        });
    }

    tracing::trace!(status, len = buf.len(), "response received");
    Ok(HttpResponse {
        status,
        headers,
        body: Bytes::from(buf),
    })
}

fn execute_download(
    request: &RequestDescriptor,
    destination: PathBuf,
    progress: ProgressFn,
    abandoned: &AtomicBool,
) -> Result<DownloadResponse, TransportFailure> {
    let response = call(request)?;
    let status = response.status().as_u16();
    let headers = response_headers(&response);
    let total = headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok());

    let fail = |error: io::Error| TransportFailure {
        error: map_io_error(error),
        status: Some(status),
        partial: None,
    };

    let mut file = File::create(&destination).map_err(fail)?;
    let mut reader = response.into_body().into_reader();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        // Checked after the file exists so an abandoned download never
        // leaves it behind.
        if abandoned.load(Ordering::Relaxed) {
            drop(file);
            let _ = std::fs::remove_file(&destination);
            tracing::debug!(path = %destination.display(), written, "download abandoned");
            return Err(TransportFailure {
                error: TransportError::Other("download abandoned".to_string()),
                status: Some(status),
                partial: None,
            });
        }
        let n = reader.read(&mut chunk).map_err(fail)?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n]).map_err(fail)?;
        written += n as u64;
        progress(written, total);
    }
    file.flush().map_err(fail)?;

    tracing::trace!(status, written, path = %destination.display(), "download finished");
    Ok(DownloadResponse {
        status,
        headers,
        bytes_written: written,
    })
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) => map_io_error(e),
        e @ (ureq::Error::HostNotFound | ureq::Error::ConnectionFailed) => {
            TransportError::Connect(e.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}

fn map_io_error(err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::TimedOut {
        TransportError::Timeout
    } else {
        TransportError::Io(err)
    }
}
