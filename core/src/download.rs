//! Downloads streamed to a temporary file, with fractional progress.
//!
//! Progress is `written / expected_total`. When the server gives no length
//! (or a zero length) there is nothing meaningful to report and progress
//! callbacks are skipped. The temporary file is handed to the caller only on
//! success; on failure, or when the download is abandoned, it is removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::delivery::CompletionQueue;
use crate::error::{NetworkError, TransportError};
use crate::http::RequestDescriptor;
use crate::request::{runtime_handle, FailureHandler, Request};
use crate::transport::{ProgressFn, Transport};

/// Receives the completed fraction of a download.
pub type ProgressHandler = Arc<dyn Fn(f64) + Send + Sync + 'static>;

/// Fraction done, or `None` when the total is unknown.
pub fn fraction(written: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some(written as f64 / total as f64),
        _ => None,
    }
}

/// A fresh, not-yet-existing path in the system temp directory.
pub fn temp_location() -> PathBuf {
    std::env::temp_dir().join(format!("courier-{}.download", Uuid::new_v4()))
}

impl Request {
    /// Download to a temporary file and report through callbacks.
    ///
    /// Progress and completion both go through the request's completion
    /// queue. Either handler may be omitted.
    pub fn response_file<S>(
        self,
        on_progress: Option<ProgressHandler>,
        on_success: S,
        on_failure: Option<FailureHandler>,
    ) where
        S: FnOnce(PathBuf) + Send + 'static,
    {
        let Request {
            state,
            transport,
            queue,
            runtime,
        } = self;
        let completion_queue = queue.clone();
        let deliver = move |result: Result<PathBuf, NetworkError>| {
            completion_queue.submit(Box::new(move || match result {
                Ok(path) => on_success(path),
                Err(err) => {
                    if let Some(on_failure) = on_failure {
                        on_failure(err);
                    }
                }
            }));
        };

        let descriptor = match state {
            Ok(descriptor) => descriptor,
            Err(construction) => return deliver(Err(construction.into())),
        };

        match runtime_handle(runtime) {
            Ok(handle) => {
                handle.spawn(async move {
                    let result =
                        download(transport.as_ref(), &descriptor, on_progress, queue).await;
                    deliver(result);
                });
            }
            Err(e) => deliver(Err(NetworkError::Unknown(Some(Box::new(e))))),
        }
    }

    /// Await form of `response_file`. Progress still goes through the
    /// request's completion queue. Dropping the future abandons the download
    /// and removes the temporary file.
    pub async fn file(self, on_progress: Option<ProgressHandler>) -> Result<PathBuf, NetworkError> {
        let descriptor = self.state?;
        download(self.transport.as_ref(), &descriptor, on_progress, self.queue).await
    }
}

pub(crate) async fn download(
    transport: &dyn Transport,
    request: &RequestDescriptor,
    on_progress: Option<ProgressHandler>,
    queue: Arc<dyn CompletionQueue>,
) -> Result<PathBuf, NetworkError> {
    let pending = PendingFile::new(temp_location());
    let report: ProgressFn = Arc::new(move |written: u64, total: Option<u64>| {
        let (Some(handler), Some(done)) = (on_progress.as_ref(), fraction(written, total)) else {
            return;
        };
        tracing::trace!(written, ?total, "download progress");
        let handler = handler.clone();
        queue.submit(Box::new(move || handler(done)));
    });

    match transport.download(request, &pending.path, report).await {
        Ok(response) if (200..300).contains(&response.status) => {
            let path = pending.keep();
            tracing::debug!(path = %path.display(), bytes = response.bytes_written, "download complete");
            Ok(path)
        }
        Ok(response) => Err(NetworkError::ResponseFailure {
            cause: TransportError::Status(response.status),
            status: Some(response.status),
            data: None,
        }),
        Err(failure) => Err(failure.into()),
    }
}

/// A download target that is removed unless kept. Covers failures and a
/// dropped future alike.
struct PendingFile {
    path: PathBuf,
    kept: bool,
}

impl PendingFile {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn keep(mut self) -> PathBuf {
        self.kept = true;
        self.path.clone()
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.kept {
            discard(&self.path);
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::trace!(path = %path.display(), error = %e, "no partial download to remove");
    }
}
