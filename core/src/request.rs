//! A built request and the three ways of consuming its response.
//!
//! # Design
//! Every adapter funnels into `Request::execute`: surface a stored
//! construction error, otherwise send through the transport, reject non-2xx
//! statuses and run the converter. The callback, stream and await forms only
//! differ in how that one future is driven and how its result is handed
//! back, so the same input yields the same value or error in all three.

use std::io;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::{Handle, Runtime};

use crate::builder::ConstructionError;
use crate::convert::{
    Converter, DataConverter, DecodableConverter, FnConverter, JsonConverter, StringConverter,
};
use crate::delivery::CompletionQueue;
use crate::error::{BoxError, NetworkError, TransportError};
use crate::http::RequestDescriptor;
use crate::transport::Transport;

/// Called with the error when a callback-style request fails.
pub type FailureHandler = Box<dyn FnOnce(NetworkError) + Send + 'static>;

/// Single-value stream: yields one `Ok` or one `Err`, then ends.
pub type ResponseStream<T> = BoxStream<'static, Result<T, NetworkError>>;

/// Either a ready descriptor or the reason it could not be built, bound to
/// the transport and completion queue of the client that made it.
pub struct Request {
    pub(crate) state: Result<RequestDescriptor, ConstructionError>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) queue: Arc<dyn CompletionQueue>,
    pub(crate) runtime: Option<Handle>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Request {
    /// The built descriptor, or the construction error that replaced it.
    pub fn descriptor(&self) -> Result<&RequestDescriptor, &ConstructionError> {
        self.state.as_ref()
    }

    /// Deliver callback completions on `queue` instead of the client default.
    pub fn deliver_on(mut self, queue: impl CompletionQueue + 'static) -> Self {
        self.queue = Arc::new(queue);
        self
    }

    async fn execute<C: Converter>(self, converter: C) -> Result<C::Output, NetworkError> {
        let descriptor = self.state?;
        perform(self.transport.as_ref(), &descriptor, &converter).await
    }

    // ---------------------------------------------------------------------
    // Callback style
    // ---------------------------------------------------------------------

    /// Convert the response with `converter` and report through callbacks.
    ///
    /// Returns immediately. A construction error is submitted to the
    /// completion queue before this returns and no I/O happens. Without an
    /// `on_failure` handler, failures are dropped.
    pub fn response<C, S>(self, converter: C, on_success: S, on_failure: Option<FailureHandler>)
    where
        C: Converter,
        S: FnOnce(C::Output) + Send + 'static,
    {
        let Request {
            state,
            transport,
            queue,
            runtime,
        } = self;
        let deliver = move |result: Result<C::Output, NetworkError>| {
            queue.submit(Box::new(move || match result {
                Ok(value) => on_success(value),
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
                    deliver(perform(transport.as_ref(), &descriptor, &converter).await);
                });
            }
            Err(e) => deliver(Err(NetworkError::Unknown(Some(Box::new(e))))),
        }
    }

    pub fn response_data<S>(self, on_success: S, on_failure: Option<FailureHandler>)
    where
        S: FnOnce(Bytes) + Send + 'static,
    {
        self.response(DataConverter, on_success, on_failure)
    }

    pub fn response_string<S>(self, on_success: S, on_failure: Option<FailureHandler>)
    where
        S: FnOnce(String) + Send + 'static,
    {
        self.response(StringConverter, on_success, on_failure)
    }

    pub fn response_json<S>(self, on_success: S, on_failure: Option<FailureHandler>)
    where
        S: FnOnce(Value) + Send + 'static,
    {
        self.response(JsonConverter, on_success, on_failure)
    }

    pub fn response_decodable<T, S>(self, on_success: S, on_failure: Option<FailureHandler>)
    where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(T) + Send + 'static,
    {
        self.response(DecodableConverter::<T>::new(), on_success, on_failure)
    }

    /// Callback form with a caller-supplied conversion. See `FnConverter`.
    pub fn response_with<F, T, S>(self, convert: F, on_success: S, on_failure: Option<FailureHandler>)
    where
        F: Fn(Bytes) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + 'static,
        S: FnOnce(T) + Send + 'static,
    {
        self.response(FnConverter::new(convert), on_success, on_failure)
    }

    // ---------------------------------------------------------------------
    // Stream style
    // ---------------------------------------------------------------------

    /// A cold stream: nothing is sent until it is first polled, and dropping
    /// it abandons the request.
    pub fn stream<C: Converter>(self, converter: C) -> ResponseStream<C::Output> {
        stream::once(self.execute(converter)).boxed()
    }

    pub fn data_stream(self) -> ResponseStream<Bytes> {
        self.stream(DataConverter)
    }

    pub fn string_stream(self) -> ResponseStream<String> {
        self.stream(StringConverter)
    }

    pub fn json_stream(self) -> ResponseStream<Value> {
        self.stream(JsonConverter)
    }

    pub fn decodable_stream<T: DeserializeOwned + Send + 'static>(self) -> ResponseStream<T> {
        self.stream(DecodableConverter::<T>::new())
    }

    // ---------------------------------------------------------------------
    // Await style
    // ---------------------------------------------------------------------

    pub async fn data(self) -> Result<Bytes, NetworkError> {
        self.execute(DataConverter).await
    }

    pub async fn string(self) -> Result<String, NetworkError> {
        self.execute(StringConverter).await
    }

    pub async fn json(self) -> Result<Value, NetworkError> {
        self.execute(JsonConverter).await
    }

    pub async fn decodable<T: DeserializeOwned + Send + 'static>(self) -> Result<T, NetworkError> {
        self.execute(DecodableConverter::<T>::new()).await
    }

    pub async fn convert_with<F, T>(self, convert: F) -> Result<T, NetworkError>
    where
        F: Fn(Bytes) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.execute(FnConverter::new(convert)).await
    }
}

/// Send, validate the status and convert the body.
pub(crate) async fn perform<C: Converter>(
    transport: &dyn Transport,
    request: &RequestDescriptor,
    converter: &C,
) -> Result<C::Output, NetworkError> {
    let response = transport.send(request).await?;
    tracing::trace!(status = response.status, url = %request.url, "response status");
    if !response.is_success() {
        return Err(NetworkError::ResponseFailure {
            cause: TransportError::Status(response.status),
            status: Some(response.status),
            data: Some(response.body),
        });
    }
    converter.convert(response.body)
}

/// The configured handle, else the ambient tokio runtime, else a shared
/// background runtime.
pub(crate) fn runtime_handle(configured: Option<Handle>) -> io::Result<Handle> {
    if let Some(handle) = configured {
        return Ok(handle);
    }
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    background_runtime()
}

static BACKGROUND: OnceLock<Runtime> = OnceLock::new();

/// Runtime used by callback requests issued outside any tokio context.
fn background_runtime() -> io::Result<Handle> {
    if let Some(runtime) = BACKGROUND.get() {
        return Ok(runtime.handle().clone());
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("courier-io")
        .build()?;
    // Losing the race drops our runtime; the winner's is used instead.
    let _ = BACKGROUND.set(runtime);
    BACKGROUND
        .get()
        .map(|runtime| runtime.handle().clone())
        .ok_or_else(|| io::Error::other("background runtime unavailable"))
}
