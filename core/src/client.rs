//! The entry point: a configured client that builds `Request` values.
//!
//! # Design
//! `Client` holds its configuration, a transport, a completion queue and an
//! optional tokio handle. Building a request snapshots the configuration, so
//! concurrent `update_config` calls never tear a request in half. Clones
//! share all four.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::body::RequestBody;
use crate::builder::{build_request, RequestOptions};
use crate::config::{Config, SharedConfig};
use crate::delivery::{CompletionQueue, Inline, MainLoop, MainQueue};
use crate::form::FormData;
use crate::http::{Headers, Method};
use crate::request::Request;
use crate::transport::{Transport, UreqTransport};

#[derive(Clone)]
pub struct Client {
    config: SharedConfig,
    transport: Arc<dyn Transport>,
    queue: Arc<dyn CompletionQueue>,
    runtime: Option<Handle>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config.snapshot())
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client with `Config::from_env()`, the ureq transport and inline
    /// completion delivery.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Snapshot of the current defaults.
    pub fn config(&self) -> Config {
        self.config.snapshot()
    }

    /// Change the defaults for requests built from now on.
    pub fn update_config(&self, f: impl FnOnce(&mut Config)) {
        self.config.update(f);
    }

    /// Build a request. Construction errors are kept inside the returned
    /// `Request` and surface through whichever response style is used.
    pub fn request(&self, url: &str, options: RequestOptions) -> Request {
        let config = self.config.snapshot();
        let state = build_request(&config, url, &options);
        if let Err(err) = &state {
            tracing::debug!(url, error = ?err, "request construction failed");
        }
        Request {
            state,
            transport: self.transport.clone(),
            queue: self.queue.clone(),
            runtime: self.runtime.clone(),
        }
    }

    /// Build a multipart/form-data request. `form` replaces any body in
    /// `options`.
    pub fn form_data_request(&self, url: &str, form: FormData, options: RequestOptions) -> Request {
        self.request(url, options.body(RequestBody::Form(form)))
    }

    /// Build a GraphQL POST. `variables` travel as a JSON string.
    pub fn graphql_request(
        &self,
        url: &str,
        query: impl Into<String>,
        variables: Option<Map<String, Value>>,
        headers: Headers,
    ) -> Request {
        let options = RequestOptions {
            method: Method::Post,
            body: RequestBody::GraphQl {
                query: query.into(),
                variables,
            },
            headers,
            ..RequestOptions::default()
        };
        self.request(url, options)
    }
}

/// Builder for `Client`.
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<Config>,
    transport: Option<Arc<dyn Transport>>,
    queue: Option<Arc<dyn CompletionQueue>>,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Default queue for callback completions.
    pub fn completion_queue(mut self, queue: impl CompletionQueue + 'static) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    /// Make a `MainQueue` the default completion queue. Callbacks then run
    /// only when the returned `MainLoop` is drained.
    pub fn main_queue(mut self) -> (Self, MainLoop) {
        let (queue, main_loop) = MainQueue::new();
        self.queue = Some(Arc::new(queue));
        (self, main_loop)
    }

    /// Runtime that drives callback-style requests. Without one the ambient
    /// runtime is used, or a shared background runtime outside tokio.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Client {
        Client {
            config: SharedConfig::new(self.config.unwrap_or_else(Config::from_env)),
            transport: self.transport.unwrap_or_else(|| Arc::new(UreqTransport::new())),
            queue: self.queue.unwrap_or_else(|| Arc::new(Inline)),
            runtime: self.runtime,
        }
    }
}
