//! Convenience layer over an HTTP transport.
//!
//! # Overview
//! A `Client` turns a URL, query parameters, headers and a logical body
//! (JSON, raw bytes, multipart form, GraphQL) into a `Request`. The request
//! is then consumed in one of three styles: callbacks, a single-value
//! stream, or `.await`. Files can be downloaded to a temporary location with
//! fractional progress. A small string-backed `Cache` sits beside the
//! pipeline.
//!
//! # Design
//! - Construction never panics or does I/O: a `Request` holds either a
//!   `RequestDescriptor` or the `ConstructionError` that replaced it.
//! - All three response styles share one send-validate-convert path, so a
//!   given response maps to the same value or `NetworkError` in each.
//! - The network sits behind the `Transport` trait; `UreqTransport` is the
//!   default and tests substitute scripted transports.
//! - Configuration belongs to a client instance and is read as a snapshot.

pub mod body;
pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod download;
pub mod error;
pub mod form;
pub mod http;
pub mod request;
pub mod transport;

pub use body::{EncodedBody, RequestBody};
pub use builder::{build_request, ConstructionError, RequestOptions};
pub use cache::{Cache, FileStore, KeyValueStore, MemoryStore};
pub use client::{Client, ClientBuilder};
pub use config::Config;
pub use convert::Converter;
pub use delivery::{CompletionQueue, Inline, MainLoop, MainQueue};
pub use download::ProgressHandler;
pub use error::{BodyError, BoxError, CacheError, NetworkError, TransportError, TransportFailure};
pub use form::{FormData, FormValue};
pub use http::{Headers, HttpResponse, Method, RequestDescriptor};
pub use request::{FailureHandler, Request, ResponseStream};
pub use transport::{DownloadResponse, ProgressFn, Transport, UreqTransport};
