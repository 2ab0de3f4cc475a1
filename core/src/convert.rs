//! Byte-to-value converters shared by every dispatch style.
//!
//! The callback, stream and await adapters all run the same `Converter`
//! against the response body, so a given payload maps to the same value or
//! the same error whichever way the caller consumes it.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BoxError, NetworkError};

/// Turns a successful response body into a value.
pub trait Converter: Send + Sync + 'static {
    type Output: Send + 'static;

    fn convert(&self, body: Bytes) -> Result<Self::Output, NetworkError>;
}

/// Hands the body back untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataConverter;

impl Converter for DataConverter {
    type Output = Bytes;

    fn convert(&self, body: Bytes) -> Result<Bytes, NetworkError> {
        Ok(body)
    }
}

/// Decodes the body as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter for StringConverter {
    type Output = String;

    fn convert(&self, body: Bytes) -> Result<String, NetworkError> {
        String::from_utf8(body.to_vec()).map_err(|e| NetworkError::DecodeFailure(Box::new(e)))
    }
}

/// Parses the body as an untyped JSON value.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    type Output = Value;

    fn convert(&self, body: Bytes) -> Result<Value, NetworkError> {
        serde_json::from_slice(&body).map_err(NetworkError::InvalidJsonResponse)
    }
}

/// Deserializes the body into `T`.
pub struct DecodableConverter<T>(PhantomData<fn() -> T>);

impl<T> DecodableConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for DecodableConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> Converter for DecodableConverter<T> {
    type Output = T;

    fn convert(&self, body: Bytes) -> Result<T, NetworkError> {
        serde_json::from_slice(&body).map_err(|e| NetworkError::DecodeFailure(Box::new(e)))
    }
}

/// Wraps a caller-supplied conversion function.
///
/// A returned error that is already a `NetworkError` passes through as-is;
/// anything else becomes `NetworkError::Unknown` with the cause attached.
pub struct FnConverter<F, T> {
    f: F,
    _out: PhantomData<fn() -> T>,
}

impl<F, T> FnConverter<F, T>
where
    F: Fn(Bytes) -> Result<T, BoxError>,
{
    pub fn new(f: F) -> Self {
        Self { f, _out: PhantomData }
    }
}

impl<F, T> Converter for FnConverter<F, T>
where
    F: Fn(Bytes) -> Result<T, BoxError> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn convert(&self, body: Bytes) -> Result<T, NetworkError> {
        (self.f)(body).map_err(classify)
    }
}

fn classify(err: BoxError) -> NetworkError {
    match err.downcast::<NetworkError>() {
        Ok(network) => *network,
        Err(other) => NetworkError::Unknown(Some(other)),
    }
}
