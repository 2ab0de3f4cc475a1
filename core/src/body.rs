//! Request body descriptions and their encoding into bytes.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::BodyError;
use crate::form::{self, FormData};

/// Logical request body. Resolved to bytes when the request is built.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON object; `None` sends no body at all.
    Json(Option<Map<String, Value>>),
    Raw(Bytes),
    Form(FormData),
    GraphQl {
        query: String,
        variables: Option<Map<String, Value>>,
    },
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Json(None)
    }
}

/// Bytes ready to put on the wire, plus the content type they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

const JSON: &str = "application/json";

impl RequestBody {
    /// Serialize any `Serialize` value that maps to a JSON object.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, BodyError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(RequestBody::Json(Some(map))),
            other => Err(BodyError::Json(serde::ser::Error::custom(format!(
                "expected a JSON object, got {other}"
            )))),
        }
    }

    /// Resolve the body to bytes. `Ok(None)` means the request carries no body.
    pub fn encode(&self) -> Result<Option<EncodedBody>, BodyError> {
        match self {
            RequestBody::Json(None) => Ok(None),
            RequestBody::Json(Some(map)) => Ok(Some(EncodedBody {
                bytes: Bytes::from(serde_json::to_vec(map)?),
                content_type: Some(JSON.to_string()),
            })),
            RequestBody::Raw(bytes) => Ok(Some(EncodedBody {
                bytes: bytes.clone(),
                content_type: None,
            })),
            RequestBody::Form(data) => {
                let multipart = form::encode(data)?;
                Ok(Some(EncodedBody {
                    content_type: Some(multipart.content_type()),
                    bytes: multipart.bytes,
                }))
            }
            RequestBody::GraphQl { query, variables } => {
                let variables = Value::Object(variables.clone().unwrap_or_default());
                // Backends expect `variables` as a JSON string, not an object.
                let envelope = serde_json::json!({
                    "query": query,
                    "variables": serde_json::to_string(&variables)?,
                });
                Ok(Some(EncodedBody {
                    bytes: Bytes::from(serde_json::to_vec(&envelope)?),
                    content_type: Some(JSON.to_string()),
                }))
            }
        }
    }
}
