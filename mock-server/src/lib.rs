use std::collections::{BTreeMap, HashMap};

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{header, HeaderMap, Method, StatusCode},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub query: BTreeMap<String, String>,
    /// Lower-cased names; repeated headers are joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct GraphQlEnvelope {
    pub query: String,
    pub variables: Value,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/bytes/{size}", get(bytes))
        .route("/graphql", post(graphql))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        seen.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    Json(Echo {
        method: method.to_string(),
        query: query.into_iter().collect(),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    let reason = status
        .canonical_reason()
        .unwrap_or("unknown")
        .to_ascii_lowercase();
    (status, Json(serde_json::json!({ "error": reason })))
}

async fn bytes(Path(size): Path<usize>) -> ([(header::HeaderName, &'static str); 1], Vec<u8>) {
    let body = (0..size).map(|i| b'a' + (i % 26) as u8).collect();
    ([(header::CONTENT_TYPE, "application/octet-stream")], body)
}

/// Answers with the parsed variables. `variables` must arrive as a string.
async fn graphql(Json(envelope): Json<GraphQlEnvelope>) -> Result<Json<Value>, StatusCode> {
    let Value::String(raw) = envelope.variables else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let variables: Value = serde_json::from_str(&raw).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(serde_json::json!({
        "data": { "query": envelope.query, "variables": variables }
    })))
}
