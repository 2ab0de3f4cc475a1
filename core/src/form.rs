//! multipart/form-data encoding.
//!
//! Each encode call draws a fresh UUID-derived boundary. Files are read when
//! the form is encoded, not when it is assembled, so a missing file surfaces
//! as a body error on the request that uses it. File contents are copied as
//! raw bytes.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::BodyError;

/// A single form field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File(PathBuf),
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<PathBuf> for FormValue {
    fn from(path: PathBuf) -> Self {
        FormValue::File(path)
    }
}

impl From<&Path> for FormValue {
    fn from(path: &Path) -> Self {
        FormValue::File(path.to_path_buf())
    }
}

/// Field name to value mapping. Part order follows the map's iteration
/// order and is not stable across runs.
pub type FormData = HashMap<String, FormValue>;

/// An encoded multipart payload and the boundary it was built with.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub boundary: String,
    pub bytes: Bytes,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

pub fn new_boundary() -> String {
    format!("Boundary-{}", Uuid::new_v4())
}

/// Encode `form` with a freshly generated boundary.
pub fn encode(form: &FormData) -> Result<MultipartBody, BodyError> {
    encode_with_boundary(form, new_boundary())
}

pub(crate) fn encode_with_boundary(
    form: &FormData,
    boundary: String,
) -> Result<MultipartBody, BodyError> {
    let mut out = BytesMut::new();
    for (name, value) in form {
        out.put_slice(format!("--{boundary}\r\n").as_bytes());
        match value {
            FormValue::Text(text) => {
                out.put_slice(
                    format!(
                        "Content-Disposition:form-data; name=\"{}\"\r\n\r\n",
                        escape_quoted(name)
                    )
                    .as_bytes(),
                );
                out.put_slice(text.as_bytes());
            }
            FormValue::File(path) => {
                let contents = std::fs::read(path).map_err(|source| BodyError::FileRead {
                    path: path.clone(),
                    source,
                })?;
                out.put_slice(
                    format!(
                        "Content-Disposition:form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        escape_quoted(name),
                        escape_quoted(&file_name(path))
                    )
                    .as_bytes(),
                );
                out.put_slice(format!("Content-Type: {}\r\n\r\n", mime_type(path)).as_bytes());
                out.put_slice(&contents);
            }
        }
        out.put_slice(b"\r\n");
    }
    out.put_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok(MultipartBody {
        boundary,
        bytes: out.freeze(),
    })
}

/// Percent-escape the characters that would end a quoted header value or
/// the header line itself.
fn escape_quoted(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\r', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Last path component, or the whole path when it has none.
fn file_name(path: &Path) -> String {
    match path.file_name().map(|n| n.to_string_lossy()) {
        Some(name) if !name.is_empty() => name.into_owned(),
        _ => path.to_string_lossy().into_owned(),
    }
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("txt") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
