//! Drive the callback, stream and await styles against a scripted transport.
//!
//! # Design
//! `ScriptedTransport` answers every call from a fixed script and counts how
//! often it was reached, so tests can assert both the outcome each style
//! delivers and whether any I/O was attempted at all.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{
    BoxError, Client, Config, DownloadResponse, FailureHandler, FormData, FormValue, Headers,
    HttpResponse, MainQueue, NetworkError, ProgressFn, Request, RequestDescriptor,
    RequestOptions, Transport, TransportError, TransportFailure,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Clone)]
enum Script {
    Respond { status: u16, body: &'static [u8] },
    Refuse,
    Download {
        status: u16,
        total: Option<u64>,
        chunks: Vec<usize>,
    },
}

struct ScriptedTransport {
    script: Script,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: &RequestDescriptor) -> Result<HttpResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Respond { status, body } => Ok(HttpResponse {
                status: *status,
                headers: Headers::new(),
                body: Bytes::from_static(*body),
            }),
            Script::Refuse | Script::Download { .. } => Err(TransportFailure::before_response(
                TransportError::Connect("connection refused".into()),
            )),
        }
    }

    async fn download(
        &self,
        _request: &RequestDescriptor,
        destination: &Path,
        progress: ProgressFn,
    ) -> Result<DownloadResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Script::Download {
            status,
            total,
            chunks,
        } = &self.script
        else {
            return Err(TransportFailure::before_response(TransportError::Connect(
                "connection refused".into(),
            )));
        };
        let mut contents = Vec::new();
        let mut written = 0u64;
        for chunk in chunks {
            contents.extend(std::iter::repeat(b'x').take(*chunk));
            std::fs::write(destination, &contents).map_err(TransportFailure::before_response)?;
            written += *chunk as u64;
            progress(written, *total);
        }
        Ok(DownloadResponse {
            status: *status,
            headers: Headers::new(),
            bytes_written: written,
        })
    }
}

/// A client wired to `script`, plus the transport's call counter.
fn client(script: Script) -> (Client, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .config(Config::default())
        .transport(ScriptedTransport {
            script,
            calls: calls.clone(),
        })
        .build();
    (client, calls)
}

type Outcome<T> = Result<T, NetworkError>;

/// Success/failure callbacks that forward into a channel.
fn capture<T: Send + 'static>() -> (
    impl FnOnce(T) + Send + 'static,
    Option<FailureHandler>,
    UnboundedReceiver<Outcome<T>>,
) {
    let (tx, rx) = unbounded_channel();
    let fail_tx = tx.clone();
    let on_success = move |value: T| {
        let _ = tx.send(Ok(value));
    };
    let on_failure: FailureHandler = Box::new(move |err: NetworkError| {
        let _ = fail_tx.send(Err(err));
    });
    (on_success, Some(on_failure), rx)
}

/// Run one request in each style and return the three outcomes.
async fn json_in_all_styles(make: impl Fn() -> Request) -> [Outcome<Value>; 3] {
    let (on_success, on_failure, mut rx) = capture();
    make().response_json(on_success, on_failure);
    let callback = rx.recv().await.unwrap();

    let mut stream = make().json_stream();
    let streamed = stream.next().await.unwrap();
    assert!(stream.next().await.is_none(), "stream must end after one item");

    let awaited = make().json().await;
    [callback, streamed, awaited]
}

/// Tag, status and data of an error: enough to compare across styles.
fn describe(err: &NetworkError) -> (&'static str, Option<u16>, Option<Bytes>) {
    let tag = match err {
        NetworkError::InvalidUrl(_) => "invalid_url",
        NetworkError::InvalidBody(_) => "invalid_body",
        NetworkError::InvalidJsonResponse(_) => "invalid_json_response",
        NetworkError::DecodeFailure(_) => "decode_failure",
        NetworkError::ResponseFailure { .. } => "response_failure",
        NetworkError::Unknown(_) => "unknown",
    };
    (tag, err.status(), err.data().cloned())
}

fn assert_same_error<T: std::fmt::Debug>(outcomes: &[Outcome<T>; 3]) -> (&'static str, Option<u16>, Option<Bytes>) {
    let described: Vec<_> = outcomes
        .iter()
        .map(|o| describe(o.as_ref().expect_err("expected failure")))
        .collect();
    assert_eq!(described[0], described[1], "callback vs stream");
    assert_eq!(described[1], described[2], "stream vs await");
    described[0].clone()
}

// ---------------------------------------------------------------------------
// Construction errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_url_never_reaches_transport() {
    let (client, calls) = client(Script::Respond { status: 200, body: b"{}" });
    let make = || client.request("http://bad host/", RequestOptions::new());

    let outcomes = json_in_all_styles(make).await;
    let (tag, status, data) = assert_same_error(&outcomes);
    assert_eq!(tag, "invalid_url");
    assert!(status.is_none() && data.is_none());
    assert!(matches!(&outcomes[2], Err(NetworkError::InvalidUrl(raw)) if raw == "http://bad host/"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn construction_failure_callback_fires_before_returning() {
    let (client, _) = client(Script::Respond { status: 200, body: b"{}" });
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    client.request("not a url", RequestOptions::new()).response_data(
        |_| panic!("success must not fire"),
        Some(Box::new(move |err: NetworkError| {
            *slot.lock().unwrap() = Some(err.to_string())
        })),
    );
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("invalid URL: not a url")
    );
}

#[tokio::test]
async fn unreadable_form_file_is_invalid_body() {
    let (client, calls) = client(Script::Respond { status: 200, body: b"{}" });
    let make = || {
        let mut form = FormData::new();
        form.insert("f".into(), FormValue::File("/no/such/upload.bin".into()));
        client.form_data_request("http://localhost/upload", form, RequestOptions::new())
    };
    assert!(make().descriptor().unwrap_err().partial_request().is_some());

    let outcomes = json_in_all_styles(make).await;
    assert_eq!(assert_same_error(&outcomes).0, "invalid_body");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Transport and status failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_carries_status_and_raw_body() {
    let (client, _) = client(Script::Respond {
        status: 404,
        body: br#"{"error":"not found"}"#,
    });
    let (on_success, on_failure, mut rx) = capture::<Bytes>();
    client
        .request("http://localhost/missing", RequestOptions::new())
        .response_data(on_success, on_failure);

    match rx.recv().await.unwrap() {
        Err(NetworkError::ResponseFailure {
            cause: TransportError::Status(404),
            status: Some(404),
            data: Some(data),
        }) => assert_eq!(data.as_ref(), br#"{"error":"not found"}"#),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn transport_error_is_identical_across_styles() {
    let (client, calls) = client(Script::Refuse);
    let make = || client.request("http://localhost/x", RequestOptions::new());

    let outcomes = json_in_all_styles(make).await;
    assert_eq!(assert_same_error(&outcomes), ("response_failure", None, None));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(
        &outcomes[0],
        Err(NetworkError::ResponseFailure { cause: TransportError::Connect(_), .. })
    ));
}

#[tokio::test]
async fn server_error_is_identical_across_styles() {
    let (client, _) = client(Script::Respond { status: 500, body: b"boom" });
    let make = || client.request("http://localhost/x", RequestOptions::new());
    let outcomes = json_in_all_styles(make).await;
    assert_eq!(
        assert_same_error(&outcomes),
        ("response_failure", Some(500), Some(Bytes::from_static(b"boom")))
    );
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn json_success_is_identical_across_styles() {
    let (client, _) = client(Script::Respond {
        status: 200,
        body: br#"{"items":[1,2,3]}"#,
    });
    let make = || client.request("http://localhost/x", RequestOptions::new());
    for outcome in json_in_all_styles(make).await {
        assert_eq!(outcome.unwrap(), json!({"items": [1, 2, 3]}));
    }
}

#[tokio::test]
async fn invalid_json_is_identical_across_styles() {
    let (client, _) = client(Script::Respond { status: 200, body: b"<html>" });
    let make = || client.request("http://localhost/x", RequestOptions::new());
    let outcomes = json_in_all_styles(make).await;
    assert_eq!(assert_same_error(&outcomes).0, "invalid_json_response");
}

#[derive(Debug, Deserialize, PartialEq)]
struct Hero {
    name: String,
}

#[tokio::test]
async fn decodable_in_every_style() {
    let (client, _) = client(Script::Respond {
        status: 200,
        body: br#"{"name":"Leia"}"#,
    });
    let make = || client.request("http://localhost/hero", RequestOptions::new());
    let leia = Hero {
        name: "Leia".into(),
    };

    let (on_success, on_failure, mut rx) = capture::<Hero>();
    make().response_decodable(on_success, on_failure);
    assert_eq!(rx.recv().await.unwrap().unwrap(), leia);

    let streamed = make().decodable_stream::<Hero>().next().await.unwrap();
    assert_eq!(streamed.unwrap(), leia);

    assert_eq!(make().decodable::<Hero>().await.unwrap(), leia);
}

#[tokio::test]
async fn decodable_mismatch_is_decode_failure() {
    let (client, _) = client(Script::Respond {
        status: 200,
        body: br#"{"title":"x"}"#,
    });
    let err = client
        .request("http://localhost/hero", RequestOptions::new())
        .decodable::<Hero>()
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::DecodeFailure(_)));
}

#[tokio::test]
async fn string_and_data_styles() {
    let (client, _) = client(Script::Respond { status: 200, body: b"plain text" });
    let make = || client.request("http://localhost/t", RequestOptions::new());

    assert_eq!(make().string().await.unwrap(), "plain text");
    assert_eq!(make().data().await.unwrap(), Bytes::from_static(b"plain text"));
    let streamed = make().string_stream().next().await.unwrap().unwrap();
    assert_eq!(streamed, "plain text");
    let streamed = make().data_stream().next().await.unwrap().unwrap();
    assert_eq!(streamed.as_ref(), b"plain text");

    let (on_success, on_failure, mut rx) = capture::<String>();
    make().response_string(on_success, on_failure);
    assert_eq!(rx.recv().await.unwrap().unwrap(), "plain text");
}

#[tokio::test]
async fn custom_converter_error_keeps_cause() {
    let (client, _) = client(Script::Respond { status: 200, body: b"abc" });
    let make = || client.request("http://localhost/t", RequestOptions::new());
    let reject = |_: Bytes| -> Result<u32, BoxError> { Err("checksum mismatch".into()) };

    let err = make().convert_with(reject).await.unwrap_err();
    match err {
        NetworkError::Unknown(Some(cause)) => assert_eq!(cause.to_string(), "checksum mismatch"),
        other => panic!("unexpected {other:?}"),
    }

    let (on_success, on_failure, mut rx) = capture::<u32>();
    make().response_with(reject, on_success, on_failure);
    assert!(matches!(rx.recv().await.unwrap(), Err(NetworkError::Unknown(Some(_)))));
}

// ---------------------------------------------------------------------------
// Stream semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_is_cold_until_polled() {
    let (client, calls) = client(Script::Respond { status: 200, body: b"{}" });
    let stream = client
        .request("http://localhost/x", RequestOptions::new())
        .json_stream();
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    drop(stream);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn each_stream_sends_its_own_request() {
    let (client, calls) = client(Script::Respond { status: 200, body: b"{}" });
    for _ in 0..2 {
        let items: Vec<_> = client
            .request("http://localhost/x", RequestOptions::new())
            .json_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Completion delivery
// ---------------------------------------------------------------------------

#[test]
fn main_queue_delivers_on_the_draining_thread() {
    let (client, _) = client(Script::Respond { status: 200, body: b"ok" });
    let (queue, main_loop) = MainQueue::new();
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();

    // No tokio context here: the client falls back to its background runtime.
    client
        .request("http://localhost/x", RequestOptions::new())
        .deliver_on(queue)
        .response_string(
            move |text| *slot.lock().unwrap() = Some((text, std::thread::current().id())),
            None,
        );

    assert_eq!(main_loop.run_until(1, Duration::from_secs(5)), 1);
    let (text, thread) = seen.lock().unwrap().take().unwrap();
    assert_eq!(text, "ok");
    assert_eq!(thread, std::thread::current().id());
}

#[tokio::test]
async fn missing_failure_handler_drops_error() {
    let (client, calls) = client(Script::Refuse);
    client
        .request("http://localhost/x", RequestOptions::new())
        .response_data(|_| panic!("success must not fire"), None);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_reports_fractional_progress() {
    let (client, _) = client(Script::Download {
        status: 200,
        total: Some(1000),
        chunks: vec![250, 250, 500],
    });
    let fractions = Arc::new(Mutex::new(Vec::new()));
    let sink = fractions.clone();
    let (on_success, on_failure, mut rx) = capture::<std::path::PathBuf>();

    client
        .request("http://localhost/file", RequestOptions::new())
        .response_file(
            Some(Arc::new(move |f: f64| sink.lock().unwrap().push(f))),
            on_success,
            on_failure,
        );

    let path = rx.recv().await.unwrap().unwrap();
    assert_eq!(*fractions.lock().unwrap(), vec![0.25, 0.5, 1.0]);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 1000);
    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn download_without_length_skips_progress() {
    let (client, _) = client(Script::Download {
        status: 200,
        total: None,
        chunks: vec![10, 10],
    });
    let fractions = Arc::new(Mutex::new(Vec::<f64>::new()));
    let sink = fractions.clone();
    let path = client
        .request("http://localhost/file", RequestOptions::new())
        .file(Some(Arc::new(move |f: f64| sink.lock().unwrap().push(f))))
        .await
        .unwrap();
    assert!(fractions.lock().unwrap().is_empty());
    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn failed_download_never_delivers_a_file() {
    let (client, _) = client(Script::Download {
        status: 404,
        total: Some(4),
        chunks: vec![4],
    });
    let (on_success, on_failure, mut rx) = capture::<std::path::PathBuf>();
    client
        .request("http://localhost/file", RequestOptions::new())
        .response_file(None, on_success, on_failure);

    let err = rx.recv().await.unwrap().unwrap_err();
    assert_eq!(describe(&err), ("response_failure", Some(404), None));
}

#[tokio::test]
async fn download_transport_failure_is_response_failure() {
    let (client, _) = client(Script::Refuse);
    let err = client
        .request("http://localhost/file", RequestOptions::new())
        .file(None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::ResponseFailure { cause: TransportError::Connect(_), status: None, .. }
    ));
}

#[tokio::test]
async fn graphql_body_reaches_transport_with_string_variables() {
    struct Capture(Arc<Mutex<Option<Bytes>>>);

    #[async_trait]
    impl Transport for Capture {
        async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportFailure> {
            *self.0.lock().unwrap() = request.body.clone();
            Ok(HttpResponse {
                status: 200,
                headers: Headers::new(),
                body: Bytes::from_static(b"{}"),
            })
        }

        async fn download(
            &self,
            _request: &RequestDescriptor,
            _destination: &Path,
            _progress: ProgressFn,
        ) -> Result<DownloadResponse, TransportFailure> {
            Err(TransportFailure::before_response(TransportError::Other("unused".into())))
        }
    }

    let captured = Arc::new(Mutex::new(None));
    let client = Client::builder()
        .config(Config::default())
        .transport(Capture(captured.clone()))
        .build();
    let variables = match json!({"episode": "JEDI"}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    client
        .graphql_request("http://localhost/graphql", "query Q { hero }", Some(variables), Headers::new())
        .json()
        .await
        .unwrap();

    let body = captured.lock().unwrap().take().unwrap();
    let sent: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(sent["query"], "query Q { hero }");
    assert_eq!(sent["variables"], Value::String(r#"{"episode":"JEDI"}"#.into()));
}
