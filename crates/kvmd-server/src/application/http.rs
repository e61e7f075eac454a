//! Request and response helpers shared by HTTP handlers.
//!
//! Every JSON reply uses one envelope:
//!
//! ```text
//! {
//!     "ok": true,
//!     "result": {...}
//! }
//! ```
//!
//! Bodies are pretty-printed with a 4-space indent; `serde_json::Map` keeps
//! keys sorted, so replies are stable byte-for-byte.
//!
//! Long-running handlers can instead stream a body: [`start_streaming`]
//! returns the response head immediately plus a [`StreamWriter`] that feeds
//! chunks into it, and [`stream_json`] writes one envelope per line.

use std::collections::HashMap;
use std::io;

use axum::body::{Body, Bytes};
use axum::extract::Query;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::domain::ApiError;

/// Chunks buffered between a streaming handler and the HTTP body.
const STREAM_BUFFER: usize = 16;

/// Everything except RFC 3986 unreserved characters.
const FILE_NAME_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

// ── Query arguments ───────────────────────────────────────────────────────────

/// Parsed query string of a request.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs(HashMap<String, String>);

impl QueryArgs {
    /// Parses the query string of `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidInput`] if the query string is malformed.
    pub fn from_uri(uri: &Uri) -> Result<Self, ApiError> {
        Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(args)| Self(args))
            .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
    }

    /// The argument as a JSON string value, ready for a validator.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).map(|v| Value::String(v.clone()))
    }

    /// Like [`QueryArgs::get`] but a missing argument is a validation error.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidInput`] naming the missing argument.
    pub fn require(&self, name: &str) -> Result<Value, ApiError> {
        self.get(name)
            .ok_or_else(|| ApiError::InvalidInput(format!("Missing argument: {name}")))
    }
}

// ── JSON envelope ─────────────────────────────────────────────────────────────

fn to_pretty_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

/// Builds a JSON envelope response.
///
/// `ok` is `true` exactly when `status` is 200.  A `null` result is sent as
/// an empty object.
pub fn make_json_response(result: Value, status: StatusCode) -> Response {
    make_json_response_with_cookies(result, status, &[])
}

/// [`make_json_response`] that also sets `HttpOnly`, `SameSite=Strict`
/// cookies.
pub fn make_json_response_with_cookies(
    result: Value,
    status: StatusCode,
    set_cookies: &[(&str, &str)],
) -> Response {
    let result = if result.is_null() { json!({}) } else { result };
    let body = to_pretty_json(&json!({
        "ok": status == StatusCode::OK,
        "result": result,
    }));

    let mut response = (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();
    for (name, value) in set_cookies {
        let cookie = format!("{name}={value}; HttpOnly; Path=/; SameSite=Strict");
        if let Ok(cookie) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    response
}

fn exception_result(err: &ApiError) -> Value {
    json!({
        "error": err.kind(),
        "error_msg": err.to_string(),
    })
}

fn log_api_error(err: &ApiError) {
    if !err.is_http_error() {
        error!("API error: {}: {}", err.kind(), err);
    }
}

/// Builds the envelope for a failed request.
///
/// Errors outside the plain HTTP family are logged as
/// `API error: <kind>: <message>`.
pub fn make_json_exception(err: &ApiError) -> Response {
    log_api_error(err);
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    make_json_response(exception_result(err), status)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Internal(err) => {
                error!("Unhandled API exception: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            other => make_json_exception(&other),
        }
    }
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// The client stopped reading the streamed body.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("streaming response was dropped by the client")]
pub struct StreamClosed;

/// Feeds chunks into a response started with [`start_streaming`].
#[derive(Debug, Clone)]
pub struct StreamWriter {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl StreamWriter {
    /// Writes one chunk, waiting while the body buffer is full.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), StreamClosed> {
        self.tx.send(Ok(chunk.into())).await.map_err(|_| StreamClosed)
    }

    /// Aborts the body with an I/O error.
    pub async fn abort(&self, reason: &str) {
        let error = io::Error::new(io::ErrorKind::Other, reason.to_string());
        if self.tx.send(Err(error)).await.is_err() {
            debug!("stream abort after the client went away: {reason}");
        }
    }
}

/// Starts a streamed 200 response.
///
/// When `file_name` is set the body is offered as a download through
/// `Content-Disposition: attachment; filename*=UTF-8''<name>`.  The body
/// ends when every [`StreamWriter`] clone is dropped.
///
/// # Errors
///
/// Returns [`ApiError::Internal`] if `content_type` is not a valid header value.
pub fn start_streaming(
    content_type: &str,
    content_length: Option<u64>,
    file_name: Option<&str>,
) -> Result<(Response, StreamWriter), ApiError> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(STREAM_BUFFER);
    let stream = ReceiverStream::new(rx);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    if let Some(name) = file_name.filter(|name| !name.is_empty()) {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename*=UTF-8''{}",
                utf8_percent_encode(name, FILE_NAME_ENCODE)
            ),
        );
    }
    let response = builder
        .body(Body::from_stream(stream))
        .map_err(anyhow::Error::from)?;

    Ok((response, StreamWriter { tx }))
}

/// Writes one `{"ok": ..., "result": ...}` line terminated by `\r\n`.
pub async fn stream_json(writer: &StreamWriter, result: Value, ok: bool) -> Result<(), StreamClosed> {
    let line = json!({ "ok": ok, "result": result }).to_string() + "\r\n";
    writer.write(line).await
}

/// Writes an error envelope line, logging it like [`make_json_exception`].
pub async fn stream_json_exception(writer: &StreamWriter, err: &ApiError) -> Result<(), StreamClosed> {
    log_api_error(err);
    stream_json(writer, exception_result(err), false).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_make_json_response_is_pretty_and_sorted() {
        // Act
        let response = make_json_response(json!({"z": 1, "a": true}), StatusCode::OK);

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(
            body_string(response).await,
            "{\n    \"ok\": true,\n    \"result\": {\n        \"a\": true,\n        \"z\": 1\n    }\n}"
        );
    }

    #[tokio::test]
    async fn test_make_json_response_null_result_becomes_empty_object() {
        let response = make_json_response(Value::Null, StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, json!({"ok": true, "result": {}}));
    }

    #[tokio::test]
    async fn test_non_200_status_sets_ok_false() {
        let response = make_json_response(json!({}), StatusCode::CREATED);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["ok"], false);
    }

    #[test]
    fn test_cookies_are_http_only_and_strict() {
        let response = make_json_response_with_cookies(
            json!({}),
            StatusCode::OK,
            &[("auth_token", "abc")],
        );
        assert_eq!(
            response.headers()[header::SET_COOKIE],
            "auth_token=abc; HttpOnly; Path=/; SameSite=Strict"
        );
    }

    #[tokio::test]
    async fn test_make_json_exception_envelope() {
        let response = make_json_exception(&ApiError::Busy("HID is busy".into()));

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(
            body,
            json!({"ok": false, "result": {"error": "IsBusyError", "error_msg": "HID is busy"}})
        );
    }

    #[tokio::test]
    async fn test_internal_error_is_bare_500() {
        let response = ApiError::Internal(anyhow::anyhow!("boom")).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.is_empty());
    }

    #[test]
    fn test_query_args_require_reports_missing_name() {
        let uri: Uri = "/hid/events/send_key?key=KeyA".parse().unwrap();
        let args = QueryArgs::from_uri(&uri).unwrap();

        assert_eq!(args.get("key"), Some(json!("KeyA")));
        let err = args.require("state").unwrap_err();
        assert_eq!(err.to_string(), "Missing argument: state");
    }

    #[test]
    fn test_file_name_encoding_keeps_unreserved_characters() {
        let encode = |name: &str| utf8_percent_encode(name, FILE_NAME_ENCODE).to_string();
        assert_eq!(encode("msd image.iso"), "msd%20image.iso");
        assert_eq!(encode("ä"), "%C3%A4");
        assert_eq!(encode("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[tokio::test]
    async fn test_streaming_response_lines() {
        // Arrange
        let (response, writer) =
            start_streaming("application/x-ndjson", None, Some("log file.txt")).unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename*=UTF-8''log%20file.txt"
        );

        // Act
        let producer = tokio::spawn(async move {
            stream_json(&writer, json!({"n": 1}), true).await.unwrap();
            stream_json_exception(&writer, &ApiError::Operation("failed".into()))
                .await
                .unwrap();
        });
        let body = body_string(response).await;
        producer.await.unwrap();

        // Assert
        let lines: Vec<&str> = body.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            serde_json::from_str::<Value>(lines[0]).unwrap(),
            json!({"ok": true, "result": {"n": 1}})
        );
        assert_eq!(
            serde_json::from_str::<Value>(lines[1]).unwrap(),
            json!({"ok": false, "result": {"error": "OperationError", "error_msg": "failed"}})
        );
    }

    #[tokio::test]
    async fn test_abort_fails_the_body() {
        // Arrange
        let (response, writer) = start_streaming("text/plain", None, None).unwrap();

        // Act
        let producer = tokio::spawn(async move {
            writer.write("partial").await.unwrap();
            writer.abort("backend went away").await;
        });
        let collected = response.into_body().collect().await;
        producer.await.unwrap();

        // Assert
        assert!(collected.is_err());
    }

    #[tokio::test]
    async fn test_abort_after_client_left_does_not_panic() {
        let (response, writer) = start_streaming("text/plain", None, None).unwrap();
        drop(response);

        writer.abort("too late").await;

        assert_eq!(writer.write("more").await, Err(StreamClosed));
    }
}
