//! # SSI API client
//!
//! This module implements the main [`ApiClient`]: authenticated HTTP calls
//! against `{url}/api/{name}`, background calls with callbacks, streaming
//! file downloads and JSON websocket connections.
//!
//! Non-200 responses are classified into [`Error::Api`] values. The server
//! framework's generic `404`/`5xx` placeholder bodies are replaced with a
//! call-specific message; any server-provided body is kept verbatim.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{multipart, Client, Method, Response, StatusCode};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ws::{ws_url, JsonWebSocket, WsOptions};

/// Header carrying the configured project identifier.
pub const PROJECT_HEADER: &str = "X-Paf-Project";
/// Header carrying the configured authentication token.
pub const TOKEN_HEADER: &str = "X-Paf-Token";

/// Downloads are written (and progress is reported) in chunks of this size;
/// only the final chunk may be shorter.
const DOWNLOAD_CHUNK_SIZE: usize = 4096;

/// A decoded API response body: parsed JSON when the server answered with
/// `application/json`, raw text otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiBody {
    Json(Value),
    Text(String),
}

impl ApiBody {
    /// The parsed JSON value, if the response was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiBody::Json(value) => Some(value),
            ApiBody::Text(_) => None,
        }
    }

    /// The raw text, if the response was not JSON.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ApiBody::Json(_) => None,
            ApiBody::Text(text) => Some(text),
        }
    }
}

/// A file attachment for a multipart call.
#[derive(Clone, Debug)]
pub struct FileAttachment {
    /// Form field name.
    pub field: String,
    /// File name reported to the server.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn new<F: Into<String>, N: Into<String>>(field: F, filename: N, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            bytes,
        }
    }
}

/// Per-call options for [`ApiClient::call_with`] and
/// [`ApiClient::call_raw`].
///
/// When `files` is non-empty the params are sent as multipart form fields
/// instead of a JSON body. `query` is attached to the URL independently of
/// the body encoding.
#[derive(Clone, Debug)]
pub struct CallOptions {
    /// HTTP method, case-insensitive. One of post, get, put, delete,
    /// patch, head.
    pub method: String,
    /// Extra URL query parameters.
    pub query: Option<Map<String, Value>>,
    /// Caller-supplied headers. Configuration headers override these on
    /// key collision.
    pub headers: HeaderMap,
    /// File attachments; non-empty switches the body to multipart.
    pub files: Vec<FileAttachment>,
    /// Per-request timeout; `None` uses the transport default.
    pub timeout: Option<Duration>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            method: "post".to_string(),
            query: None,
            headers: HeaderMap::new(),
            files: Vec::new(),
            timeout: None,
        }
    }
}

impl CallOptions {
    pub fn method<M: Into<String>>(mut self, method: M) -> Self {
        self.method = method.into();
        self
    }

    pub fn query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn file(mut self, attachment: FileAttachment) -> Self {
        self.files.push(attachment);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`ApiClient::download`].
#[derive(Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Print cumulative progress to stdout after each received chunk.
    pub print_progress: bool,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

/// Success callback for [`ApiClient::call_background`].
pub type SuccessHandler = Box<dyn FnOnce(ApiBody) + Send>;
/// Error callback for [`ApiClient::call_background`].
pub type ErrorHandler = Box<dyn FnOnce(Error) + Send>;

/// Client for the SSI HTTP/WebSocket API.
///
/// The client is cheap to clone; clones share the underlying connection
/// pool. Configuration is immutable after construction, so a client can be
/// shared across any number of concurrent calls.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Config,
}

impl ApiClient {
    /// Creates a new client from a resolved configuration.
    pub fn new(config: Config) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    /// Creates a new client from `SSI_API_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// The client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the authentication header set from the configuration.
    ///
    /// `X-Paf-Project` is present iff a project is configured, `X-Paf-Token`
    /// iff a token is configured. Built fresh on every request.
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(project) = &self.config.project {
            headers.insert(PROJECT_HEADER, header_value(PROJECT_HEADER, project)?);
        }
        if let Some(token) = &self.config.token {
            headers.insert(TOKEN_HEADER, header_value(TOKEN_HEADER, token)?);
        }
        Ok(headers)
    }

    /// Performs an API call with default options (POST, JSON body).
    ///
    /// `params` must be a JSON object; it is sent as the request body.
    pub async fn call(&self, name: &str, params: Value) -> Result<ApiBody> {
        self.call_with(name, params, CallOptions::default()).await
    }

    /// Performs an API call.
    ///
    /// Validates the arguments, dispatches `{url}/api/{name}`, classifies
    /// the status and decodes the body by content type.
    pub async fn call_with(&self, name: &str, params: Value, options: CallOptions) -> Result<ApiBody> {
        let response = self.dispatch(name, params, &options).await?;
        let response = self.check_status(response, name).await?;
        let body = decode_body(response).await?;
        if self.config.trace {
            info!(call = %name, response = ?body, "API response");
        }
        Ok(body)
    }

    /// Performs an API call and returns the unprocessed response.
    ///
    /// No status classification is applied; the caller assumes
    /// responsibility for error handling.
    pub async fn call_raw(&self, name: &str, params: Value, options: CallOptions) -> Result<Response> {
        self.dispatch(name, params, &options).await
    }

    /// Schedules an API call on a background task and returns immediately.
    ///
    /// One independent task is spawned per invocation. On success the
    /// decoded body is delivered to `on_success`, if supplied. On failure
    /// the error is delivered to `on_error`; without an error handler the
    /// failure is silent. The returned handle can be awaited but carries no
    /// result.
    pub fn call_background<N: Into<String>>(
        &self,
        name: N,
        params: Value,
        options: CallOptions,
        on_success: Option<SuccessHandler>,
        on_error: Option<ErrorHandler>,
    ) -> JoinHandle<()> {
        let client = self.clone();
        let name = name.into();
        tokio::spawn(async move {
            match client.call_with(&name, params, options).await {
                Ok(body) => {
                    if let Some(handler) = on_success {
                        handler(body);
                    }
                }
                Err(err) => {
                    if let Some(handler) = on_error {
                        handler(err);
                    }
                    // Unobserved failures stay silent, matching the
                    // fire-and-forget contract.
                }
            }
        })
    }

    /// Downloads a file from `{url}/api/{path}` to `out_filename`.
    ///
    /// `params` are sent as query parameters; a configured token is
    /// additionally injected as a `token` parameter so that the same URL
    /// works for clients that cannot send headers. The body is streamed to
    /// disk in fixed 4096-byte chunks, overwriting any existing file.
    /// Returns the number of bytes written.
    pub async fn download(
        &self,
        path: &str,
        params: Value,
        out_filename: &Path,
        options: DownloadOptions,
    ) -> Result<u64> {
        if path.is_empty() {
            return Err(Error::Validation("path must be a non-empty string".into()));
        }
        let mut params = as_object(params)?;
        if let Some(token) = &self.config.token {
            // Redundant auth channel for download endpoints fetched by
            // plain HTTP clients with no header support.
            params.insert("token".to_string(), Value::String(token.clone()));
        }

        let url = format!("{}/api/{}", self.config.url, path);
        debug!(url = %url, out = %out_filename.display(), "downloading file");
        let mut request = self
            .http
            .get(&url)
            .headers(self.auth_headers()?)
            .query(&query_pairs(&params));
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let response = self.check_status(response, path).await?;

        let mut file = File::create(out_filename).await?;
        if options.print_progress {
            println!("Downloading file {}:", out_filename.display());
        }
        let mut downloaded: u64 = 0;
        let mut buffer: Vec<u8> = Vec::with_capacity(DOWNLOAD_CHUNK_SIZE);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            // Rechunk the transport-sized pieces into fixed-size writes.
            while buffer.len() >= DOWNLOAD_CHUNK_SIZE {
                let rest = buffer.split_off(DOWNLOAD_CHUNK_SIZE);
                file.write_all(&buffer).await?;
                downloaded += buffer.len() as u64;
                if options.print_progress {
                    println!("{} KB downloaded.", downloaded as f64 / 1024.0);
                }
                buffer = rest;
            }
        }
        if !buffer.is_empty() {
            file.write_all(&buffer).await?;
            downloaded += buffer.len() as u64;
            if options.print_progress {
                println!("{} KB downloaded.", downloaded as f64 / 1024.0);
            }
        }
        file.flush().await?;
        if options.print_progress {
            println!("Done downloading.");
        }
        debug!(url = %url, bytes = downloaded, "download complete");
        Ok(downloaded)
    }

    /// Opens a JSON websocket to `{ws_url}/ws/{path}`.
    ///
    /// The base URL scheme is rewritten (`https` → `wss`, `http` → `ws`)
    /// and `params` are appended as a percent-encoded query string. The
    /// optional timeout bounds the connection handshake.
    pub async fn ws(&self, path: &str, params: Value, options: WsOptions) -> Result<JsonWebSocket> {
        if path.is_empty() {
            return Err(Error::Validation("path must be a non-empty string".into()));
        }
        let params = as_object(params)?;
        let url = ws_url(&self.config.url, path, &params);
        if self.config.trace {
            info!(url = %url, "opening websocket");
        }

        use tokio_tungstenite::tungstenite::client::IntoClientRequest;
        let mut request = url.as_str().into_client_request()?;
        request.headers_mut().extend(options.headers.clone());
        request.headers_mut().extend(self.auth_headers()?);
        JsonWebSocket::connect(request, options.timeout).await
    }

    /// Dispatches a request without touching the response.
    async fn dispatch(&self, name: &str, params: Value, options: &CallOptions) -> Result<Response> {
        if name.is_empty() {
            return Err(Error::Validation("call name must be a non-empty string".into()));
        }
        let params = as_object(params)?;
        let method = parse_method(&options.method)?;

        let url = format!("{}/api/{}", self.config.url, name);
        if self.config.trace {
            info!(
                call = %name,
                method = %method,
                params = %serde_json::Value::Object(params.clone()),
                query = ?options.query,
                "dispatching API call"
            );
        }

        // Ordered merge: caller headers first, configuration headers
        // override on collision.
        let mut headers = options.headers.clone();
        headers.extend(self.auth_headers()?);

        let mut request = self.http.request(method, &url).headers(headers);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(query) = &options.query {
            request = request.query(&query_pairs(query));
        }
        if !options.files.is_empty() {
            let mut form = multipart::Form::new();
            for (key, value) in &params {
                form = form.text(key.clone(), stringify(value));
            }
            for attachment in &options.files {
                form = form.part(
                    attachment.field.clone(),
                    multipart::Part::bytes(attachment.bytes.clone())
                        .file_name(attachment.filename.clone()),
                );
            }
            request = request.multipart(form);
        } else if !params.is_empty() {
            request = request.json(&params);
        }

        let response = request.send().await?;
        if self.config.trace {
            info!(url = %response.url(), "API response received");
        }
        Ok(response)
    }

    /// Classifies a completed response.
    ///
    /// A 200 passes through untouched. Anything else consumes the body and
    /// fails with [`Error::Api`] carrying the resolved message.
    async fn check_status(&self, response: Response, call: &str) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        let is_json = content_type_is_json(response.headers());
        let raw = response.text().await?;
        let message = if is_json {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::String(s)) => s,
                Ok(other) => other.to_string(),
                Err(_) => raw,
            }
        } else {
            raw
        };
        Err(Error::Api {
            status: status.as_u16(),
            message: resolve_error_message(status, message.trim(), call),
        })
    }
}

/// Resolves the error message for a non-200 response.
///
/// The framework's generic placeholder bodies are replaced with a
/// call-specific message; any other server-provided body is kept verbatim.
fn resolve_error_message(status: StatusCode, body: &str, call: &str) -> String {
    if status == StatusCode::NOT_FOUND && body == "Not Found" {
        format!("Call \"{}\" was not found.", call)
    } else if status.is_server_error() && body == "Internal Server Error" {
        format!("Call \"{}\" failed with server error.", call)
    } else {
        body.to_string()
    }
}

async fn decode_body(response: Response) -> Result<ApiBody> {
    if content_type_is_json(response.headers()) {
        Ok(ApiBody::Json(response.json().await?))
    } else {
        Ok(ApiBody::Text(response.text().await?))
    }
}

fn content_type_is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("application/json")
        })
        .unwrap_or(false)
}

fn parse_method(method: &str) -> Result<Method> {
    match method.to_ascii_lowercase().as_str() {
        "post" => Ok(Method::POST),
        "get" => Ok(Method::GET),
        "put" => Ok(Method::PUT),
        "delete" => Ok(Method::DELETE),
        "patch" => Ok(Method::PATCH),
        "head" => Ok(Method::HEAD),
        other => Err(Error::Validation(format!("unknown method: {}", other))),
    }
}

fn as_object(params: Value) -> Result<Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map),
        other => Err(Error::Validation(format!(
            "parameters must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Renders a params map as query pairs. JSON strings pass through
/// unquoted; every other value is rendered as compact JSON.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), stringify(value)))
        .collect()
}

pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Configuration(format!("configured {} value is not a valid header", name)))
}
