//! Request and response model shared by every policy
//!
//! A [`Request`] is cloneable so policies can replay it; a [`Response`] is
//! owned by the attempt that produced it and never shared across retries.

use crate::error::{CloudError, Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Header carrying the opaque logging-context tag
pub const LOGGING_CONTEXT_HEADER: &str = "x-ms-logging-context";

/// Outgoing HTTP request with path and query parameters already substituted
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Opaque tag used to correlate log lines for one logical call
    pub logging_context: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            logging_context: None,
        }
    }

    /// Parse `url` and build a request for it
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::Contract(format!("invalid request URL '{}': {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Set a header, replacing any existing value
    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Contract(format!("invalid value for header '{}': {}", name, e)))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    /// Serialize `body` as JSON and set the content type
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    pub fn with_logging_context(mut self, context: impl Into<String>) -> Self {
        self.logging_context = Some(context.into());
        self
    }

    /// Append a query parameter
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Incoming HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// CloudError decoded from a non-2xx body by the decoding policy
    pub cloud_error: Option<CloudError>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            cloud_error: None,
        }
    }

    /// Build a response from a status and JSON body
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self::new(status, headers, body.to_string().into_bytes())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as lossy UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as JSON, or `Value::Null` when empty
    pub fn json_value(&self) -> Result<serde_json::Value> {
        if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(serde_json::Value::Null);
        }
        self.json()
    }

    /// The CloudError for this response, decoding the body if no policy did
    pub fn decoded_error(&self) -> Option<CloudError> {
        self.cloud_error
            .clone()
            .or_else(|| CloudError::from_body(&self.body))
    }

    /// `Retry-After` in whole seconds, when present and numeric
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Turn a non-2xx response into [`Error::Http`]
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(Error::Http {
            status: self.status.as_u16(),
            error: self.decoded_error(),
            body: self.text(),
        })
    }
}
