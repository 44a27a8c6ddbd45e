//! SBI message structures
//!
//! Request and response carriers shared by the client, the server and the
//! routing layer, plus the 3GPP `ProblemDetails` error body and the helpers
//! that build problem responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SbiResult;

/// Request line: method and URI.
#[derive(Debug, Clone, Default)]
pub struct SbiHeader {
    pub method: String,
    pub uri: String,
}

impl SbiHeader {
    pub fn with_method_uri(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
        }
    }
}

/// HTTP part of a message: headers, query parameters and body.
#[derive(Debug, Clone, Default)]
pub struct SbiHttpMessage {
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub content: Option<String>,
}

impl SbiHttpMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Case-insensitive header lookup.
    pub fn get_header(&self, key: &str) -> Option<&String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn get_param(&self, key: &str) -> Option<&String> {
        self.params.get(key)
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
    }
}

/// An SBI request.
#[derive(Debug, Clone, Default)]
pub struct SbiRequest {
    pub header: SbiHeader,
    pub http: SbiHttpMessage,
}

impl SbiRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            header: SbiHeader::with_method_uri(method, uri),
            http: SbiHttpMessage::new(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new("POST", uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Self::new("PUT", uri)
    }

    pub fn patch(uri: impl Into<String>) -> Self {
        Self::new("PATCH", uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new("DELETE", uri)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http.set_header(key, value);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http.set_param(key, value);
        self
    }

    /// Attach a JSON body and set the content type.
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> SbiResult<Self> {
        self.http.set_content(serde_json::to_string(body)?);
        self.http
            .set_header("Content-Type", "application/json");
        Ok(self)
    }
}

/// An SBI response.
#[derive(Debug, Clone, Default)]
pub struct SbiResponse {
    pub status: u16,
    pub http: SbiHttpMessage,
}

impl SbiResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            http: SbiHttpMessage::new(),
        }
    }

    pub fn ok() -> Self {
        Self::with_status(200)
    }

    pub fn no_content() -> Self {
        Self::with_status(204)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http.set_header(key, value);
        self
    }

    /// Attach a JSON body and set the content type.
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> SbiResult<Self> {
        self.http.set_content(serde_json::to_string(body)?);
        self.http
            .set_header("Content-Type", "application/json");
        Ok(self)
    }

    /// Parse the body as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> SbiResult<T> {
        let content = self.http.content.as_deref().unwrap_or("");
        Ok(serde_json::from_str(content)?)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 3GPP ProblemDetails (TS 29.571).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ProblemDetails {
    pub fn with_status(status: i32) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Build one with status and cause, the shape the AUSF procedures return.
    pub fn new(status: i32, cause: impl Into<String>) -> Self {
        Self::with_status(status).with_cause(cause)
    }

    /// Render as an HTTP response.
    pub fn to_response(&self) -> SbiResponse {
        let status = self.status.unwrap_or(500) as u16;
        SbiResponse::with_status(status)
            .with_json_body(self)
            .unwrap_or_else(|_| SbiResponse::with_status(status))
    }
}

/// Build a problem response.
pub fn send_error(status: u16, title: &str, detail: &str, cause: Option<&str>) -> SbiResponse {
    let mut problem = ProblemDetails::with_status(status as i32)
        .with_title(title)
        .with_detail(detail);
    if let Some(c) = cause {
        problem = problem.with_cause(c);
    }
    problem.to_response()
}

pub fn send_bad_request(detail: &str, cause: Option<&str>) -> SbiResponse {
    send_error(400, "Bad Request", detail, cause)
}

pub fn send_forbidden(detail: &str, cause: Option<&str>) -> SbiResponse {
    send_error(403, "Forbidden", detail, cause)
}

pub fn send_not_found(detail: &str, cause: Option<&str>) -> SbiResponse {
    send_error(404, "Not Found", detail, cause)
}

pub fn send_method_not_allowed(method: &str, resource: &str) -> SbiResponse {
    send_error(
        405,
        "Method Not Allowed",
        &format!("Method {method} not allowed for resource {resource}"),
        Some("METHOD_NOT_ALLOWED"),
    )
}

pub fn send_internal_error(detail: &str) -> SbiResponse {
    send_error(500, "Internal Server Error", detail, Some("INTERNAL_ERROR"))
}
