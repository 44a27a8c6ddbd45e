//! SBI HTTP client
//!
//! hyper-based client for outbound calls. SBI peers (NRF, UDM) speak HTTP/2
//! with prior knowledge; the webconsole poll uses HTTP/1.1. Connections are
//! established lazily and HTTP/2 senders are reused while they stay ready.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

use crate::error::{SbiError, SbiResult};
use crate::message::{SbiRequest, SbiResponse};
use crate::tls;

/// Default connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT: u64 = 5;
/// Default request timeout in seconds; outbound SBI calls are bounded to 5 s.
const DEFAULT_REQUEST_TIMEOUT: u64 = 5;

/// URI scheme of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UriScheme {
    #[default]
    Http,
    Https,
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct SbiClientConfig {
    pub scheme: UriScheme,
    pub host: String,
    pub port: u16,
    /// HTTP/2 with prior knowledge (SBI default); false selects HTTP/1.1.
    pub http2: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub ca_cert: Option<String>,
    pub insecure_skip_verify: bool,
}

impl Default for SbiClientConfig {
    fn default() -> Self {
        Self {
            scheme: UriScheme::Http,
            host: "localhost".to_string(),
            port: 80,
            http2: true,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }
}

impl SbiClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_scheme(mut self, scheme: UriScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_http1(mut self) -> Self {
        self.http2 = false;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_uri(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

enum Connection {
    H2(hyper::client::conn::http2::SendRequest<Full<Bytes>>),
    H1(hyper::client::conn::http1::SendRequest<Full<Bytes>>),
}

/// SBI HTTP client for one peer endpoint.
pub struct SbiClient {
    config: SbiClientConfig,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SbiClient {
    pub fn new(config: SbiClientConfig) -> Self {
        Self {
            config,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_host_port(host: impl Into<String>, port: u16) -> Self {
        Self::new(SbiClientConfig::new(host, port))
    }

    /// Build a client from a base URI such as `http://127.0.0.1:29510`.
    pub fn from_uri(uri: &str) -> SbiResult<Self> {
        let (scheme, rest) = if let Some(rest) = uri.strip_prefix("https://") {
            (UriScheme::Https, rest)
        } else if let Some(rest) = uri.strip_prefix("http://") {
            (UriScheme::Http, rest)
        } else {
            return Err(SbiError::InvalidUri(format!("unsupported scheme: {uri}")));
        };

        let host_port = rest.split('/').next().unwrap_or(rest);
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| SbiError::InvalidUri(format!("bad port in {uri}")))?;
                (host.to_string(), port)
            }
            None => {
                let default_port = match scheme {
                    UriScheme::Https => 443,
                    UriScheme::Http => 80,
                };
                (host_port.to_string(), default_port)
            }
        };
        if host.is_empty() {
            return Err(SbiError::InvalidUri(format!("missing host in {uri}")));
        }

        Ok(Self::new(SbiClientConfig::new(host, port).with_scheme(scheme)))
    }

    pub fn config(&self) -> &SbiClientConfig {
        &self.config
    }

    /// Switch to HTTP/1.1 for non-SBI peers such as the webconsole.
    pub fn with_http1(mut self) -> Self {
        self.config.http2 = false;
        self
    }

    async fn open_stream(&self) -> SbiResult<TcpStream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SbiError::Timeout)?
            .map_err(|e| SbiError::ConnectionError(e.to_string()))
    }

    async fn connect(&self) -> SbiResult<Connection> {
        let stream = self.open_stream().await?;

        if self.config.scheme == UriScheme::Https {
            let client_config = tls::build_client_config(
                self.config.ca_cert.as_deref(),
                self.config.insecure_skip_verify,
            )?;
            let connector = TlsConnector::from(Arc::new(client_config));
            let server_name = ServerName::try_from(self.config.host.clone())
                .map_err(|e| SbiError::TlsError(format!("Invalid server name: {e}")))?;

            let tls_stream = tokio::time::timeout(
                self.config.connect_timeout,
                connector.connect(server_name, stream),
            )
            .await
            .map_err(|_| SbiError::Timeout)?
            .map_err(|e| SbiError::TlsError(format!("TLS handshake failed: {e}")))?;

            self.handshake(TokioIo::new(tls_stream)).await
        } else {
            self.handshake(TokioIo::new(stream)).await
        }
    }

    async fn handshake<I>(&self, io: I) -> SbiResult<Connection>
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        if self.config.http2 {
            let (sender, conn) =
                hyper::client::conn::http2::handshake(hyper_util::rt::TokioExecutor::new(), io)
                    .await
                    .map_err(|e| SbiError::ConnectionError(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    log::debug!("HTTP/2 connection closed: {e}");
                }
            });
            Ok(Connection::H2(sender))
        } else {
            let (sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| SbiError::ConnectionError(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    log::debug!("HTTP/1.1 connection closed: {e}");
                }
            });
            Ok(Connection::H1(sender))
        }
    }

    fn build_http_request(&self, request: &SbiRequest) -> SbiResult<Request<Full<Bytes>>> {
        let method = match request.header.method.to_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "PATCH" => Method::PATCH,
            other => {
                return Err(SbiError::ClientError(format!("invalid method: {other}")));
            }
        };

        let mut path = request.header.uri.clone();
        if !request.http.params.is_empty() {
            let mut params: Vec<String> = request
                .http
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            params.sort();
            path = format!("{}?{}", path, params.join("&"));
        }

        // Absolute form for HTTP/2, origin form plus Host for HTTP/1.1.
        let uri_str = if self.config.http2 {
            format!("{}{}", self.config.base_uri(), path)
        } else {
            path
        };
        let uri: Uri = uri_str
            .parse()
            .map_err(|e| SbiError::InvalidUri(format!("{uri_str}: {e}")))?;

        let mut builder = Request::builder().method(method).uri(uri);
        if !self.config.http2 {
            builder = builder.header("Host", format!("{}:{}", self.config.host, self.config.port));
        }
        for (key, value) in &request.http.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let body = request
            .http
            .content
            .clone()
            .map(|c| Full::new(Bytes::from(c)))
            .unwrap_or_else(|| Full::new(Bytes::new()));

        builder
            .body(body)
            .map_err(|e| SbiError::ClientError(e.to_string()))
    }

    /// Send a request and collect the response.
    pub async fn send_request(&self, request: SbiRequest) -> SbiResult<SbiResponse> {
        let http_request = self.build_http_request(&request)?;

        let mut guard = self.connection.lock().await;
        let needs_connect = match guard.as_ref() {
            Some(Connection::H2(sender)) => !sender.is_ready(),
            Some(Connection::H1(sender)) => sender.is_closed(),
            None => true,
        };
        if needs_connect {
            *guard = Some(self.connect().await?);
        }

        // HTTP/2 multiplexes; clone the sender and release the lock while the
        // request is in flight. HTTP/1.1 serializes on the connection instead.
        let h2_sender = match guard.as_ref() {
            Some(Connection::H2(sender)) => Some(sender.clone()),
            _ => None,
        };

        if let Some(mut sender) = h2_sender {
            drop(guard);
            let response = tokio::time::timeout(
                self.config.request_timeout,
                sender.send_request(http_request),
            )
            .await
            .map_err(|_| SbiError::Timeout)?
            .map_err(|e| SbiError::ConnectionError(e.to_string()))?;
            return convert_response(response).await;
        }

        let Some(Connection::H1(sender)) = guard.as_mut() else {
            return Err(SbiError::ConnectionError("connection lost".to_string()));
        };
        let result = tokio::time::timeout(
            self.config.request_timeout,
            sender.send_request(http_request),
        )
        .await;
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                *guard = None;
                return Err(SbiError::ConnectionError(e.to_string()));
            }
            Err(_) => {
                *guard = None;
                return Err(SbiError::Timeout);
            }
        };
        drop(guard);

        convert_response(response).await
    }

    /// Send a GET request.
    pub async fn get(&self, path: &str) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::get(path)).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::post(path).with_json_body(body)?)
            .await
    }

    /// Send a PUT request with a JSON body.
    pub async fn put_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::put(path).with_json_body(body)?)
            .await
    }

    /// Send a PATCH request with a JSON body.
    pub async fn patch_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::patch(path).with_json_body(body)?)
            .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> SbiResult<SbiResponse> {
        self.send_request(SbiRequest::delete(path)).await
    }

    /// Drop any cached connection.
    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        *guard = None;
    }
}

async fn convert_response(response: hyper::Response<Incoming>) -> SbiResult<SbiResponse> {
    let status = response.status().as_u16();

    let mut headers = HashMap::new();
    for (key, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(key.to_string(), v.to_string());
        }
    }

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| SbiError::InvalidResponse(e.to_string()))?
        .to_bytes();

    let mut sbi_response = SbiResponse::with_status(status);
    sbi_response.http.headers = headers;
    if !body_bytes.is_empty() {
        sbi_response.http.content = Some(String::from_utf8_lossy(&body_bytes).to_string());
    }

    Ok(sbi_response)
}
