//! SBI HTTP/2 server
//!
//! hyper server for the inbound SBI surface. Accepts plaintext HTTP/2 with
//! prior knowledge or TLS with ALPN `h2` when certificates are configured.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio_rustls::TlsAcceptor;

use crate::error::{SbiError, SbiResult};
use crate::message::{SbiHeader, SbiHttpMessage, SbiRequest, SbiResponse};
use crate::tls;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct SbiServerConfig {
    pub addr: SocketAddr,
    /// TLS certificate path; TLS is enabled when both paths are set.
    pub cert: Option<String>,
    /// TLS private key path.
    pub private_key: Option<String>,
}

impl SbiServerConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            cert: None,
            private_key: None,
        }
    }

    pub fn with_tls(mut self, cert: impl Into<String>, private_key: impl Into<String>) -> Self {
        self.cert = Some(cert.into());
        self.private_key = Some(private_key.into());
        self
    }
}

/// Handler for incoming SBI requests.
pub trait SbiRequestHandler: Send + Sync + 'static {
    fn handle(&self, request: SbiRequest) -> Pin<Box<dyn Future<Output = SbiResponse> + Send>>;
}

impl<F, Fut> SbiRequestHandler for F
where
    F: Fn(SbiRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SbiResponse> + Send + 'static,
{
    fn handle(&self, request: SbiRequest) -> Pin<Box<dyn Future<Output = SbiResponse> + Send>> {
        Box::pin(self(request))
    }
}

struct SbiService<H: SbiRequestHandler> {
    handler: Arc<H>,
}

impl<H: SbiRequestHandler> Clone for SbiService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H: SbiRequestHandler> Service<Request<Incoming>> for SbiService<H> {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();
        Box::pin(async move {
            let sbi_request = convert_request(req).await;
            let sbi_response = handler.handle(sbi_request).await;
            Ok(convert_response(sbi_response))
        })
    }
}

async fn convert_request(req: Request<Incoming>) -> SbiRequest {
    let method = req.method().to_string();
    let uri = req.uri().to_string();

    let mut http = SbiHttpMessage::new();
    for (key, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            http.set_header(key.to_string(), v.to_string());
        }
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                http.set_param(key.to_string(), value.to_string());
            }
        }
    }

    if let Ok(body) = req.into_body().collect().await {
        let bytes = body.to_bytes();
        if !bytes.is_empty() {
            http.set_content(String::from_utf8_lossy(&bytes).to_string());
        }
    }

    SbiRequest {
        header: SbiHeader::with_method_uri(method, uri),
        http,
    }
}

fn convert_response(sbi_response: SbiResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(sbi_response.status);
    for (key, value) in &sbi_response.http.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    let body = sbi_response
        .http
        .content
        .map(|c| Full::new(Bytes::from(c)))
        .unwrap_or_else(|| Full::new(Bytes::new()));

    builder.body(body).unwrap_or_else(|_| {
        Response::builder()
            .status(500)
            .body(Full::new(Bytes::from("Internal Server Error")))
            .expect("static error response")
    })
}

enum ServerState {
    Stopped,
    Running(oneshot::Sender<()>),
}

/// SBI HTTP/2 server.
pub struct SbiServer {
    config: SbiServerConfig,
    state: Arc<Mutex<ServerState>>,
}

impl SbiServer {
    pub fn new(config: SbiServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ServerState::Stopped)),
        }
    }

    pub fn config(&self) -> &SbiServerConfig {
        &self.config
    }

    /// Bind and start serving. Returns once the listener is accepting; the
    /// accept loop runs until [`stop`](Self::stop).
    pub async fn start<H: SbiRequestHandler>(&self, handler: H) -> SbiResult<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, ServerState::Running(_)) {
            return Err(SbiError::ServerError("Server already running".to_string()));
        }

        let listener = TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| SbiError::ServerError(format!("Failed to bind {}: {e}", self.config.addr)))?;

        let acceptor = match (&self.config.cert, &self.config.private_key) {
            (Some(cert), Some(key)) => {
                let certs = tls::load_certs(cert)?;
                let key = tls::load_private_key(key)?;
                let tls_config = tls::build_server_config(certs, key)?;
                Some(TlsAcceptor::from(Arc::new(tls_config)))
            }
            _ => None,
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *state = ServerState::Running(shutdown_tx);
        drop(state);

        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let service = SbiService { handler: handler.clone() };
                                let acceptor = acceptor.clone();
                                tokio::spawn(async move {
                                    match acceptor {
                                        Some(acceptor) => {
                                            let tls_stream = match acceptor.accept(stream).await {
                                                Ok(s) => s,
                                                Err(e) => {
                                                    log::warn!("TLS accept from {peer} failed: {e}");
                                                    return;
                                                }
                                            };
                                            serve_h2(TokioIo::new(tls_stream), service).await;
                                        }
                                        None => serve_h2(TokioIo::new(stream), service).await,
                                    }
                                });
                            }
                            Err(e) => {
                                log::warn!("Accept error: {e}");
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop accepting connections.
    pub async fn stop(&self) -> SbiResult<()> {
        let mut state = self.state.lock().await;
        if let ServerState::Running(shutdown_tx) =
            std::mem::replace(&mut *state, ServerState::Stopped)
        {
            let _ = shutdown_tx.send(());
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, ServerState::Running(_))
    }
}

async fn serve_h2<I, H>(io: I, service: SbiService<H>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    H: SbiRequestHandler,
{
    if let Err(e) = http2::Builder::new(hyper_util::rt::TokioExecutor::new())
        .serve_connection(io, service)
        .await
    {
        log::debug!("HTTP/2 connection error: {e}");
    }
}
