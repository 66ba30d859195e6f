//! # HTTP Server
//!
//! HTTP/1 host built on Hyper and Tokio. Each hyper request becomes a
//! [`Request`], goes through [`Router::dispatch`] and comes back as a
//! hyper response.
//!
//! ## Key Features
//!
//! - Request body size limit (413 before the router runs)
//! - Graceful shutdown on Ctrl-C or a [`CancellationToken`]
//! - In-flight connections drain up to the configured timeout

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// HTTP server owning a frozen router
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a server; nothing is bound until [`Self::serve`]
    pub fn new(router: Router, config: ServerConfig) -> Self {
        Self {
            config,
            router: Arc::new(router),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the accept loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Server configuration
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unresolvable address and
    /// `Error::BindError` if the socket cannot be bound.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = bind(addr).map_err(|source| Error::BindError {
            address: addr.to_string(),
            source,
        })?;
        self.run(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if accepting a connection fails.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Server listening on http://{}", addr);
        }

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let router = Arc::clone(&self.router);
                    let token = self.shutdown.clone();
                    let active = Arc::clone(&active);

                    active.fetch_add(1, Ordering::Relaxed);
                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move {
                                Ok::<_, Infallible>(handle_request(req, &router, remote_addr, max_body_size).await)
                            }
                        });

                        let conn = http1::Builder::new().serve_connection(io, service);
                        tokio::pin!(conn);
                        let mut draining = false;
                        let result = loop {
                            tokio::select! {
                                res = conn.as_mut() => break res,
                                () = token.cancelled(), if !draining => {
                                    conn.as_mut().graceful_shutdown();
                                    draining = true;
                                }
                            }
                        };
                        if let Err(err) = result {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested, stopping server...");
                    break;
                }
                () = ctrl_c() => {
                    info!("Shutdown signal received, stopping server...");
                    self.shutdown.cancel();
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout(), drain).await.is_err() {
            warn!(
                open = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        Ok(())
    }

    /// Dispatch a request without the network stack, applying the body limit
    pub async fn handle(&self, mut req: Request) -> Response {
        let size = req.body_bytes().map_or(0, <[u8]>::len);
        if size > self.config.max_body_size {
            return Error::PayloadTooLarge {
                limit: self.config.max_body_size,
                actual: size,
            }
            .into_response();
        }
        req.set_header("x-client-ip", "local");
        self.router.dispatch(req).await
    }
}

fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn handle_request(
    req: hyper::Request<Incoming>,
    router: &Router,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let version = req.version();

    let response = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(mut request) => {
            request.set_header("x-client-ip", &remote_addr.ip().to_string());
            let method = request.method;
            let path = request.path.clone();
            let response = router.dispatch(request).await;
            info!(
                "    {} - \"{} {} {:?}\" {}",
                remote_addr, method, path, version, response.status
            );
            response
        }
        Err(e @ Error::RouteNotFound { .. }) => {
            info!("    {} - {} {}", remote_addr, e, e.status_code());
            e.into_response()
        }
        Err(e @ Error::PayloadTooLarge { .. }) => {
            warn!("{} - rejected request: {}", remote_addr, e);
            e.into_response()
        }
        Err(e) => {
            debug!("{} - unreadable request: {}", remote_addr, e);
            Response::bad_request("Bad Request")
        }
    };

    response.into_hyper()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::router::Method;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn router() -> Router {
        let mut router = Router::new();
        router
            .get(
                "/users/:int",
                handler(|_req, params| async move { Response::ok(&serde_json::json!({ "id": params.get(0) })) }),
            )
            .unwrap();
        router
    }

    #[test]
    fn test_server_config_default() {
        let server = Server::new(Router::new(), ServerConfig::default());
        assert_eq!(server.config().port, 8000);
        assert_eq!(server.config().max_body_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_handle_dispatches() {
        let server = Server::new(router(), ServerConfig::default());
        let response = server.handle(Request::get("/users/42")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_json().unwrap()["data"]["id"], "42");
    }

    #[tokio::test]
    async fn test_handle_rejects_large_body() {
        let config = ServerConfig {
            max_body_size: 4,
            ..ServerConfig::default()
        };
        let server = Server::new(router(), config);
        let req = Request::new(Method::Post, "/users/1", HashMap::new(), Some(Bytes::from("0123456789")));
        assert_eq!(server.handle(req).await.status, 413);
    }

    #[tokio::test]
    async fn test_serves_over_tcp_and_shuts_down() {
        let server = Arc::new(Server::new(router(), ServerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = server.shutdown_token();

        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run(listener).await })
        };

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /users/7 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(raw.contains(r#""id":"7""#));

        token.cancel();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_route_over_tcp() {
        let server = Arc::new(Server::new(router(), ServerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = server.shutdown_token();
        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run(listener).await })
        };

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"DELETE /nowhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 404"));

        token.cancel();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_method_is_not_served_as_get() {
        let server = Arc::new(Server::new(router(), ServerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = server.shutdown_token();
        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run(listener).await })
        };

        for verb in ["TRACE", "PURGE"] {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            let head = format!("{verb} /users/7 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
            stream.write_all(head.as_bytes()).await.unwrap();
            let mut raw = String::new();
            stream.read_to_string(&mut raw).await.unwrap();
            assert!(raw.starts_with("HTTP/1.1 404"), "{verb}: {raw}");
            assert!(!raw.contains(r#""id":"7""#));
        }

        token.cancel();
        running.await.unwrap().unwrap();
    }
}
