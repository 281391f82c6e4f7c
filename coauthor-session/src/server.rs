//! Authenticated WebSocket endpoint.
//!
//! Each accepted socket is served as a single HTTP/1.1 upgrade request:
//! the bearer token (header or `?token=`) is verified against the auth
//! service first, the 101 response is written only for accepted
//! identities, and the upgraded stream then runs the connection's
//! reader/writer pair.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use coauthor_auth::{extract_bearer, AuthClient, AuthError};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info};

use crate::connection;
use crate::connection::SessionContext;
use crate::error::SessionResult;

/// Session server configuration.
#[derive(Debug, Clone)]
pub struct SessionServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
}

impl Default for SessionServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
        }
    }
}

/// WebSocket session endpoint.
pub struct SessionServer {
    config: SessionServerConfig,
    ctx: Arc<SessionContext>,
    auth: Arc<AuthClient>,
}

impl SessionServer {
    /// Create a server over the shared session context and auth client.
    pub fn new(
        config: SessionServerConfig,
        ctx: Arc<SessionContext>,
        auth: Arc<AuthClient>,
    ) -> Self {
        Self { config, ctx, auth }
    }

    /// Accept connections until the listener fails.
    pub async fn run(&self) -> SessionResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "session server listening");

        loop {
            let (stream, addr) = listener.accept().await?;
            let ctx = Arc::clone(&self.ctx);
            let auth = Arc::clone(&self.auth);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let ctx = Arc::clone(&ctx);
                    let auth = Arc::clone(&auth);
                    async move {
                        Ok::<_, std::convert::Infallible>(upgrade(req, ctx, auth).await)
                    }
                });
                let conn = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades();
                if let Err(err) = conn.await {
                    debug!(addr = %addr, error = %err, "connection ended with error");
                }
            });
        }
    }
}

/// Authenticate and upgrade one request, spawning the session on success.
async fn upgrade(
    req: Request<Incoming>,
    ctx: Arc<SessionContext>,
    auth: Arc<AuthClient>,
) -> Response<Full<Bytes>> {
    let token = request_token(&req).unwrap_or_default();
    let claims = match auth.verify(&token).await {
        Ok(claims) => claims,
        Err(err) => {
            debug!(error = %err, "upgrade rejected");
            return auth_error_response(&err);
        }
    };

    let Some(key) = req.headers().get("Sec-WebSocket-Key").cloned() else {
        return plain_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "missing Sec-WebSocket-Key" }),
        );
    };
    let accept = derive_accept_key(key.as_bytes());

    let user_id = claims.user_id;
    let username = claims.username.clone();
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let io = TokioIo::new(upgraded);
                let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                info!(user_id, username = %username, "session established");
                connection::run(ctx, ws, user_id, username).await;
            }
            Err(err) => error!(user_id, error = %err, "upgrade failed"),
        }
    });

    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = resp.headers_mut();
    headers.insert(
        hyper::header::CONNECTION,
        hyper::header::HeaderValue::from_static("Upgrade"),
    );
    headers.insert(
        hyper::header::UPGRADE,
        hyper::header::HeaderValue::from_static("websocket"),
    );
    if let Ok(value) = hyper::header::HeaderValue::from_str(&accept) {
        headers.insert(hyper::header::SEC_WEBSOCKET_ACCEPT, value);
    }
    resp
}

/// Token from the `Authorization` header, falling back to `?token=` since
/// browsers cannot set custom headers on WebSocket upgrades.
fn request_token(req: &Request<Incoming>) -> Option<String> {
    if let Some(value) = req.headers().get(hyper::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = extract_bearer(value) {
                return Some(token.to_string());
            }
        }
    }
    let query = req.uri().query()?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some("token") {
            let token = parts.next().unwrap_or_default().trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    None
}

fn auth_error_response(err: &AuthError) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::UNAUTHORIZED);
    plain_response(
        status,
        json!({ "code": err.code(), "message": err.to_string() }),
    )
}

fn plain_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let mut resp = Response::new(Full::new(Bytes::from(bytes)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_key_derivation() {
        // value from RFC 6455 §1.3
        let accept = derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_auth_error_mapping() {
        let resp = auth_error_response(&AuthError::Unauthenticated("bad token".into()));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = auth_error_response(&AuthError::Upstream("down".into()));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
