//! HTTP endpoints for the interaction counters.
//!
//! Routes (all bearer-authenticated against the auth service):
//!
//! - `POST /social/{like,question_mark,share}/{increment,decrement}` with
//!   body `{"docId": "..."}` → `{"value": n}`
//! - `GET /social/{like,question_mark,share}/value?doc_id=...`
//!   (`doc_id`, `docId`, or a `docid` header) → `{"value": n}`

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use coauthor_auth::{extract_bearer, AuthClient, AuthError};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::counters::InteractionStore;
use crate::keys::InteractionKind;

/// Social HTTP server configuration.
#[derive(Debug, Clone)]
pub struct SocialServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
}

impl Default for SocialServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".parse().expect("static addr"),
        }
    }
}

/// HTTP edge for the interaction counters.
pub struct SocialServer {
    config: SocialServerConfig,
    store: Arc<dyn InteractionStore>,
    auth: Arc<AuthClient>,
}

#[derive(Debug, Deserialize, Default)]
struct SocialRequestBody {
    #[serde(rename = "docId", default)]
    doc_id: String,
}

impl SocialServer {
    /// Create a server over the given store and auth client.
    pub fn new(
        config: SocialServerConfig,
        store: Arc<dyn InteractionStore>,
        auth: Arc<AuthClient>,
    ) -> Self {
        Self {
            config,
            store,
            auth,
        }
    }

    /// Accept connections until the listener fails.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "social HTTP server listening");

        loop {
            let (stream, addr) = listener.accept().await?;
            let store = Arc::clone(&self.store);
            let auth = Arc::clone(&self.auth);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let store = Arc::clone(&store);
                    let auth = Arc::clone(&auth);
                    async move { Ok::<_, std::convert::Infallible>(handle(req, store, auth).await) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(addr = %addr, error = %err, "social connection error");
                }
            });
        }
    }
}

/// Route and serve one request.
async fn handle(
    req: Request<Incoming>,
    store: Arc<dyn InteractionStore>,
    auth: Arc<AuthClient>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate(&req, &auth).await {
        Ok(claims) => claims,
        Err(err) => return auth_error_response(&err),
    };

    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (kind, action) = match segments.as_slice() {
        ["social", kind, action] => match InteractionKind::from_route(kind) {
            Some(kind) => (kind, action.to_string()),
            None => return not_found(),
        },
        _ => return not_found(),
    };

    match (req.method().clone(), action.as_str()) {
        (Method::POST, "increment") | (Method::POST, "decrement") => {
            let decrement = action == "decrement";
            let doc_id = match doc_id_from_body(req).await {
                Ok(doc_id) => doc_id,
                Err(resp) => return resp,
            };
            let result = if decrement {
                store.decr(kind, &doc_id, claims.user_id).await
            } else {
                store.incr(kind, &doc_id, claims.user_id).await
            };
            match result {
                Ok((_, value)) => json_response(StatusCode::OK, &json!({ "value": value })),
                Err(err) => {
                    error!(doc_id = %doc_id, error = %err, "interaction update failed");
                    json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({ "error": err.to_string() }),
                    )
                }
            }
        }
        (Method::GET, "value") => {
            let Some(doc_id) = doc_id_from_query_or_headers(req.uri().query(), req.headers())
            else {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({ "error": "missing doc_id" }),
                );
            };
            match store.get(kind, &doc_id).await {
                Ok(value) => json_response(StatusCode::OK, &json!({ "value": value })),
                Err(err) => {
                    error!(doc_id = %doc_id, error = %err, "interaction read failed");
                    json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({ "error": err.to_string() }),
                    )
                }
            }
        }
        _ => not_found(),
    }
}

async fn authenticate(
    req: &Request<Incoming>,
    auth: &AuthClient,
) -> Result<coauthor_auth::VerifyClaims, AuthError> {
    let token = bearer_token(req.headers(), req.uri().query()).unwrap_or_default();
    auth.verify(&token).await
}

/// Token from the `Authorization` header, falling back to `?token=` for
/// clients that cannot set headers.
fn bearer_token(headers: &hyper::HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(hyper::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = extract_bearer(value) {
                return Some(token.to_string());
            }
        }
    }
    query_param(query, "token")
}

async fn doc_id_from_body(req: Request<Incoming>) -> Result<String, Response<Full<Bytes>>> {
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return Err(json_response(
                StatusCode::BAD_REQUEST,
                &json!({ "error": err.to_string() }),
            ))
        }
    };
    // an empty body is tolerated; it just fails the missing-doc check below
    let body: SocialRequestBody = if bytes.is_empty() {
        SocialRequestBody::default()
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(err) => {
                return Err(json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({ "error": err.to_string() }),
                ))
            }
        }
    };
    if body.doc_id.is_empty() {
        return Err(json_response(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "missing doc_id" }),
        ));
    }
    Ok(body.doc_id)
}

/// Accepts `?doc_id=`, `?docId=`, and the `docid`/`docId` headers that
/// various frontends send.
fn doc_id_from_query_or_headers(query: Option<&str>, headers: &hyper::HeaderMap) -> Option<String> {
    for name in ["doc_id", "docId"] {
        if let Some(value) = query_param(query, name) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    for name in ["docid", "docId"] {
        if let Some(value) = headers.get(name) {
            if let Ok(value) = value.to_str() {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    for pair in query?.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            return Some(parts.next().unwrap_or_default().trim().to_string());
        }
    }
    None
}

fn auth_error_response(err: &AuthError) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::UNAUTHORIZED);
    json_response(
        status,
        &json!({ "code": err.code(), "message": err.to_string() }),
    )
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" }))
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
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
    use hyper::header::HeaderValue;
    use hyper::HeaderMap;

    #[test]
    fn test_route_segments() {
        let path = "/social/question_mark/increment";
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        assert_eq!(segments, vec!["social", "question_mark", "increment"]);
        assert_eq!(
            InteractionKind::from_route(segments[1]),
            Some(InteractionKind::QuestionMark)
        );
    }

    #[test]
    fn test_body_parsing() {
        let body: SocialRequestBody = serde_json::from_str(r#"{"docId":"d1"}"#).unwrap();
        assert_eq!(body.doc_id, "d1");

        let empty: SocialRequestBody = serde_json::from_str("{}").unwrap();
        assert!(empty.doc_id.is_empty());
    }

    #[test]
    fn test_doc_id_sources() {
        let headers = HeaderMap::new();
        assert_eq!(
            doc_id_from_query_or_headers(Some("doc_id=a"), &headers).as_deref(),
            Some("a")
        );
        assert_eq!(
            doc_id_from_query_or_headers(Some("docId=b&x=1"), &headers).as_deref(),
            Some("b")
        );

        let mut headers = HeaderMap::new();
        headers.insert("docid", HeaderValue::from_static("c"));
        assert_eq!(
            doc_id_from_query_or_headers(None, &headers).as_deref(),
            Some("c")
        );

        assert_eq!(doc_id_from_query_or_headers(None, &HeaderMap::new()), None);
    }

    #[test]
    fn test_bearer_token_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok-1"),
        );
        assert_eq!(bearer_token(&headers, None).as_deref(), Some("tok-1"));

        // query fallback for clients that cannot set headers
        assert_eq!(
            bearer_token(&HeaderMap::new(), Some("token=tok-2")).as_deref(),
            Some("tok-2")
        );
        assert_eq!(bearer_token(&HeaderMap::new(), None), None);
    }
}
