//! Access log: one line per response with client address, method, full URL and status.
//!
//! This complements the `TraceLayer` spans with a compact line in the shape operators grep
//! for, e.g. `203.0.113.7:51234 GET http://share.example.com/AbCdEf/notes.txt?dl=1 -> 200`.

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::info;

/// Axum middleware writing the access log line once the handler produced a response.
pub async fn access_log(request: Request, next: Next) -> Response {
    let client = client_address(&request);
    let method = request.method().clone();
    let location = full_url(&request);

    let response = next.run(request).await;

    info!(
        target: "blobshare::access",
        "{} {} {} -> {}",
        client,
        method,
        location,
        response.status().as_u16()
    );
    response
}

/// The client as seen by the service: the first `X-Forwarded-For` hop when a proxy set
/// one, otherwise the socket peer.
pub fn client_address(request: &Request) -> String {
    if let Some(forwarded) = forwarded_for(request.headers()) {
        return forwarded;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// Absolute URL of the request including the query string, as far as it can be
/// reconstructed from the `Host` header.
pub fn full_url(request: &Request) -> String {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    match request.headers().get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{path_and_query}"),
        None => request.uri().to_string(),
    }
}
