// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client IP attribution for anonymous rate limiting.

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Best-known client address, if any.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

/// First hop of `X-Forwarded-For`.
pub fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Attach a [`ClientIp`] extension from the proxy header or peer address.
pub async fn attach_client_ip(mut request: Request, next: Next) -> Response {
    let ip = forwarded_for(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}
