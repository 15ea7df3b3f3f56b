use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use crate::security::{AuditEntry, AuditLevel};
use crate::state::AppState;

/// Client identity extracted from the request
#[derive(Clone, Debug)]
pub struct ClientContext {
    /// Client IP as seen by the gateway; mask before logging
    pub ip_address: String,
    /// Hashed key used for rate limiting
    pub client_key: String,
}

/// Left on a response by the panic handlers so the audit layer can record it
#[derive(Clone, Debug)]
pub struct HandlerPanicked {
    pub function_name: &'static str,
}

/// Middleware that resolves the client IP and derives its rate-limit key
pub async fn client_context_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let ip_address = client_ip(req.headers(), peer, &state.trusted_proxies);
    let client_key = state.key_generator.generate(&ip_address);

    req.extensions_mut().insert(ClientContext {
        ip_address,
        client_key,
    });

    next.run(req).await
}

/// Audit a handler panic with the caller's masked address
pub async fn panic_audit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let ip_address = req
        .extensions()
        .get::<ClientContext>()
        .map(|ctx| ctx.ip_address.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    if let Some(panicked) = response.extensions().get::<HandlerPanicked>() {
        state.audit.emit(
            AuditEntry::new(panicked.function_name, "internal_error", &ip_address, started)
                .level(AuditLevel::Error)
                .success(false)
                .meta("error_kind", "panic"),
        );
    }

    response
}

/// The socket peer, unless it is a trusted proxy.
///
/// Behind a trusted proxy the right-most `x-forwarded-for` hop that is not
/// itself a trusted proxy wins, then `x-real-ip`. Hops further left were
/// written by the client and are never used.
fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    for hop in hops.iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => continue,
            Ok(ip) => return ip.to_string(),
            Err(_) => return peer.to_string(),
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    #[test]
    fn test_untrusted_peer_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.42"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_ip(&headers, Some(ip("10.0.0.9")), &[]), "10.0.0.9");
        assert_eq!(client_ip(&headers, Some(ip("10.0.0.9")), &[ip("10.0.0.1")]), "10.0.0.9");
        assert_eq!(client_ip(&headers, None, &[ip("10.0.0.1")]), "unknown");
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        let proxies = [ip("10.0.0.1"), ip("10.0.0.2")];
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("6.6.6.6, 203.0.113.42, 10.0.0.2"),
        );

        assert_eq!(client_ip(&headers, Some(ip("10.0.0.1")), &proxies), "203.0.113.42");
    }

    #[test]
    fn test_trusted_proxy_fallbacks() {
        let proxies = [ip("10.0.0.1")];
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(ip("10.0.0.1")), &proxies), "10.0.0.1");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, Some(ip("10.0.0.1")), &proxies), "198.51.100.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_ip(&headers, Some(ip("10.0.0.1")), &proxies), "10.0.0.1");
    }
}
