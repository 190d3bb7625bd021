use std::net::SocketAddr;

use axum::http::HeaderMap;

/// The two best-effort identity signals used for duplicate-vote deterrence,
/// plus the user agent kept for forensics. Neither signal is strong
/// identity; a voter who clears both simply votes unauthenticated against
/// duplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoterIdentity {
    pub ip_address: Option<String>,
    pub fingerprint: Option<String>,
    pub user_agent: Option<String>,
}

/// Derives the voter identity from request metadata. Pure and infallible;
/// absence of every signal is a valid outcome.
pub fn resolve(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    fingerprint: Option<String>,
) -> VoterIdentity {
    VoterIdentity {
        ip_address: client_ip(headers, peer),
        fingerprint: fingerprint.filter(|f| !f.is_empty()),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// First `X-Forwarded-For` entry if the request came through a proxy,
/// otherwise the peer address of the connection.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
