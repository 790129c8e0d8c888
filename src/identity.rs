use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

pub const UNKNOWN_ADDRESS: &str = "unknown";

// Headers checked for the caller's address, highest priority first
const ADDRESS_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Pseudonymous token for a requesting address.
///
/// Not a security boundary: the hash is short, unkeyed and collisions are
/// possible. It only keeps raw addresses out of the counter store and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn from_address(address: &str) -> Self {
        Self(address_token(address))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// first non-empty candidate wins; x-forwarded-for may carry a proxy chain
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    ADDRESS_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or_default().trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

// 32-bit multiplicative string hash (x31), rendered in base36.
// Fixed arithmetic, no seed, so tokens are stable across restarts.
pub fn address_token(address: &str) -> String {
    let hash = address
        .bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(b as i32));
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientId::from_address(&client_address(&parts.headers, peer)))
    }
}
