use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Proxy-supplied caller address headers, in precedence order
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Bucket shared by every request whose address cannot be determined.
/// Address-less traffic stays rate limited instead of slipping through.
pub const UNKNOWN_ADDRESS: &str = "unknown";

const KEY_PREFIX: &str = "ratelimit";
const ADDRESS_DIGEST_LEN: usize = 16;

/// Resolve the caller address for rate limiting purposes.
///
/// Trusts proxy headers first so deployments behind a load balancer key on
/// the real client, not the balancer. Falls back to the peer address of the
/// connection, then to the shared unknown bucket.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

/// Derive the store key for one caller and endpoint class.
///
/// The address is hashed so raw client IPs never land in the store or in
/// log lines that mention the key. The first 16 hex characters keep keys
/// short while leaving collisions rarer than a shared NAT address.
pub fn derive_key(address: &str, class: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(address.as_bytes()));
    format!("{}:{}:{}", KEY_PREFIX, class, &digest[..ADDRESS_DIGEST_LEN])
}
