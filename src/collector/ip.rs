//! Client IP resolution

use std::net::{IpAddr, SocketAddr};

use super::RequestInfo;

/// Literal used when no source yields an address
pub const UNKNOWN_IP: &str = "unknown";

/// Resolve the client IP from a request
///
/// Order: first `x-forwarded-for` entry, `x-real-ip`, the socket remote
/// address, the request's own IP field, then `"unknown"`.
pub fn resolve_client_ip(request: &RequestInfo) -> String {
    if let Some(forwarded) = request.header("x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or(forwarded).trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = request.header("x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    if let Some(remote) = request.remote_addr.as_deref().map(str::trim) {
        if !remote.is_empty() {
            return strip_port(remote);
        }
    }

    if let Some(ip) = request.ip.as_deref().map(str::trim) {
        if !ip.is_empty() {
            return ip.to_string();
        }
    }

    UNKNOWN_IP.to_string()
}

/// Parse a resolved IP for lookups; `None` for "unknown" and garbage
pub fn parse_ip(ip: &str) -> Option<IpAddr> {
    ip.parse::<IpAddr>().ok().map(|addr| addr.to_canonical())
}

/// True when geolocation should not be attempted for this address
pub fn is_local(ip: &str) -> bool {
    match parse_ip(ip) {
        Some(addr) => addr.is_loopback(),
        None => true,
    }
}

fn strip_port(addr: &str) -> String {
    match addr.parse::<SocketAddr>() {
        Ok(socket) => socket.ip().to_string(),
        Err(_) => addr.to_string(),
    }
}
