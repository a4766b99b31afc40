//! Client IP extraction from HTTP headers with trust validation
//!
//! The service acts as its own IP-echo endpoint, so the address a request
//! arrives from is the visitor's identity. Forwarding headers are only
//! believed under an explicit trusted-proxy policy:
//! - `none`: the socket peer address, headers ignored
//! - `standard`: RFC 7239 `Forwarded`, then `X-Forwarded-For`, walked
//!   right-to-left past trusted hops
//! - `cloudflare`: `CF-Connecting-IP`

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{IdentityConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address, if known
/// * `config` - Identity configuration with trust settings
///
/// # Returns
/// The client IP address, or `None` when neither a trusted header nor the
/// socket address is available
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<IpAddr>,
    config: &IdentityConfig,
) -> Option<IpAddr> {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Extract IP from standard headers (Forwarded, X-Forwarded-For) with trust validation
fn extract_standard_ip(headers: &HeaderMap, config: &IdentityConfig) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded header
    let forwarded = forwarded_chain(headers);
    if !forwarded.is_empty() {
        return pick_from_chain(&forwarded, config);
    }

    let xff = x_forwarded_for_chain(headers);
    if !xff.is_empty() {
        return pick_from_chain(&xff, config);
    }

    None
}

/// `for=` addresses of every Forwarded element, in header order
fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("forwarded")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (name, value) = param.trim().split_once('=')?;
                if !name.eq_ignore_ascii_case("for") {
                    return None;
                }
                parse_forwarded_node(value)
            })
        })
        .collect()
}

/// Parse a Forwarded node: `192.0.2.60`, `"192.0.2.60:4711"`, `"[2001:db8::1]:4711"`
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    // IPv4 with port
    value.rsplit_once(':')?.0.parse().ok()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect()
}

/// Choose the client address from a proxy chain (leftmost = original client).
fn pick_from_chain(ips: &[IpAddr], config: &IdentityConfig) -> Option<IpAddr> {
    // A fixed hop count wins over CIDR matching
    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Not enough IPs in chain, return the leftmost (least trusted)
        return ips.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        // First address from the right that is not one of our proxies
        return ips
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| ips.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    ips.last().copied()
}
