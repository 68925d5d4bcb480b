//! Works out which address a request came from.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap},
};

/// The header set by reverse proxies with the original client address.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Where the client address of a request is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAddressSource {
    /// The socket peer address. Headers sent by the client are ignored.
    #[default]
    Peer,
    /// The first `X-Forwarded-For` entry, falling back to the peer address.
    ///
    /// Only safe behind a reverse proxy that overwrites the header.
    ForwardedFor,
}

/// The client address of a request, used for rate limiting and logs.
///
/// Returns "unknown" when no address is available.
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    source: ClientAddressSource,
) -> String {
    if source == ClientAddressSource::ForwardedFor {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|address| !address.is_empty());

        if let Some(address) = forwarded {
            return address.to_owned();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}
