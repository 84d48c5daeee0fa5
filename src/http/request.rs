//! Request inspection.
//!
//! Everything the pipeline needs is read from the request here: the client
//! IP, the `Origin` header, the caller identity and the signature headers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::connect_info::MockConnectInfo;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates a v4 UUID for every request without an incoming id.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request id assigned by the request-id layer, or "unknown".
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Resolve the caller's IP.
///
/// Uses the peer address unless `trust_forwarded_for` is set and the first
/// `X-Forwarded-For` entry parses. The peer comes from `ConnectInfo`, or from
/// `MockConnectInfo` when the router is driven without a socket, matching the
/// `ConnectInfo` extractor. Without either, the unspecified address is
/// returned so that any IP allow-list rejects the request.
pub fn client_ip<B>(request: &Request<B>, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Raw `Origin` header, empty when absent or not valid text.
pub fn origin(headers: &HeaderMap) -> &str {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

/// Header value as text, empty when absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

/// The path covered by a request signature: the absolute request path with
/// any trailing slash removed.
pub fn signed_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)], peer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/wp-json/pcc/v1/snapshot");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        req
    }

    #[test]
    fn test_client_ip_from_peer() {
        let req = request(&[("x-forwarded-for", "203.0.113.9")], Some("10.1.2.3:5555"));
        assert_eq!(client_ip(&req, false), "10.1.2.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_from_forwarded_for_when_trusted() {
        let req = request(
            &[("x-forwarded-for", "203.0.113.9, 10.0.0.1")],
            Some("10.1.2.3:5555"),
        );
        assert_eq!(client_ip(&req, true), "203.0.113.9".parse::<IpAddr>().unwrap());

        let bogus = request(&[("x-forwarded-for", "not-an-ip")], Some("10.1.2.3:5555"));
        assert_eq!(client_ip(&bogus, true), "10.1.2.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_from_mock_peer() {
        let mut req = request(&[], None);
        req.extensions_mut()
            .insert(MockConnectInfo("192.0.2.10:5000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&req, false), "192.0.2.10".parse::<IpAddr>().unwrap());

        req.extensions_mut()
            .insert(ConnectInfo("10.1.2.3:5555".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&req, false), "10.1.2.3".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_unknown_peer() {
        assert!(client_ip(&request(&[], None), false).is_unspecified());
    }

    #[test]
    fn test_signed_path() {
        assert_eq!(signed_path("/wp-json/pcc/v1/snapshot/signed/"), "/wp-json/pcc/v1/snapshot/signed");
        assert_eq!(signed_path("/wp-json/pcc/v1/snapshot/signed"), "/wp-json/pcc/v1/snapshot/signed");
        assert_eq!(signed_path("/"), "/");
    }

    #[test]
    fn test_origin_and_headers() {
        let req = request(&[("origin", " https://app.example.com "), ("x-pcc-key", "ci")], None);
        assert_eq!(origin(req.headers()), "https://app.example.com");
        assert_eq!(header_str(req.headers(), "x-pcc-key"), "ci");
        assert_eq!(header_str(req.headers(), "x-pcc-signature"), "");
    }

    #[test]
    fn test_uuid_request_id() {
        let req = request(&[], None);
        let id = UuidRequestId.make_request_id(&req).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }
}
