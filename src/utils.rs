// src/utils.rs
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use ipnetwork::IpNetwork;
use log::debug;
use serde_json::json;
use std::net::IpAddr;
use thiserror::Error;

use crate::context::SyncError;
use crate::session::{SessionId, SESSION_COOKIE};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to extract client IP")]
    MissingPeerIP,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Admin login required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Webhook secret mismatch")]
    InvalidWebhookSecret,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Sync(#[from] SyncError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized | Self::InvalidCredentials | Self::InvalidWebhookSecret => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Sync(SyncError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Sync(SyncError::Store(StoreError::RowNotFound(_))) => StatusCode::NOT_FOUND,
            Self::Sync(SyncError::Store(StoreError::NotConfigured)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Sync(_) => StatusCode::BAD_GATEWAY,
            Self::MissingPeerIP => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Proxies allowed to report the client address in `X-Forwarded-For`.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(pub Vec<IpNetwork>);

impl TrustedProxies {
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|network| network.contains(ip))
    }
}

/// Client address for rate limiting. `X-Forwarded-For` is only read when the
/// peer is a trusted proxy; the nearest hop that is not itself a trusted proxy
/// is the client.
pub fn extract_client_ip(
    req: &HttpRequest,
    trusted: &TrustedProxies,
) -> Result<IpAddr, ApiError> {
    let peer = req
        .peer_addr()
        .map(|addr| addr.ip())
        .ok_or(ApiError::MissingPeerIP)?;

    if !trusted.contains(peer) {
        return Ok(peer);
    }

    if let Some(forwarded_for) = req.headers().get("X-Forwarded-For") {
        if let Ok(value) = forwarded_for.to_str() {
            let client = value
                .rsplit(',')
                .map_while(|hop| hop.trim().parse::<IpAddr>().ok())
                .find(|ip| !trusted.contains(*ip));
            if let Some(ip) = client {
                debug!("Using X-Forwarded-For client IP: {}", ip);
                return Ok(ip);
            }
        }
    }

    Ok(peer)
}

/// Equality whose running time depends only on the lengths of the inputs.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Session id carried by the admin cookie, if any and well-formed.
pub fn session_id(req: &HttpRequest) -> Option<SessionId> {
    req.cookie(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<SessionId>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    fn proxies(networks: &[&str]) -> TrustedProxies {
        TrustedProxies(networks.iter().map(|n| n.parse().unwrap()).collect())
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn forwarded_for_is_ignored_from_untrusted_peers() {
        let req = TestRequest::default()
            .peer_addr("198.51.100.4:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .to_http_request();
        assert_eq!(
            extract_client_ip(&req, &TrustedProxies::default()).unwrap(),
            ip("198.51.100.4")
        );
        assert_eq!(
            extract_client_ip(&req, &proxies(&["10.0.0.0/8"])).unwrap(),
            ip("198.51.100.4")
        );
    }

    #[test]
    fn trusted_proxy_reports_the_nearest_untrusted_hop() {
        let trusted = proxies(&["10.0.0.0/8"]);

        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "1.2.3.4, 203.0.113.7, 10.0.0.2"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req, &trusted).unwrap(), ip("203.0.113.7"));

        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "garbage"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req, &trusted).unwrap(), ip("10.0.0.1"));

        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(extract_client_ip(&req, &trusted).unwrap(), ip("10.0.0.1"));
    }

    #[test]
    fn constant_time_eq_compares_whole_inputs() {
        assert!(constant_time_eq(b"hook-secret", b"hook-secret"));
        assert!(!constant_time_eq(b"hook-secret", b"hook-secreT"));
        assert!(!constant_time_eq(b"hook-secret", b"hook"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn malformed_session_cookie_is_ignored() {
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "not-a-uuid"))
            .to_http_request();
        assert!(session_id(&req).is_none());

        let id = uuid::Uuid::new_v4();
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, id.to_string()))
            .to_http_request();
        assert_eq!(session_id(&req), Some(id));
    }

    #[actix_web::test]
    async fn errors_render_as_json() {
        let err = ApiError::Sync(SyncError::Invalid("Title is required".into()));
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Title is required");
    }
}
