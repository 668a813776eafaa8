//! HTTP Basic Authentication for the admin API and admin WebSocket

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::types::Role;
use crate::ws::WsQuery;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AdminAuthConfig {
    /// Username for admin access (None = auth disabled)
    pub username: Option<String>,
    /// Password for admin access
    pub password: Option<String>,
}

impl AdminAuthConfig {
    /// Load auth config from environment variables
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Admin authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Admin authentication DISABLED - anyone can manage rounds!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true, // Auth disabled, allow all
        }
    }

    /// Check the Basic credentials carried by `request`
    fn authorizes(&self, request: &Request<Body>) -> bool {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
            .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
            .and_then(|decoded| String::from_utf8(decoded).ok())
            .is_some_and(|credentials| match credentials.split_once(':') {
                Some((username, password)) => self.validate(username, password),
                None => false,
            })
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized(realm: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, realm)],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware for HTTP Basic Authentication on admin routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AdminAuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() || auth_config.authorizes(&request) {
        return next.run(request).await;
    }
    unauthorized("Basic realm=\"Cookoff Admin\"")
}

/// Whether `request` opens the WebSocket as an admin.
///
/// The query is decoded the same way the upgrade handler decodes it, so
/// percent-encoded spellings of the role are caught too.
fn requests_admin_socket(request: &Request<Body>) -> bool {
    if request.uri().path() != "/ws" {
        return false;
    }
    match Query::<WsQuery>::try_from_uri(request.uri()) {
        Ok(Query(params)) => params.role() == Role::Admin,
        // The upgrade handler rejects the same query
        Err(_) => false,
    }
}

/// Middleware to require HTTP Basic Auth for admin WebSocket connections.
///
/// Without it anyone could connect to `/ws?role=admin`.
pub async fn admin_ws_auth_middleware(
    State(auth_config): State<Arc<AdminAuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !requests_admin_socket(&request) {
        return next.run(request).await;
    }

    if !auth_config.is_enabled() {
        tracing::warn!(
            "Admin WebSocket requested but admin authentication is DISABLED; set ADMIN_USERNAME and ADMIN_PASSWORD"
        );
        return next.run(request).await;
    }

    if auth_config.authorizes(&request) {
        return next.run(request).await;
    }
    unauthorized("Basic realm=\"Cookoff Admin (WebSocket)\"")
}
