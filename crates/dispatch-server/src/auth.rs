//! Caller identity extraction.
//!
//! The identity layer in front of this service authenticates callers and
//! forwards who they are as headers. This middleware turns those headers into
//! a [`Caller`] request extension, rejecting requests without a caller id
//! (401) and non-superusers without a tenant (403). Scope-free routes only
//! check for the caller id.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dispatch_core::identity::{CallerIdentity, TenantScope};

use crate::error::AppError;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Authenticated caller attached to every request that passes the middleware.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: CallerIdentity,
    pub scope: TenantScope,
    pub is_superuser: bool,
}

impl Caller {
    pub fn actor_id(&self) -> Option<String> {
        Some(self.identity.caller_id.clone())
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the caller from headers. `superuser_role` decides platform scope.
pub fn caller_from_headers(headers: &HeaderMap, superuser_role: &str) -> Result<Caller, AppError> {
    let Some(caller_id) = header(headers, CALLER_ID_HEADER) else {
        return Err(AppError::unauthenticated("missing caller identity"));
    };
    let identity = CallerIdentity::new(
        caller_id,
        header(headers, CALLER_ROLE_HEADER).unwrap_or_default(),
        header(headers, TENANT_ID_HEADER),
    );
    let scope = identity.scope(superuser_role)?;
    Ok(Caller {
        is_superuser: scope == TenantScope::Platform,
        identity,
        scope,
    })
}

/// Require a caller id without resolving a tenant scope. Used by routes that
/// touch no tenant data.
pub async fn caller_id_middleware(req: Request, next: Next) -> Response {
    if header(req.headers(), CALLER_ID_HEADER).is_none() {
        return AppError::unauthenticated("missing caller identity").into_response();
    }
    next.run(req).await
}

pub async fn identity_middleware(
    State(superuser_role): State<Arc<str>>,
    mut req: Request,
    next: Next,
) -> Response {
    match caller_from_headers(req.headers(), &superuser_role) {
        Ok(caller) => {
            tracing::debug!(
                caller_id = %caller.identity.caller_id,
                scope = ?caller.scope,
                "caller resolved"
            );
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
