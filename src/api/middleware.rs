//! API Middleware
//!
//! Operation context extraction and request logging.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;

pub const REQUEST_USER_HEADER: &str = "x-request-user-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =========================================================================
// Operation context
// =========================================================================

/// Build an [`OperationContext`] from request headers.
///
/// The correlation id is taken from `X-Correlation-Id`, then `X-Request-Id`,
/// and generated otherwise. Malformed user or idempotency headers are
/// rejected rather than ignored.
pub fn context_from_headers(headers: &HeaderMap) -> Result<OperationContext, AppError> {
    let mut context = OperationContext::new();

    let correlation_id = [CORRELATION_ID_HEADER, REQUEST_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .find_map(|s| Uuid::parse_str(s).ok());
    if let Some(id) = correlation_id {
        context = context.with_correlation_id(id);
    }
    context.ensure_correlation_id();

    if let Some(value) = headers.get(REQUEST_USER_HEADER) {
        let user = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                AppError::InvalidRequest("X-Request-User-Id must be an integer id".to_string())
            })?;
        context = context.with_request_user(user);
    }

    if let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| AppError::InvalidRequest("Idempotency-Key must be a UUID".to_string()))?;
        context = context.with_idempotency_key(key);
    }

    Ok(context)
}

/// Insert the operation context into request extensions
pub async fn context_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let context = context_from_headers(request.headers())?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

// =========================================================================
// Request logging
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let (correlation_id, request_user) = request
        .extensions()
        .get::<OperationContext>()
        .map(|ctx| (ctx.correlation_id, ctx.request_user))
        .unwrap_or_default();

    let start = std::time::Instant::now();

    tracing::debug!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        request_user = ?request_user,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_headers() {
        let key = Uuid::new_v4();
        let request_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_USER_HEADER, "42".parse().unwrap());
        headers.insert(IDEMPOTENCY_KEY_HEADER, key.to_string().parse().unwrap());
        headers.insert(REQUEST_ID_HEADER, request_id.to_string().parse().unwrap());

        let context = context_from_headers(&headers).unwrap();
        assert_eq!(context.request_user, Some(42));
        assert_eq!(context.idempotency_key, Some(key));
        assert_eq!(context.correlation_id, Some(request_id));
    }

    #[test]
    fn test_correlation_id_generated_when_absent() {
        let context = context_from_headers(&HeaderMap::new()).unwrap();
        assert!(context.correlation_id.is_some());
        assert!(context.request_user.is_none());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_USER_HEADER, "alice".parse().unwrap());
        assert!(matches!(
            context_from_headers(&headers),
            Err(AppError::InvalidRequest(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, "not-a-uuid".parse().unwrap());
        assert!(context_from_headers(&headers).is_err());
    }
}
