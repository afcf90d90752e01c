//! Request context middleware.
//!
//! Reads the acting user and company from headers and injects a
//! [`RequestContext`] into request extensions. Missing headers stay `None`.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use millwork_core::RequestContext;

use crate::ApiError;

/// Numeric id of the acting user.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Numeric id of the company the request acts for.
pub const COMPANY_HEADER: &str = "x-company-id";

pub async fn request_context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let ctx = match context_from_headers(req.headers()) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

pub fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    Ok(RequestContext::new(
        header_id(headers, ACTOR_HEADER)?,
        header_id(headers, COMPANY_HEADER)?,
    ))
}

fn header_id(headers: &HeaderMap, name: &str) -> Result<Option<i64>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .map(str::trim)
        .and_then(|v| v.parse::<i64>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {name} header value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_missing_headers_are_none() {
        let ctx = context_from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(ctx, RequestContext::default());
    }

    #[test]
    fn test_headers_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("12"));
        headers.insert(COMPANY_HEADER, HeaderValue::from_static(" 3 "));
        let ctx = context_from_headers(&headers).unwrap();
        assert_eq!(ctx.actor_id, Some(12));
        assert_eq!(ctx.company_id, Some(3));
    }

    #[test]
    fn test_non_numeric_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("admin"));
        assert!(matches!(
            context_from_headers(&headers),
            Err(ApiError::BadRequest(_))
        ));
    }
}
