use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::errors::ServiceError;
use crate::repositories::Pagination;
use crate::ApiResponse;

/// Guest carts are identified by this header.
pub const CART_SESSION_HEADER: &str = "x-cart-session";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Pagination parameters for list operations
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number (default: 1)
    pub page: Option<u64>,
    /// Items per page (default: 20, max: 100)
    pub limit: Option<u64>,
}

impl From<PageQuery> for Pagination {
    fn from(query: PageQuery) -> Self {
        Pagination::new(query.page, query.limit)
    }
}

/// Value of `X-Cart-Session`, if present and non-empty.
pub fn cart_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 255)
        .map(str::to_string)
}

/// Parses an optional boolean query flag (`true`/`false`/`1`/`0`).
pub fn parse_flag(name: &str, raw: Option<&str>) -> Result<Option<bool>, ServiceError> {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v == "true" || v == "1" => Ok(Some(true)),
        Some(v) if v == "false" || v == "0" => Ok(Some(false)),
        Some(_) => Err(ServiceError::ValidationError(format!(
            "{}: expected a boolean",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn page_query_is_clamped() {
        let p: Pagination = PageQuery {
            page: Some(0),
            limit: Some(500),
        }
        .into();
        assert_eq!(p, Pagination { page: 1, limit: 100 });
    }

    #[test]
    fn cart_session_requires_a_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(cart_session(&headers), None);
        headers.insert(CART_SESSION_HEADER, HeaderValue::from_static("  "));
        assert_eq!(cart_session(&headers), None);
        headers.insert(CART_SESSION_HEADER, HeaderValue::from_static("guest-1"));
        assert_eq!(cart_session(&headers).as_deref(), Some("guest-1"));
    }

    #[test]
    fn flags_parse_loosely() {
        assert_eq!(parse_flag("x", Some("TRUE")).unwrap(), Some(true));
        assert_eq!(parse_flag("x", Some("0")).unwrap(), Some(false));
        assert_eq!(parse_flag("x", None).unwrap(), None);
        assert!(parse_flag("x", Some("maybe")).is_err());
    }
}
