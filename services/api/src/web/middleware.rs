//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

pub const USER_HEADER: &str = "x-user-id";
const USER_COOKIE: &str = "user_id=";

/// Middleware that resolves the caller's user id.
///
/// Reads the `x-user-id` header, falling back to a `user_id` cookie for browser
/// WebSocket upgrades (which cannot set custom headers). On success the id is
/// inserted into request extensions; otherwise the request is rejected with 401.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = user_id_from_headers(req.headers()).ok_or_else(|| {
        warn!("Rejecting request without a valid user id.");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

fn user_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    if let Some(value) = headers.get(USER_HEADER).and_then(|v| v.to_str().ok()) {
        return Uuid::parse_str(value.trim()).ok();
    }

    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix(USER_COOKIE))
        .and_then(|id| Uuid::parse_str(id).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_takes_precedence_over_cookie() {
        let from_header = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_str(&from_header.to_string()).unwrap());
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("user_id={}", Uuid::new_v4())).unwrap(),
        );
        assert_eq!(user_id_from_headers(&headers), Some(from_header));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; user_id={}; lang=fr", id)).unwrap(),
        );
        assert_eq!(user_id_from_headers(&headers), Some(id));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert_eq!(user_id_from_headers(&headers), None);
        assert_eq!(user_id_from_headers(&HeaderMap::new()), None);
    }
}
