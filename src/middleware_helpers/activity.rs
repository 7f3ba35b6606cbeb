//! Records successful mutating requests of back-office users.
//!
//! Runs inside the auth layer, so the caller is known. The repository is
//! looked up in the request extensions; without it the request passes
//! through unrecorded.

use axum::{
    extract::Request,
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::auth::AuthUser;
use crate::rate_limiter::client_ip;
use crate::repositories::user_activity_repository::NewActivity;
use crate::repositories::UserActivityRepository;

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub async fn activity_middleware(request: Request, next: Next) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    let caller = request.extensions().get::<AuthUser>().cloned();
    let repository = request
        .extensions()
        .get::<Arc<UserActivityRepository>>()
        .cloned();
    let (caller, repository) = match (caller, repository) {
        (Some(caller), Some(repository)) if !caller.is_customer() => (caller, repository),
        _ => return next.run(request).await,
    };

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let ip_address = client_ip(request.headers());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(255).collect::<String>());

    let response = next.run(request).await;

    let status = response.status();
    if status.is_success() {
        let entry = NewActivity {
            user_id: caller.user_id,
            action: NewActivity::action_for(&method, &path),
            method,
            path,
            status_code: status.as_u16(),
            ip_address,
            user_agent,
        };
        if let Err(e) = repository.record(entry).await {
            warn!(error = %e, user_id = %caller.user_id, "failed to record user activity");
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_writes_are_recorded() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::OPTIONS));
    }
}
