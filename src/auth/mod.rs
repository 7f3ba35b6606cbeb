/*!
 * # Authentication and Authorization
 *
 * JWT (HS256) access and refresh tokens for two guards:
 *
 * - `api` tokens are issued to back-office users and carry the union of the
 *   permissions granted by their roles.
 * - `customer` tokens are issued to shop customers and carry no permissions.
 *
 * Routes are protected through [`AuthRouterExt`]; the guard middleware reads
 * the shared [`AuthService`] from the request extensions.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{customer, permission, role, role_permission, user, user_role};

pub mod password;
pub mod permissions;

pub use permissions::{consts, ADMIN_ROLE};

/// Token audience context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Guard {
    Api,
    Customer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub guard: Guard,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub typ: TokenType,
    pub jti: String,
    pub iat: i64,
    /// Issue time in milliseconds, compared against revocation cut-offs
    #[serde(default)]
    pub iat_ms: Option<i64>,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Tokens issued without `iat_ms` fall back to the start of their second.
    pub fn issued_at_millis(&self) -> i64 {
        self.iat_ms.unwrap_or(self.iat * 1000)
    }
}

/// Authenticated caller extracted from a validated access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub guard: Guard,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
    pub expires_at: i64,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.guard == Guard::Api && self.has_role(ADMIN_ROLE)
    }

    pub fn is_customer(&self) -> bool {
        self.guard == Guard::Customer
    }

    fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(Self {
            user_id,
            name: claims.name,
            email: claims.email,
            guard: claims.guard,
            roles: claims.roles,
            permissions: claims.permissions,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
    pub revocation_cache_ttl: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration_secs),
            refresh_token_expiration: Duration::from_secs(cfg.refresh_token_expiration_secs),
            revocation_cache_ttl: Duration::from_secs(cfg.revocation_cache_ttl_secs),
        }
    }
}

/// Identity a token pair is issued for
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub guard: Guard,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Token pair response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// A user's revocation cut-off as last read from the database
#[derive(Clone, Copy, Debug)]
struct CachedCutoff {
    cutoff: Option<DateTime<Utc>>,
    loaded_at: Instant,
}

#[derive(Clone, Debug)]
struct BlacklistedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

/// Issues and validates tokens; tracks revoked tokens and per-user cut-offs.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DatabaseConnection>,
    blacklisted_tokens: Arc<RwLock<Vec<BlacklistedToken>>>,
    /// user id -> `tokens_revoked_at`, re-read once older than the TTL
    revocations: Arc<RwLock<HashMap<Uuid, CachedCutoff>>>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self {
            config,
            db,
            blacklisted_tokens: Arc::new(RwLock::new(Vec::new())),
            revocations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Back-office login. Inactive or deleted users are rejected.
    pub async fn login(&self, email: &str, password: &str) -> Result<(user::Model, TokenPair), AuthError> {
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify_password(password, &found.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !found.is_active || found.deleted_at.is_some() {
            return Err(AuthError::AccountDisabled);
        }

        let mut active: user::ActiveModel = found.into();
        active.last_login_at = Set(Some(Utc::now()));
        let found = active.update(&*self.db).await?;

        let tokens = self.issue_for_user(&found).await?;
        info!(user_id = %found.id, "user logged in");
        Ok((found, tokens))
    }

    /// Customer login; only customers with a password can sign in.
    pub async fn customer_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(customer::Model, TokenPair), AuthError> {
        let found = customer::Entity::find()
            .filter(customer::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = found
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !password::verify_password(password, hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !found.is_active || found.deleted_at.is_some() {
            return Err(AuthError::AccountDisabled);
        }

        let tokens = self.issue_for_customer(&found)?;
        info!(customer_id = %found.id, "customer logged in");
        Ok((found, tokens))
    }

    pub async fn issue_for_user(&self, user: &user::Model) -> Result<TokenPair, AuthError> {
        let (roles, permissions) = self.load_grants(user.id).await?;
        self.generate_token(&TokenSubject {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            guard: Guard::Api,
            roles,
            permissions,
        })
    }

    pub fn issue_for_customer(&self, customer: &customer::Model) -> Result<TokenPair, AuthError> {
        self.generate_token(&TokenSubject {
            id: customer.id,
            name: customer.full_name(),
            email: customer.email.clone(),
            guard: Guard::Customer,
            roles: vec![],
            permissions: vec![],
        })
    }

    /// Role names and the union of their permission names for a user.
    pub async fn load_grants(&self, user_id: Uuid) -> Result<(Vec<String>, Vec<String>), DbErr> {
        let role_ids: Vec<Uuid> = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|ur| ur.role_id)
            .collect();
        if role_ids.is_empty() {
            return Ok((vec![], vec![]));
        }

        let mut roles: Vec<String> = role::Entity::find()
            .filter(role::Column::Id.is_in(role_ids.clone()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        roles.sort();

        let permission_ids: Vec<Uuid> = role_permission::Entity::find()
            .filter(role_permission::Column::RoleId.is_in(role_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|rp| rp.permission_id)
            .collect();

        let mut permissions: Vec<String> = if permission_ids.is_empty() {
            vec![]
        } else {
            permission::Entity::find()
                .filter(permission::Column::Id.is_in(permission_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect()
        };
        permissions.sort();
        permissions.dedup();

        Ok((roles, permissions))
    }

    /// Signs an access/refresh pair for `subject`.
    pub fn generate_token(&self, subject: &TokenSubject) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let access_claims = Claims {
            sub: subject.id.to_string(),
            name: Some(subject.name.clone()),
            email: Some(subject.email.clone()),
            guard: subject.guard,
            roles: subject.roles.clone(),
            permissions: subject.permissions.clone(),
            typ: TokenType::Access,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            iat_ms: Some(now.timestamp_millis()),
            exp: access_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        // Refresh tokens carry identity only; grants are reloaded on refresh.
        let refresh_claims = Claims {
            name: None,
            email: None,
            roles: vec![],
            permissions: vec![],
            typ: TokenType::Refresh,
            jti: Uuid::new_v4().to_string(),
            exp: refresh_exp.timestamp(),
            ..access_claims.clone()
        };

        let key = EncodingKey::from_secret(self.config.jwt_secret.as_bytes());
        let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;
        let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    /// Decodes and checks signature, audience, issuer, expiry, blacklist and
    /// the per-user revocation cut-off.
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.validate_nbf = true;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_blacklisted(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        if claims.guard == Guard::Api {
            let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
            if let Some(cutoff) = self.revocation_cutoff(user_id).await? {
                if claims.issued_at_millis() <= cutoff.timestamp_millis() {
                    debug!(user_id = %user_id, "token issued before revocation cut-off");
                    return Err(AuthError::RevokedToken);
                }
            }
        }

        Ok(claims)
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token).await?;
        if claims.typ != TokenType::Access {
            return Err(AuthError::InvalidToken);
        }
        AuthUser::from_claims(claims)
    }

    /// Exchanges a refresh token for a new pair. The old refresh token is
    /// blacklisted.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_token(refresh_token).await?;
        if claims.typ != TokenType::Refresh {
            return Err(AuthError::InvalidToken);
        }
        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let pair = match claims.guard {
            Guard::Api => {
                let found = user::Entity::find_by_id(subject_id)
                    .one(&*self.db)
                    .await?
                    .ok_or(AuthError::InvalidToken)?;
                if !found.is_active || found.deleted_at.is_some() {
                    return Err(AuthError::AccountDisabled);
                }
                self.issue_for_user(&found).await?
            }
            Guard::Customer => {
                let found = customer::Entity::find_by_id(subject_id)
                    .one(&*self.db)
                    .await?
                    .ok_or(AuthError::InvalidToken)?;
                if !found.is_active || found.deleted_at.is_some() {
                    return Err(AuthError::AccountDisabled);
                }
                self.issue_for_customer(&found)?
            }
        };

        self.blacklist(claims.jti, claims.exp).await;
        Ok(pair)
    }

    /// Revokes a single token until it would have expired anyway.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.validate_token(token).await?;
        self.blacklist(claims.jti, claims.exp).await;
        Ok(())
    }

    /// Rejects every token of `user_id` issued at or before `at` in this
    /// process right away. Other processes pick the cut-off up from the
    /// `tokens_revoked_at` column once their cached entry expires.
    pub async fn revoke_user_tokens(&self, user_id: Uuid, at: DateTime<Utc>) {
        self.revocations.write().await.insert(
            user_id,
            CachedCutoff {
                cutoff: Some(at),
                loaded_at: Instant::now(),
            },
        );
        info!(user_id = %user_id, "revoked all tokens of user");
    }

    /// Cut-offs only move forward: a fresh read never undoes a revocation
    /// this process already applied.
    async fn revocation_cutoff(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, AuthError> {
        let previous = self.revocations.read().await.get(&user_id).copied();
        if let Some(cached) = previous {
            if cached.loaded_at.elapsed() < self.config.revocation_cache_ttl {
                return Ok(cached.cutoff);
            }
        }

        let stored = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .and_then(|u| u.tokens_revoked_at);
        let cutoff = stored.max(previous.and_then(|c| c.cutoff));
        self.revocations.write().await.insert(
            user_id,
            CachedCutoff {
                cutoff,
                loaded_at: Instant::now(),
            },
        );
        Ok(cutoff)
    }

    async fn blacklist(&self, jti: String, exp: i64) {
        let expiry = Utc
            .timestamp_opt(exp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let mut blacklist = self.blacklisted_tokens.write().await;
        blacklist.push(BlacklistedToken { jti, expiry });
        let now = Utc::now();
        blacklist.retain(|t| t.expiry > now);
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> bool {
        let blacklist = self.blacklisted_tokens.read().await;
        blacklist.iter().any(|t| t.jti == token_id)
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            Self::MissingAuth => ("AUTH_MISSING", "Authentication required".to_string()),
            Self::InvalidCredentials => {
                ("AUTH_INVALID_CREDENTIALS", "Invalid credentials".to_string())
            }
            Self::AccountDisabled => ("AUTH_ACCOUNT_DISABLED", "Account is disabled".to_string()),
            Self::InvalidToken => (
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => ("AUTH_TOKEN_EXPIRED", "Token has expired".to_string()),
            Self::RevokedToken => (
                "AUTH_REVOKED_TOKEN",
                "Authentication token has been revoked".to_string(),
            ),
            Self::InsufficientPermissions => (
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                warn!(error = %self, "authentication failure");
                ("AUTH_INTERNAL_ERROR", "Internal server error".to_string())
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn auth_service_from(request: &Request) -> Result<Arc<AuthService>, AuthError> {
    request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| AuthError::InternalError("Authentication service not available".into()))
}

/// Rejects requests without a valid access token.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match auth_service_from(&request) {
        Ok(service) => service,
        Err(e) => return e.into_response(),
    };

    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return AuthError::MissingAuth.into_response();
    };

    match auth_service.authenticate(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Attaches the caller when a bearer token is present; anonymous requests
/// pass through. An invalid token is still rejected.
pub async fn optional_auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return next.run(request).await;
    };
    let auth_service = match auth_service_from(&request) {
        Ok(service) => service,
        Err(e) => return e.into_response(),
    };

    match auth_service.authenticate(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Permission check. Admins pass; customer tokens never do.
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if user.is_customer() {
        return Err(AuthError::InsufficientPermissions);
    }
    if user.is_admin() || user.has_permission(&required_permission) {
        return Ok(next.run(request).await);
    }

    debug!(user_id = %user.user_id, permission = %required_permission, "permission denied");
    Err(AuthError::InsufficientPermissions)
}

/// Guard check: only tokens issued for `guard` pass.
pub async fn guard_middleware(
    State(required_guard): State<Guard>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;
    if user.guard != required_guard {
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_optional_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
    fn with_guard(self, guard: Guard) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_optional_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(optional_auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn(
            crate::middleware_helpers::activity::activity_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }

    fn with_guard(self, guard: Guard) -> Self {
        self.layer(axum::middleware::from_fn_with_state(guard, guard_middleware))
            .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::Expr;
    use crate::db::{establish_connection, DbConfig};

    async fn service() -> AuthService {
        let db = establish_connection(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        AuthService::new(
            AuthConfig {
                jwt_secret: "unit-test-secret-0123456789abcdefghijklmnop".into(),
                jwt_audience: "commerce-admin-api".into(),
                jwt_issuer: "commerce-admin-auth".into(),
                access_token_expiration: Duration::from_secs(600),
                refresh_token_expiration: Duration::from_secs(3600),
                revocation_cache_ttl: Duration::ZERO,
            },
            Arc::new(db),
        )
    }

    fn subject(guard: Guard) -> TokenSubject {
        TokenSubject {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            guard,
            roles: vec!["manager".into()],
            permissions: vec!["orders:read".into()],
        }
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let svc = service().await;
        let subject = subject(Guard::Api);
        let pair = svc.generate_token(&subject).unwrap();

        let user = svc.authenticate(&pair.access_token).await.unwrap();
        assert_eq!(user.user_id, subject.id);
        assert!(user.has_permission("orders:read"));
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let svc = service().await;
        let pair = svc.generate_token(&subject(Guard::Customer)).unwrap();
        assert!(matches!(
            svc.authenticate(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected() {
        let svc = service().await;
        let mut other = svc.clone();
        other.config.jwt_audience = "someone-else".into();
        let pair = other.generate_token(&subject(Guard::Customer)).unwrap();
        assert!(matches!(
            svc.authenticate(&pair.access_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() {
        let svc = service().await;
        let pair = svc.generate_token(&subject(Guard::Customer)).unwrap();
        svc.revoke_token(&pair.access_token).await.unwrap();
        assert!(matches!(
            svc.authenticate(&pair.access_token).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn user_cutoff_rejects_older_tokens() {
        let svc = service().await;
        let subject = subject(Guard::Api);
        let pair = svc.generate_token(&subject).unwrap();
        assert!(svc.authenticate(&pair.access_token).await.is_ok());

        svc.revoke_user_tokens(subject.id, Utc::now()).await;
        assert!(matches!(
            svc.authenticate(&pair.access_token).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn cutoff_written_by_another_process_is_picked_up() {
        let svc = service().await;
        let now = Utc::now();
        let staff = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Grace".into()),
            email: Set("grace@example.com".into()),
            password_hash: Set("unused".into()),
            is_active: Set(true),
            last_login_at: Set(None),
            tokens_revoked_at: Set(None),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*svc.db)
        .await
        .unwrap();

        let pair = svc
            .generate_token(&TokenSubject {
                id: staff.id,
                ..subject(Guard::Api)
            })
            .unwrap();
        assert!(svc.authenticate(&pair.access_token).await.is_ok());

        // A separate service over the same database plays the CLI process.
        let other = AuthService::new(svc.config.clone(), svc.db.clone());
        let revoked_at = Utc::now();
        user::Entity::update_many()
            .col_expr(user::Column::TokensRevokedAt, Expr::value(revoked_at))
            .filter(user::Column::Id.eq(staff.id))
            .exec(&*other.db)
            .await
            .unwrap();
        other.revoke_user_tokens(staff.id, revoked_at).await;

        assert!(matches!(
            svc.authenticate(&pair.access_token).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn tokens_issued_after_the_cutoff_in_the_same_second_pass() {
        let svc = service().await;
        let subject = subject(Guard::Api);
        svc.revoke_user_tokens(subject.id, Utc::now()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let pair = svc.generate_token(&subject).unwrap();
        assert!(svc.authenticate(&pair.access_token).await.is_ok());
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            AuthError::InsufficientPermissions.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
    }
}
