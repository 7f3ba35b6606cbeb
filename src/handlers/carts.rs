//! Shopping carts for customers (customer token) and guests
//! (`X-Cart-Session` header).

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::cart_session;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    repositories::cart_repository::{
        AddCartItem, ApplyCoupon, CartOwner, CartView, CheckoutCart, UpdateCartItem,
    },
    ApiResponse, ApiResult, AppState,
};

fn owner(auth_user: Option<&AuthUser>, headers: &HeaderMap) -> Result<CartOwner, ServiceError> {
    match auth_user {
        Some(user) if user.is_customer() => Ok(CartOwner::Customer(user.user_id)),
        _ => cart_session(headers).map(CartOwner::Guest).ok_or_else(|| {
            ServiceError::BadRequest(
                "A customer token or the X-Cart-Session header is required".to_string(),
            )
        }),
    }
}

fn customer_id(auth_user: Option<&AuthUser>) -> Result<Uuid, ServiceError> {
    match auth_user {
        Some(user) if user.is_customer() => Ok(user.user_id),
        _ => Err(ServiceError::Unauthorized(
            "A customer token is required".to_string(),
        )),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Current cart",
    description = "Created on first access",
    params(("X-Cart-Session" = Option<String>, Header, description = "Guest cart session")),
    responses(
        (status = 200, description = "Cart with its lines"),
        (status = 400, description = "Neither customer token nor session header", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
    ),
    tag = "carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.current(&owner).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add a product to the cart",
    params(("X-Cart-Session" = Option<String>, Header, description = "Guest cart session")),
    request_body = AddCartItem,
    responses(
        (status = 200, description = "Updated cart"),
        (status = 400, description = "Product not sellable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
    ),
    tag = "carts"
)]
pub async fn add_item(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
    Json(payload): Json<AddCartItem>,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.add_item(&owner, payload).await?,
    )))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{item_id}",
    summary = "Change a line's quantity",
    description = "A quantity of 0 removes the line",
    params(
        ("item_id" = Uuid, Path, description = "Cart item ID"),
        ("X-Cart-Session" = Option<String>, Header, description = "Guest cart session"),
    ),
    request_body = UpdateCartItem,
    responses(
        (status = 200, description = "Updated cart"),
        (status = 404, description = "Line not in this cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
    ),
    tag = "carts"
)]
pub async fn update_item(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItem>,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state
            .repos
            .carts
            .update_item(&owner, item_id, payload)
            .await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{item_id}",
    summary = "Remove a line",
    params(
        ("item_id" = Uuid, Path, description = "Cart item ID"),
        ("X-Cart-Session" = Option<String>, Header, description = "Guest cart session"),
    ),
    responses(
        (status = 200, description = "Updated cart"),
        (status = 404, description = "Line not in this cart", body = crate::errors::ErrorResponse),
    ),
    tag = "carts"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.remove_item(&owner, item_id).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    summary = "Empty the cart",
    params(("X-Cart-Session" = Option<String>, Header, description = "Guest cart session")),
    responses(
        (status = 200, description = "Emptied cart"),
        (status = 404, description = "No open cart", body = crate::errors::ErrorResponse),
    ),
    tag = "carts"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.clear(&owner).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/coupon",
    summary = "Apply a coupon",
    params(("X-Cart-Session" = Option<String>, Header, description = "Guest cart session")),
    request_body = ApplyCoupon,
    responses(
        (status = 200, description = "Cart with the discount applied"),
        (status = 400, description = "Coupon unusable for this cart", body = crate::errors::ErrorResponse),
    ),
    tag = "carts"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
    Json(payload): Json<ApplyCoupon>,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.apply_coupon(&owner, payload).await?,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/coupon",
    summary = "Remove the coupon",
    params(("X-Cart-Session" = Option<String>, Header, description = "Guest cart session")),
    responses((status = 200, description = "Cart without discount")),
    tag = "carts"
)]
pub async fn remove_coupon(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let owner = owner(auth_user.as_ref(), &headers)?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.remove_coupon(&owner).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/merge",
    summary = "Merge the guest cart into the customer's cart",
    params(("X-Cart-Session" = String, Header, description = "Guest cart session")),
    responses(
        (status = 200, description = "Customer cart after the merge"),
        (status = 400, description = "Missing session header", body = crate::errors::ErrorResponse),
        (status = 401, description = "Customer token required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "carts"
)]
pub async fn merge_cart(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    headers: HeaderMap,
) -> ApiResult<CartView> {
    let customer_id = customer_id(auth_user.as_ref())?;
    let session = cart_session(&headers).ok_or_else(|| {
        ServiceError::BadRequest("The X-Cart-Session header is required".to_string())
    })?;
    Ok(Json(ApiResponse::success(
        state.repos.carts.merge(customer_id, &session).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/checkout",
    summary = "Turn the cart into an order",
    request_body = CheckoutCart,
    responses(
        (status = 201, description = "Order created"),
        (status = 400, description = "Cart empty or product unsellable", body = crate::errors::ErrorResponse),
        (status = 401, description = "Customer token required", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "carts"
)]
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: Option<AuthUser>,
    payload: Option<Json<CheckoutCart>>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer_id = customer_id(auth_user.as_ref())?;
    let input = payload.map(|Json(p)| p).unwrap_or_default();
    let order = state.repos.carts.checkout(customer_id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Guard;
    use axum::http::HeaderValue;

    fn caller(guard: Guard) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            name: None,
            email: None,
            guard,
            roles: vec![],
            permissions: vec![],
            token_id: "t".into(),
            expires_at: 0,
        }
    }

    #[test]
    fn customers_own_their_cart_and_guests_need_a_session() {
        let customer = caller(Guard::Customer);
        let headers = HeaderMap::new();
        assert_eq!(
            owner(Some(&customer), &headers).unwrap(),
            CartOwner::Customer(customer.user_id)
        );
        assert!(owner(None, &headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-cart-session", HeaderValue::from_static("abc"));
        assert_eq!(
            owner(Some(&caller(Guard::Api)), &headers).unwrap(),
            CartOwner::Guest("abc".into())
        );
    }

    #[test]
    fn merge_and_checkout_need_a_customer() {
        assert!(customer_id(None).is_err());
        assert!(customer_id(Some(&caller(Guard::Api))).is_err());
        assert!(customer_id(Some(&caller(Guard::Customer))).is_ok());
    }
}
