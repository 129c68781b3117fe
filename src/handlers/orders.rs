use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{roles, AuthUser};
use crate::errors::ServiceError;
use crate::handlers::common::validate_request;
use crate::services::orders::{NewOrderItem, OrderScope};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

// Unknown members, such as an optional client-supplied `date`, are
// accepted and ignored.
#[derive(Debug, Deserialize, Validate)]
pub struct OrderItemRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInStoreOrderRequest {
    pub store_id: Uuid,
    #[validate]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOnlineOrderRequest {
    #[validate]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    /// "online", or the id of a store. Required.
    pub store: Option<String>,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn require_role(user: &AuthUser, role: &str) -> Result<(), ServiceError> {
    if user.has_role(role) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Access denied".into()))
    }
}

fn to_new_items(items: Vec<OrderItemRequest>) -> Vec<NewOrderItem> {
    items
        .into_iter()
        .map(|item| NewOrderItem {
            sku: item.sku,
            quantity: item.quantity,
            price: item.price,
        })
        .collect()
}

fn parse_store_scope(raw: Option<&str>) -> Result<OrderScope, ServiceError> {
    match raw {
        None => Err(ServiceError::BadRequest(
            "store query parameter is required".into(),
        )),
        Some("online") => Ok(OrderScope::Online),
        Some(value) => Uuid::parse_str(value).map(OrderScope::Store).map_err(|_| {
            ServiceError::BadRequest("store must be 'online' or a store id".into())
        }),
    }
}

/// POST /admin/orders. Admins record a sale for any store; no store
/// assignment applies.
pub async fn admin_create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateInStoreOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::ADMIN)?;
    validate_request(&request)?;

    let order = state
        .services
        .orders
        .create_in_store_order(None, request.store_id, to_new_items(request.items))
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// GET /admin/orders?store=online|<store-id>
pub async fn admin_list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<AdminListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::ADMIN)?;
    let scope = parse_store_scope(query.store.as_deref())?;

    let page = state
        .services
        .orders
        .list_orders(scope, query.limit, query.offset)
        .await?;

    Ok(Json(PaginatedResponse {
        total: page.total,
        limit: query.limit,
        offset: query.offset,
        data: page.orders,
    }))
}

/// GET /admin/orders/:id
pub async fn admin_get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::ADMIN)?;
    let order = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /cashier/orders. The cashier must be assigned to the store.
pub async fn cashier_create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateInStoreOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::CASHIER)?;
    validate_request(&request)?;

    let order = state
        .services
        .orders
        .create_in_store_order(
            Some(user.user_id),
            request.store_id,
            to_new_items(request.items),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// GET /cashier/orders. In-store orders across the cashier's stores.
pub async fn cashier_list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::CASHIER)?;

    let page = state
        .services
        .orders
        .list_orders_for_cashier(user.user_id, query.limit, query.offset)
        .await?;

    Ok(Json(PaginatedResponse {
        total: page.total,
        limit: query.limit,
        offset: query.offset,
        data: page.orders,
    }))
}

/// GET /cashier/orders/:order_id/store/:store_id
pub async fn cashier_get_order_for_store(
    State(state): State<AppState>,
    user: AuthUser,
    Path((order_id, store_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::CASHIER)?;
    let order = state
        .services
        .orders
        .get_order_for_store(user.user_id, order_id, store_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /customer/orders. Creates the order and a hosted checkout
/// session; the response carries the checkout URL.
pub async fn customer_create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOnlineOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::CUSTOMER)?;
    validate_request(&request)?;

    let order = state
        .services
        .orders
        .create_online_order(user.user_id, to_new_items(request.items))
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// GET /customer/orders. The caller's own online orders.
pub async fn customer_list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::CUSTOMER)?;

    let page = state
        .services
        .orders
        .list_orders_for_customer(user.user_id, query.limit, query.offset)
        .await?;

    Ok(Json(PaginatedResponse {
        total: page.total,
        limit: query.limit,
        offset: query.offset,
        data: page.orders,
    }))
}

/// GET /customer/orders/:id. Only the caller's own orders resolve.
pub async fn customer_get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    require_role(&user, roles::CUSTOMER)?;
    let order = state
        .services
        .orders
        .get_order_for_customer(user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// PUT /customer/orders/:order_id. Payment gateway callback. The
/// gateway holds no user token, so this endpoint is unauthenticated.
pub async fn complete_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.mark_completed(order_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        order,
        "Order completed",
    )))
}

/// GET /customer/orders/:sku/item. Public lookup of the latest order
/// for a SKU, gated on cleared payment.
pub async fn lookup_order_by_sku(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.find_by_item_sku(&sku).await?;
    Ok(Json(ApiResponse::success(order)))
}
