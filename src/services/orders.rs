use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{OrderChannel, OrderStatus};
use crate::entities::{
    in_store_order_detail, online_order_detail, order, order_item, product, product_image, store,
    store_user, user,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::payments::{CheckoutRequest, PaymentGateway};
use crate::services::stock::stock_for_product;

/// One requested line of a new order. Prices arrive with the request and
/// are recorded as quoted; they are not re-derived from the catalog.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub sku: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Which orders a listing should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    Online,
    Store(Uuid),
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    /// Image file names of the product, in no particular order.
    pub images: Vec<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StoreDetailResponse {
    pub store_id: Uuid,
    pub cashier_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetailResponse {
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub number: String,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreDetailResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerDetailResponse>,
    /// Hosted checkout URL, present only on online order creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub number: String,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct OrderPage {
    pub total: u64,
    pub orders: Vec<OrderSummary>,
}

/// Increments a zero-padded order number, preserving the input width.
/// `"00042"` becomes `"00043"`; `"099"` becomes `"100"`; a carry past the
/// width grows the string (`"999"` becomes `"1000"`).
pub fn increment_order_number(prev: &str) -> Result<String, ServiceError> {
    let n: u64 = prev.trim().parse().map_err(|_| {
        ServiceError::InternalError(format!("order number '{}' is not numeric", prev))
    })?;
    Ok(format!("{:0width$}", n + 1, width = prev.len()))
}

/// Order total over the requested lines, exact decimal arithmetic.
pub fn calculate_total(items: &[NewOrderItem]) -> Decimal {
    items
        .iter()
        .map(|item| Decimal::from(item.quantity) * item.price)
        .sum()
}

pub struct OrderService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Allocates the next order number inside the caller's transaction.
    /// The unique index on the number column turns a concurrent
    /// double-allocation into a failed insert instead of a duplicate.
    async fn next_order_number<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
        let last = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Number)
            .one(conn)
            .await?;

        match last {
            Some(existing) => increment_order_number(&existing.number),
            None => increment_order_number("00000"),
        }
    }

    /// Validates a requested line against the catalog and stock, then
    /// inserts it. Check order matters: unknown SKU first, then product
    /// state, then stock, then quantity.
    async fn insert_line_item<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        channel: OrderChannel,
        item: &NewOrderItem,
    ) -> Result<(), ServiceError> {
        let product = product::Entity::find()
            .filter(product::Column::Sku.eq(item.sku.as_str()))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product with SKU {}", item.sku)))?;

        if !product.status {
            return Err(ServiceError::InvalidOperation(format!(
                "Sorry, you cannot order item SKU: {}",
                item.sku
            )));
        }

        if channel == OrderChannel::Online && !product.visibility {
            return Err(ServiceError::InvalidOperation(format!(
                "Sorry, you cannot order item SKU: {}",
                item.sku
            )));
        }

        let stock = stock_for_product(conn, product.id).await?;
        if stock.remaining() < i64::from(item.quantity) {
            return Err(ServiceError::InvalidOperation(format!(
                "Sorry, insufficient stock for the requested quantity of item SKU: {}",
                item.sku
            )));
        }

        if item.quantity < 1 {
            return Err(ServiceError::InvalidOperation(format!(
                "The minimum order quantity for item SKU: {} is 1",
                item.sku
            )));
        }

        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            quantity: Set(item.quantity),
            price: Set(item.price),
            total: Set(Decimal::from(item.quantity) * item.price),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok(())
    }

    async fn insert_order_header<C: ConnectionTrait>(
        conn: &C,
        channel: OrderChannel,
        number: String,
        total: Decimal,
    ) -> Result<order::Model, ServiceError> {
        let model = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            number: Set(number),
            channel: Set(channel),
            status: Set(OrderStatus::Pending),
            total: Set(total),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        Ok(model)
    }

    /// Creates a POS order against a store. When `cashier_id` is set the
    /// cashier must be assigned to the store; admins pass `None` and may
    /// record a sale for any store.
    #[instrument(skip(self, items), fields(store_id = %store_id, item_count = items.len()))]
    pub async fn create_in_store_order(
        &self,
        cashier_id: Option<Uuid>,
        store_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> Result<OrderResponse, ServiceError> {
        let total = calculate_total(&items);

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("Please add items".into()));
        }

        store::Entity::find_by_id(store_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Store".into()))?;

        if let Some(cashier) = cashier_id {
            user::Entity::find_by_id(cashier)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("User".into()))?;

            let assigned = store_user::Entity::find()
                .filter(store_user::Column::StoreId.eq(store_id))
                .filter(store_user::Column::UserId.eq(cashier))
                .one(&txn)
                .await?;
            if assigned.is_none() {
                return Err(ServiceError::Forbidden(
                    "You are not assigned to this store".into(),
                ));
            }
        }

        let number = Self::next_order_number(&txn).await?;
        let header = Self::insert_order_header(&txn, OrderChannel::InStore, number, total).await?;

        for item in &items {
            Self::insert_line_item(&txn, header.id, OrderChannel::InStore, item).await?;
        }

        in_store_order_detail::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(header.id),
            cashier_id: Set(cashier_id),
            store_id: Set(store_id),
        }
        .insert(&txn)
        .await?;

        let response = Self::load_order_response(&txn, header, None).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit order transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %response.id, number = %response.number, "in-store order created");
        self.emit(Event::OrderCreated {
            order_id: response.id,
            channel: OrderChannel::InStore.as_str().to_string(),
        })
        .await;

        Ok(response)
    }

    /// Creates an online order and opens a hosted checkout session. The
    /// gateway call happens inside the transaction; any failure rolls the
    /// whole order back, so an order without a checkout session never
    /// persists.
    #[instrument(skip(self, items), fields(customer_id = %customer_id, item_count = items.len()))]
    pub async fn create_online_order(
        &self,
        customer_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> Result<OrderResponse, ServiceError> {
        let total = calculate_total(&items);

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("Please add items".into()));
        }

        let customer = user::Entity::find_by_id(customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".into()))?;

        let number = Self::next_order_number(&txn).await?;
        let header = Self::insert_order_header(&txn, OrderChannel::Online, number, total).await?;

        for item in &items {
            Self::insert_line_item(&txn, header.id, OrderChannel::Online, item).await?;
        }

        online_order_detail::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(header.id),
            customer_id: Set(Some(customer_id)),
        }
        .insert(&txn)
        .await?;

        let session = self
            .gateway
            .create_checkout(CheckoutRequest {
                amount: total,
                tx_ref: header.id.to_string(),
                first_name: customer.first_name.clone(),
                last_name: customer.last_name.clone(),
                email: customer.email.clone(),
                title: "Order payment".into(),
                description: format!("Payment for order {}", header.number),
            })
            .await?;

        let response =
            Self::load_order_response(&txn, header, Some(session.checkout_url)).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit order transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %response.id, number = %response.number, "online order created");
        self.emit(Event::OrderCreated {
            order_id: response.id,
            channel: OrderChannel::Online.as_str().to_string(),
        })
        .await;

        Ok(response)
    }

    /// Payment callback target. Marks the order completed; unknown ids
    /// are 404. Idempotent for already-completed orders.
    #[instrument(skip(self))]
    pub async fn mark_completed(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let existing = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".into()))?;

        let old_status = existing.status;
        let updated = if existing.status == OrderStatus::Completed {
            existing
        } else {
            let mut active: order::ActiveModel = existing.into();
            active.status = Set(OrderStatus::Completed);
            active.update(&*self.db).await?
        };

        let response = Self::load_order_response(&*self.db, updated, None).await?;

        if old_status != OrderStatus::Completed {
            info!(order_id = %response.id, "order marked completed");
            self.emit(Event::OrderStatusChanged {
                order_id: response.id,
                old_status: old_status.as_str().to_string(),
                new_status: OrderStatus::Completed.as_str().to_string(),
            })
            .await;
            self.emit(Event::OrderCompleted(response.id)).await;
        }

        Ok(response)
    }

    /// Public post-payment lookup: the most recent order containing the
    /// given SKU, released only once payment has cleared.
    #[instrument(skip(self))]
    pub async fn find_by_item_sku(&self, sku: &str) -> Result<OrderResponse, ServiceError> {
        let product = product::Entity::find()
            .filter(product::Column::Sku.eq(sku))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product with SKU {}", sku)))?;

        let found = order::Entity::find()
            .join(JoinType::InnerJoin, order::Relation::OrderItems.def())
            .filter(order_item::Column::ProductId.eq(product.id))
            .order_by_desc(order::Column::CreatedAt)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".into()))?;

        if found.status != OrderStatus::Completed {
            return Err(ServiceError::Forbidden("Payment not clear".into()));
        }

        Self::load_order_response(&*self.db, found, None).await
    }

    /// Admin fetch of any order.
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".into()))?;
        Self::load_order_response(&*self.db, found, None).await
    }

    /// Customer fetch, restricted to the caller's own orders. Orders
    /// belonging to someone else are indistinguishable from missing ones.
    pub async fn get_order_for_customer(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .join(JoinType::InnerJoin, order::Relation::OnlineDetail.def())
            .filter(online_order_detail::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".into()))?;
        Self::load_order_response(&*self.db, found, None).await
    }

    /// Cashier fetch of a single order, scoped to one of their stores.
    pub async fn get_order_for_store(
        &self,
        cashier_id: Uuid,
        order_id: Uuid,
        store_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let assigned = store_user::Entity::find()
            .filter(store_user::Column::StoreId.eq(store_id))
            .filter(store_user::Column::UserId.eq(cashier_id))
            .one(&*self.db)
            .await?;
        if assigned.is_none() {
            return Err(ServiceError::Forbidden(
                "You are not assigned to this store".into(),
            ));
        }

        let found = order::Entity::find_by_id(order_id)
            .join(JoinType::InnerJoin, order::Relation::InStoreDetail.def())
            .filter(in_store_order_detail::Column::StoreId.eq(store_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".into()))?;
        Self::load_order_response(&*self.db, found, None).await
    }

    /// Admin listing, scoped to the online channel or one store.
    pub async fn list_orders(
        &self,
        scope: OrderScope,
        limit: u64,
        offset: u64,
    ) -> Result<OrderPage, ServiceError> {
        let query = match scope {
            OrderScope::Online => order::Entity::find()
                .filter(order::Column::Channel.eq(OrderChannel::Online)),
            OrderScope::Store(store_id) => order::Entity::find()
                .join(JoinType::InnerJoin, order::Relation::InStoreDetail.def())
                .filter(in_store_order_detail::Column::StoreId.eq(store_id)),
        };

        Self::paginate(&*self.db, query, limit, offset).await
    }

    /// A customer's own online orders.
    pub async fn list_orders_for_customer(
        &self,
        customer_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<OrderPage, ServiceError> {
        let query = order::Entity::find()
            .join(JoinType::InnerJoin, order::Relation::OnlineDetail.def())
            .filter(online_order_detail::Column::CustomerId.eq(customer_id));

        Self::paginate(&*self.db, query, limit, offset).await
    }

    /// In-store orders across every store the cashier is assigned to.
    pub async fn list_orders_for_cashier(
        &self,
        cashier_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<OrderPage, ServiceError> {
        let store_ids: Vec<Uuid> = store_user::Entity::find()
            .filter(store_user::Column::UserId.eq(cashier_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|assignment| assignment.store_id)
            .collect();

        if store_ids.is_empty() {
            return Ok(OrderPage {
                total: 0,
                orders: Vec::new(),
            });
        }

        let query = order::Entity::find()
            .join(JoinType::InnerJoin, order::Relation::InStoreDetail.def())
            .filter(in_store_order_detail::Column::StoreId.is_in(store_ids));

        Self::paginate(&*self.db, query, limit, offset).await
    }

    async fn paginate<C: ConnectionTrait>(
        conn: &C,
        query: sea_orm::Select<order::Entity>,
        limit: u64,
        offset: u64,
    ) -> Result<OrderPage, ServiceError> {
        let total = query.clone().count(conn).await?;

        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(conn)
            .await?
            .into_iter()
            .map(|model| OrderSummary {
                id: model.id,
                number: model.number,
                channel: model.channel,
                status: model.status,
                total: model.total,
                created_at: model.created_at,
            })
            .collect();

        Ok(OrderPage { total, orders })
    }

    /// Assembles the full response for one order: lines with product
    /// identity, plus whichever channel detail exists.
    async fn load_order_response<C: ConnectionTrait>(
        conn: &C,
        header: order::Model,
        checkout_url: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let lines = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(header.id))
            .find_also_related(product::Entity)
            .all(conn)
            .await?;

        let product_ids: Vec<Uuid> = lines
            .iter()
            .filter_map(|(_, prod)| prod.as_ref().map(|p| p.id))
            .collect();

        let mut images_by_product: HashMap<Uuid, Vec<String>> = HashMap::new();
        if !product_ids.is_empty() {
            let images = product_image::Entity::find()
                .filter(product_image::Column::ProductId.is_in(product_ids))
                .all(conn)
                .await?;
            for image in images {
                images_by_product
                    .entry(image.product_id)
                    .or_default()
                    .push(image.name);
            }
        }

        let items = lines
            .into_iter()
            .map(|(line, prod)| {
                let prod = prod.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "order item {} references a missing product",
                        line.id
                    ))
                })?;
                Ok(OrderItemResponse {
                    id: line.id,
                    product_id: prod.id,
                    images: images_by_product.get(&prod.id).cloned().unwrap_or_default(),
                    sku: prod.sku,
                    name: prod.name,
                    quantity: line.quantity,
                    price: line.price,
                    total: line.total,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let store = match header.channel {
            OrderChannel::InStore => in_store_order_detail::Entity::find()
                .filter(in_store_order_detail::Column::OrderId.eq(header.id))
                .one(conn)
                .await?
                .map(|detail| StoreDetailResponse {
                    store_id: detail.store_id,
                    cashier_id: detail.cashier_id,
                }),
            OrderChannel::Online => None,
        };

        let customer = match header.channel {
            OrderChannel::Online => online_order_detail::Entity::find()
                .filter(online_order_detail::Column::OrderId.eq(header.id))
                .one(conn)
                .await?
                .map(|detail| CustomerDetailResponse {
                    customer_id: detail.customer_id,
                }),
            OrderChannel::InStore => None,
        };

        Ok(OrderResponse {
            id: header.id,
            number: header.number,
            channel: header.channel,
            status: header.status,
            total: header.total,
            created_at: header.created_at,
            updated_at: header.updated_at,
            items,
            store,
            customer,
            checkout_url,
        })
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to emit event: {}", e);
            }
        }
    }
}
