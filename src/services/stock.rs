use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{order_item, purchase};
use crate::errors::ServiceError;

/// Stock is never stored; it is derived from the purchase ledger and the
/// quantities already ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub purchased: i64,
    pub sold: i64,
}

impl StockLevel {
    pub fn remaining(&self) -> i64 {
        self.purchased - self.sold
    }
}

/// Computes the stock level for one product. Callers inside an order
/// creation pass the transaction so the read and the item insert share
/// one snapshot.
pub async fn stock_for_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<StockLevel, ServiceError> {
    let purchased: i64 = purchase::Entity::find()
        .select_only()
        .column_as(
            Expr::col((purchase::Entity, purchase::Column::Quantity)).sum(),
            "total",
        )
        .filter(purchase::Column::ProductId.eq(product_id))
        .into_tuple::<Option<i64>>()
        .one(conn)
        .await?
        .flatten()
        .unwrap_or(0);

    let sold: i64 = order_item::Entity::find()
        .select_only()
        .column_as(
            Expr::col((order_item::Entity, order_item::Column::Quantity)).sum(),
            "total",
        )
        .filter(order_item::Column::ProductId.eq(product_id))
        .into_tuple::<Option<i64>>()
        .one(conn)
        .await?
        .flatten()
        .unwrap_or(0);

    Ok(StockLevel { purchased, sold })
}
