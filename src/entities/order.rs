use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Sequential, zero-padded order number. Unique across both channels.
    #[sea_orm(unique)]
    pub number: String,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    // Precision stays within 16 digits; the sqlite schema builder
    // rejects wider decimal columns.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_one = "super::in_store_order_detail::Entity")]
    InStoreDetail,
    #[sea_orm(has_one = "super::online_order_detail::Entity")]
    OnlineDetail,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::in_store_order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InStoreDetail.def()
    }
}

impl Related<super::online_order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OnlineDetail.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        } else {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

/// Sales channel the order came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum OrderChannel {
    #[sea_orm(string_value = "online")]
    #[serde(rename = "online")]
    Online,
    #[sea_orm(string_value = "in-store")]
    #[serde(rename = "in-store")]
    InStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    #[serde(rename = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    #[serde(rename = "completed")]
    Completed,
    #[sea_orm(string_value = "canceled")]
    #[serde(rename = "canceled")]
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl OrderChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderChannel::Online => "online",
            OrderChannel::InStore => "in-store",
        }
    }
}
