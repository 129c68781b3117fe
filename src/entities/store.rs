use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stores")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub slug: String,
    pub name: String,
    pub status: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::in_store_order_detail::Entity")]
    InStoreOrderDetails,
    #[sea_orm(has_many = "super::store_user::Entity")]
    StoreUsers,
}

impl Related<super::in_store_order_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InStoreOrderDetails.def()
    }
}

impl Related<super::store_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StoreUsers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
