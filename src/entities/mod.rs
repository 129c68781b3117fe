pub mod in_store_order_detail;
pub mod online_order_detail;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_image;
pub mod purchase;
pub mod store;
pub mod store_user;
pub mod user;
