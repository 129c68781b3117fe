pub mod common;
pub mod orders;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentGateway;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer behind the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(db, gateway, event_sender)),
        }
    }
}
