pub mod commerce;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::notifications::NotificationService;
use crate::services::commerce::{
    CartService, CheckoutService, CouponService, OrderService, PaymentService,
    ProductCatalogService, StockLedger,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductCatalogService>,
    pub coupons: Arc<CouponService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        let products = Arc::new(ProductCatalogService::new(db.clone()));
        let coupons = Arc::new(CouponService::new(db.clone()));
        let cart = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db,
            event_sender,
            config,
            gateway,
            notifier,
        ));

        Self {
            products,
            coupons,
            cart,
            checkout,
            orders,
            payments,
        }
    }

    /// Swaps the stock ledger used by checkout and cancellation.
    pub fn with_stock_ledger(mut self, ledger: Arc<dyn StockLedger>) -> Self {
        self.checkout = Arc::new((*self.checkout).clone().with_stock_ledger(ledger.clone()));
        self.orders = Arc::new((*self.orders).clone().with_stock_ledger(ledger));
        self
    }
}
