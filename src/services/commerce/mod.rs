/// Commerce services module - cart, checkout, orders and payments
pub mod cart_service;
pub mod checkout_service;
pub mod coupon_service;
pub mod order_lifecycle;
pub mod payment_service;
pub mod pricing_service;
pub mod product_catalog_service;
pub mod stock_ledger;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartService, CartWithItems};
pub use checkout_service::{Address, CheckoutInput, CheckoutService};
pub use coupon_service::{CouponService, CouponValidation, CreateCouponInput};
pub use order_lifecycle::{OrderService, OrderWithItems};
pub use payment_service::{
    PaymentService, ReconcileResult, ReconcileStatus, RefundInput, RefundOutcome, WebhookAck,
};
pub use pricing_service::CartTotals;
pub use product_catalog_service::{CreateProductInput, ProductCatalogService, UpdateProductInput};
pub use stock_ledger::{ProductStockLedger, StockLedger};
