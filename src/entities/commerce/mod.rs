/// Commerce entities module
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod coupon_usage;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod refund;

// Re-export entities
pub use cart::{CartOwner, Entity as Cart, Model as CartModel, OwnerType};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{CouponType, Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use order::{
    Entity as Order, Model as OrderModel, OrderPaymentStatus, OrderStatus, PaymentMethod,
};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel};
pub use refund::{Entity as Refund, Model as RefundModel, RefundStatus};
