// Cart, coupons, checkout, order lifecycle and payment reconciliation
pub mod commerce;
