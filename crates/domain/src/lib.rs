//! Domain layer for the storefront backend.
//!
//! Pure business rules with no I/O:
//! - Product catalog entries and their derived stock flags
//! - Categories, and reviews with the ratings they add up to
//! - Cart and wishlist aggregates
//! - Coupon validation and discount math
//! - The order state machine, pricing and order-number generation
//! - Inventory ledger entries and stock adjustment arithmetic

pub mod cart;
pub mod category;
pub mod coupon;
pub mod error;
pub mod inventory;
pub mod order;
pub mod product;
pub mod review;
pub mod wishlist;

pub use cart::{Cart, CartError, CartItem, CartOwner};
pub use category::{Category, CategoryDraft, CategoryPatch, slugify};
pub use coupon::{Coupon, CouponDraft, CouponError, DiscountType, normalize_code};
pub use error::{DomainError, FieldError};
pub use inventory::{
    InventoryError, InventoryLogEntry, LedgerEntryType, ReferenceType, StockAdjustment, StockChange,
    replay_ledger,
};
pub use order::{
    Address, CheckoutDraft, FlatRateShipping, Order, OrderError, OrderLine, OrderNumber,
    OrderStatus, PaymentStatus, PricingPolicy, ShippingPolicy, StockEffect, Totals, Transition,
};
pub use product::{Product, ProductDraft, ProductImage, ProductPatch};
pub use review::{RatingSummary, Review, ReviewDraft, ReviewPatch};
pub use wishlist::{Wishlist, WishlistItem};
