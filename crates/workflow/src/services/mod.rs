//! External collaborator traits and in-memory implementations.

pub mod assets;
pub mod payment;
pub mod signature;

pub use assets::{AssetStore, InMemoryAssetStore, StoredAsset};
pub use payment::{
    DECLINED_PAYMENT_METHOD, EVENT_CANCELED, EVENT_FAILED, EVENT_SUCCEEDED,
    InMemoryPaymentGateway, IntentStatus, NotificationKind, PaymentGateway, PaymentIntent,
    PaymentNotification, event_payload,
};
pub use signature::{SignatureError, WebhookSigner};
